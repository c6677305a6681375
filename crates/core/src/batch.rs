//! Stamping a stream of build outputs.
//!
//! All buffered files of one compile pass share a version: only the first one
//! that gets versioned bumps the counter.

use crate::counter_store::CounterBackend;
use crate::manager::{ProcessOutcome, ProcessRequest, VersionManager};
use crate::pruner::VersionedDir;
use std::path::{Path, PathBuf};

/// A file emitted by a build step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: PathBuf,
    /// In-memory contents. `None` for entries that are not buffered
    /// (directories, streamed files) and are passed through untouched.
    pub contents: Option<Vec<u8>>,
}

impl OutputFile {
    pub fn buffered(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: Some(contents.into()),
        }
    }

    pub fn unbuffered(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            contents: None,
        }
    }

    pub fn is_buffer(&self) -> bool {
        self.contents.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stamped {
    /// The file, moved to its versioned (or fallback) name.
    Renamed {
        file: OutputFile,
        outcome: ProcessOutcome,
    },
    /// Not buffered; left as is.
    PassedThrough(OutputFile),
    /// Excluded from versioning and removed from the stream.
    Dropped { path: PathBuf },
}

impl Stamped {
    pub fn file(&self) -> Option<&OutputFile> {
        match self {
            Stamped::Renamed { file, .. } | Stamped::PassedThrough(file) => Some(file),
            Stamped::Dropped { .. } => None,
        }
    }
}

/// Per-pass adapter between a build stream and a [`VersionManager`].
#[derive(Debug, Clone)]
pub struct Batch {
    template: ProcessRequest,
    first: bool,
}

impl Batch {
    /// `template` supplies directory, variable, exclusions, keep and placement;
    /// its `original` and `increment` are overwritten per file.
    pub fn new(template: ProcessRequest) -> Self {
        Self {
            template,
            first: true,
        }
    }

    /// A pass that never bumps: every file renders the stored version.
    pub fn reusing(template: ProcessRequest) -> Self {
        Self {
            template,
            first: false,
        }
    }

    pub fn stamp<B, F>(
        &mut self,
        manager: &mut VersionManager<B, F>,
        file: OutputFile,
    ) -> Stamped
    where
        B: CounterBackend,
        F: VersionedDir,
    {
        if !file.is_buffer() {
            return Stamped::PassedThrough(file);
        }
        let Some(original) = file_name(&file.path) else {
            log::warn!("Output {} has no usable file name", file.path.display());
            return Stamped::PassedThrough(file);
        };

        let mut request = self.template.clone();
        request.original = original;
        request.increment = self.first;

        let outcome = manager.process(&request);
        let Some(name) = outcome.name() else {
            return Stamped::Dropped { path: file.path };
        };
        self.first = false;

        let file = OutputFile {
            path: file.path.with_file_name(name),
            contents: file.contents,
        };
        Stamped::Renamed { file, outcome }
    }

    pub fn stamp_all<B, F, I>(
        &mut self,
        manager: &mut VersionManager<B, F>,
        files: I,
    ) -> Vec<Stamped>
    where
        B: CounterBackend,
        F: VersionedDir,
        I: IntoIterator<Item = OutputFile>,
    {
        files
            .into_iter()
            .map(|file| self.stamp(manager, file))
            .collect()
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}
