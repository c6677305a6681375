use crate::filename::{clean_name, extract_version};
use crate::{Result, VersionError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_KEEP: usize = 5;

/// Filesystem primitives the pruner needs.
pub trait VersionedDir {
    /// File names (not paths) of the regular files directly inside `dir`.
    fn list(&self, dir: &Path) -> Result<Vec<String>>;

    fn remove(&self, path: &Path) -> Result<()>;
}

/// The local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl VersionedDir for LocalFs {
    fn list(&self, dir: &Path) -> Result<Vec<String>> {
        let list_err = |source| VersionError::ListDir {
            path: dir.to_path_buf(),
            source,
        };
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(list_err)? {
            let entry = entry.map_err(list_err)?;
            let is_file = entry.file_type().map(|ty| ty.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => log::debug!("Skipping non UTF-8 entry {raw:?}"),
            }
        }
        Ok(names)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path).map_err(|source| VersionError::Delete {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Which version families a prune pass touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneScope {
    /// Every versioned family found in the directory.
    #[default]
    Directory,
    /// Only the family whose clean name matches the original file.
    Family,
}

/// How many versions of a family survive a prune pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    keep: usize,
    counts_pending: bool,
}

impl Retention {
    /// `keep` includes a version that is about to be written, so only the
    /// newest `keep - 1` files already on disk survive.
    pub fn counting_pending(keep: usize) -> Self {
        Self {
            keep,
            counts_pending: true,
        }
    }

    /// `keep` counts only files already on disk.
    pub fn existing(keep: usize) -> Self {
        Self {
            keep,
            counts_pending: false,
        }
    }

    pub fn keep(&self) -> usize {
        self.keep
    }

    fn survivors(&self) -> usize {
        if self.counts_pending {
            self.keep.saturating_sub(1)
        } else {
            self.keep
        }
    }
}

impl Default for Retention {
    fn default() -> Self {
        Self::counting_pending(DEFAULT_KEEP)
    }
}

/// A file removed by a prune pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrunedFile {
    pub path: PathBuf,
    pub clean_name: String,
    pub version: u64,
    /// Newer versions of the same family, the pending one included.
    pub behind: usize,
}

/// Groups versioned files by clean name and deletes the oldest ones.
#[derive(Debug, Clone, Default)]
pub struct Pruner<F = LocalFs> {
    fs: F,
    scope: PruneScope,
}

impl Pruner<LocalFs> {
    pub fn local(scope: PruneScope) -> Self {
        Self::new(LocalFs, scope)
    }
}

impl<F: VersionedDir> Pruner<F> {
    pub fn new(fs: F, scope: PruneScope) -> Self {
        Self { fs, scope }
    }

    pub fn scope(&self) -> PruneScope {
        self.scope
    }

    /// Delete versions of the files in `dir` beyond `retention`.
    ///
    /// An empty `dir` or `original` is a configuration mistake: it is logged and
    /// nothing is deleted. The first failed deletion aborts the pass.
    pub fn prune(
        &self,
        dir: &Path,
        original: &str,
        retention: Retention,
    ) -> Result<Vec<PrunedFile>> {
        if dir.as_os_str().is_empty() {
            log::warn!("A destination directory is required to look for versioned files");
            return Ok(Vec::new());
        }
        if original.trim().is_empty() {
            log::warn!(
                "An original file name is required before deleting versions in {}",
                dir.display()
            );
            return Ok(Vec::new());
        }

        let family = clean_name(original);
        let mut groups: BTreeMap<String, Vec<(u64, String)>> = BTreeMap::new();
        for name in self.fs.list(dir)? {
            let Some(version) = extract_version(&name) else {
                continue;
            };
            let clean = clean_name(&name);
            if self.scope == PruneScope::Family && clean != family {
                continue;
            }
            groups.entry(clean).or_default().push((version, name));
        }

        let pending = usize::from(retention.counts_pending);
        let mut deleted = Vec::new();
        for (clean, mut versions) in groups {
            versions.sort();
            let excess = versions.len().saturating_sub(retention.survivors());
            let total = versions.len();
            for (idx, (version, name)) in versions.into_iter().take(excess).enumerate() {
                let path = dir.join(&name);
                let behind = total - idx - 1 + pending;
                self.fs.remove(&path)?;
                log::info!(
                    "Deleted {}: {behind} versions behind retention limit of {}",
                    path.display(),
                    retention.keep()
                );
                deleted.push(PrunedFile {
                    path,
                    clean_name: clean.clone(),
                    version,
                    behind,
                });
            }
        }
        Ok(deleted)
    }
}
