use crate::config::Settings;
use crate::counter_store::{CounterBackend, CounterStore, EnvFile};
use crate::filename::{infer_variable, versioned_name, Placement};
use crate::pruner::{
    LocalFs, PruneScope, PrunedFile, Pruner, Retention, VersionedDir, DEFAULT_KEEP,
};
use crate::{Result, VersionError};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One output file handed to [`VersionManager::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    /// Directory holding earlier versioned copies.
    pub directory: PathBuf,
    /// Unversioned file name as produced by the build.
    pub original: String,
    pub variable: Option<String>,
    pub increment: bool,
    pub exclusions: Option<String>,
    pub keep: usize,
    pub placement: Placement,
}

impl ProcessRequest {
    pub fn new(directory: impl Into<PathBuf>, original: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            original: original.into(),
            variable: None,
            increment: true,
            exclusions: None,
            keep: DEFAULT_KEEP,
            placement: Placement::Leading,
        }
    }

    pub fn with_variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = Some(variable.into());
        self
    }

    pub fn with_increment(mut self, increment: bool) -> Self {
        self.increment = increment;
        self
    }

    pub fn with_exclusions(mut self, exclusions: impl Into<String>) -> Self {
        self.exclusions = Some(exclusions.into());
        self
    }

    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    fn is_excluded(&self) -> bool {
        self.exclusions
            .as_deref()
            .filter(|pattern| !pattern.is_empty())
            .is_some_and(|pattern| self.original.contains(pattern))
    }
}

/// What [`VersionManager::process`] did with a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Matched the exclusion filter; the file is not versioned.
    Skipped { original: String },
    /// First sighting of the file in this build: counter bumped (when asked)
    /// and old copies pruned.
    Versioned {
        name: String,
        version: Option<u64>,
        incremented: bool,
        pruned: Vec<PrunedFile>,
    },
    /// Seen earlier in this build: name rendered from the stored counter.
    Reused { name: String, version: Option<u64> },
    /// Bookkeeping failed; the unversioned name is used.
    Fallback {
        name: String,
        kind: String,
        reason: String,
    },
}

impl ProcessOutcome {
    /// File name to write, or `None` when the file was excluded.
    pub fn name(&self) -> Option<&str> {
        match self {
            ProcessOutcome::Skipped { .. } => None,
            ProcessOutcome::Versioned { name, .. }
            | ProcessOutcome::Reused { name, .. }
            | ProcessOutcome::Fallback { name, .. } => Some(name),
        }
    }

    pub fn pruned(&self) -> &[PrunedFile] {
        match self {
            ProcessOutcome::Versioned { pruned, .. } => pruned,
            _ => &[],
        }
    }

    fn fallback(original: &str, err: &VersionError) -> Self {
        ProcessOutcome::Fallback {
            name: original.to_string(),
            kind: err.kind().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Version bookkeeping for one build tool invocation.
///
/// Holds the counter store and the set of original names already processed.
/// A name is handled in full (bump + prune) only the first time it is seen;
/// the set never shrinks, so re-triggered pipeline stages reuse the version.
#[derive(Debug)]
pub struct VersionManager<B = EnvFile, F = LocalFs> {
    store: CounterStore<B>,
    pruner: Pruner<F>,
    settings: Settings,
    seen: HashSet<String>,
}

impl VersionManager<EnvFile, LocalFs> {
    pub fn from_settings(settings: Settings) -> Self {
        let store = CounterStore::open(&settings.env_file);
        let pruner = Pruner::local(settings.prune_scope);
        Self::new(store, pruner, settings)
    }
}

impl<B: CounterBackend, F: VersionedDir> VersionManager<B, F> {
    pub fn new(store: CounterStore<B>, pruner: Pruner<F>, settings: Settings) -> Self {
        Self {
            store,
            pruner,
            settings,
            seen: HashSet::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &CounterStore<B> {
        &self.store
    }

    pub fn prune_scope(&self) -> PruneScope {
        self.pruner.scope()
    }

    /// Request pre-filled from the configured defaults.
    pub fn request(
        &self,
        directory: impl Into<PathBuf>,
        original: impl Into<String>,
    ) -> ProcessRequest {
        ProcessRequest {
            directory: directory.into(),
            original: original.into(),
            variable: self.settings.variable.clone(),
            increment: true,
            exclusions: self.settings.exclusions.clone(),
            keep: self.settings.keep,
            placement: self.settings.placement,
        }
    }

    pub fn get_version(&mut self, variable: &str) -> Result<Option<u64>> {
        self.store.get_version(variable)
    }

    pub fn update_version(&mut self, variable: &str, forced: Option<u64>) -> Result<u64> {
        self.store.update_version(variable, forced)
    }

    /// `file` stamped with the current version of `variable` (or of its
    /// extension). Unchanged when no version exists yet.
    pub fn get_version_name(
        &mut self,
        file: &str,
        variable: Option<&str>,
        placement: Placement,
    ) -> Result<String> {
        let variable = variable.unwrap_or_else(|| infer_variable(file));
        let version = self.store.get_version(variable)?;
        Ok(versioned_name(file, version, placement))
    }

    /// Bump the counter for `file`, then stamp it.
    pub fn update_version_name(
        &mut self,
        file: &str,
        variable: Option<&str>,
        placement: Placement,
    ) -> Result<String> {
        let variable = variable.unwrap_or_else(|| infer_variable(file));
        let version = self.store.update_version(variable, None)?;
        Ok(versioned_name(file, Some(version), placement))
    }

    pub fn prune(
        &self,
        dir: &Path,
        original: &str,
        retention: Retention,
    ) -> Result<Vec<PrunedFile>> {
        self.pruner.prune(dir, original, retention)
    }

    pub fn has_seen(&self, original: &str) -> bool {
        self.seen.contains(original)
    }

    /// Version one output file.
    ///
    /// Never fails: bookkeeping errors come back as [`ProcessOutcome::Fallback`]
    /// carrying the unversioned name.
    pub fn process(&mut self, request: &ProcessRequest) -> ProcessOutcome {
        if request.is_excluded() {
            log::debug!("{} matches exclusions, not versioned", request.original);
            return ProcessOutcome::Skipped {
                original: request.original.clone(),
            };
        }

        let outcome = if self.seen.contains(&request.original) {
            log::debug!("{} already versioned in this build", request.original);
            self.reuse(request)
        } else {
            self.seen.insert(request.original.clone());
            self.first_sighting(request)
        };

        outcome.unwrap_or_else(|err| {
            log::warn!(
                "Versioning {} failed, keeping the original name: {err}",
                request.original
            );
            ProcessOutcome::fallback(&request.original, &err)
        })
    }

    fn reuse(&mut self, request: &ProcessRequest) -> Result<ProcessOutcome> {
        let version = self.current_version(request)?;
        Ok(ProcessOutcome::Reused {
            name: versioned_name(&request.original, version, request.placement),
            version,
        })
    }

    fn first_sighting(&mut self, request: &ProcessRequest) -> Result<ProcessOutcome> {
        if request.keep == 0 {
            return Err(VersionError::Config("keep must be at least 1".into()));
        }
        let version = if request.increment {
            let variable = request
                .variable
                .as_deref()
                .unwrap_or_else(|| infer_variable(&request.original));
            Some(self.store.update_version(variable, None)?)
        } else {
            self.current_version(request)?
        };
        let name = versioned_name(&request.original, version, request.placement);
        let pruned = self.pruner.prune(
            &request.directory,
            &request.original,
            Retention::counting_pending(request.keep),
        )?;
        Ok(ProcessOutcome::Versioned {
            name,
            version,
            incremented: request.increment,
            pruned,
        })
    }

    fn current_version(&mut self, request: &ProcessRequest) -> Result<Option<u64>> {
        let variable = request
            .variable
            .as_deref()
            .unwrap_or_else(|| infer_variable(&request.original));
        self.store.get_version(variable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter_store::InMemory;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn manager(raw: &str) -> VersionManager<InMemory, LocalFs> {
        VersionManager::new(
            CounterStore::new(InMemory::new(raw)),
            Pruner::local(PruneScope::Directory),
            Settings::default(),
        )
    }

    #[test]
    fn version_name_infers_variable_from_extension() {
        let mut manager = manager("CSS_VERSION=\"3\"\n");
        assert_eq!(manager.get_version("css").unwrap(), Some(3));
        assert_eq!(
            manager
                .get_version_name("style.css", None, Placement::Leading)
                .unwrap(),
            "style.v3.css"
        );
        assert_eq!(
            manager
                .update_version_name("style.css", None, Placement::Leading)
                .unwrap(),
            "style.v4.css"
        );
        assert_eq!(manager.store().backend().contents(), "CSS_VERSION=\"4\"\n");
    }

    #[test]
    fn version_name_without_counter_is_unchanged() {
        let mut manager = manager("");
        assert_eq!(
            manager
                .get_version_name("app.js", Some("bundle"), Placement::Trailing)
                .unwrap(),
            "app.js"
        );
    }

    #[test]
    fn first_call_bumps_and_prunes_then_reuses() {
        let temp = tempdir().unwrap();
        for v in 1..=6 {
            fs::write(temp.path().join(format!("a.v{v}.css")), b"").unwrap();
        }
        let mut manager = manager("CSS_VERSION=\"6\"\n");
        let request = ProcessRequest::new(temp.path(), "a.css").with_keep(3);

        let first = manager.process(&request);
        assert_eq!(first.name(), Some("a.v7.css"));
        assert_eq!(first.pruned().len(), 4);
        assert!(manager.has_seen("a.css"));

        let second = manager.process(&request);
        assert_eq!(
            second,
            ProcessOutcome::Reused {
                name: "a.v7.css".into(),
                version: Some(7),
            }
        );
        assert_eq!(manager.get_version("css").unwrap(), Some(7));
    }

    #[test]
    fn increment_false_reads_without_bumping() {
        let temp = tempdir().unwrap();
        let mut manager = manager("CSS_VERSION=\"2\"\n");
        let request = ProcessRequest::new(temp.path(), "b.css").with_increment(false);

        let outcome = manager.process(&request);
        assert_eq!(outcome.name(), Some("b.v2.css"));
        assert!(matches!(
            outcome,
            ProcessOutcome::Versioned {
                incremented: false,
                ..
            }
        ));
        assert_eq!(manager.get_version("css").unwrap(), Some(2));
    }

    #[test]
    fn exclusions_skip_without_touching_counters() {
        let temp = tempdir().unwrap();
        let mut manager = manager("");
        let request = ProcessRequest::new(temp.path(), "vendor/a.css").with_exclusions("vendor");

        let outcome = manager.process(&request);
        assert_eq!(outcome.name(), None);
        assert!(!manager.has_seen("vendor/a.css"));
        assert_eq!(manager.get_version("css").unwrap(), None);
        assert_eq!(manager.store().backend().contents(), "");
    }

    #[test]
    fn write_failure_falls_back_to_original_name() {
        let temp = tempdir().unwrap();
        let mut manager = VersionManager::new(
            CounterStore::new(InMemory::read_only("")),
            Pruner::local(PruneScope::Directory),
            Settings::default(),
        );

        let outcome = manager.process(&ProcessRequest::new(temp.path(), "a.css"));
        match outcome {
            ProcessOutcome::Fallback { name, kind, .. } => {
                assert_eq!(name, "a.css");
                assert_eq!(kind, "write_failure");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(manager.has_seen("a.css"));
    }

    #[test]
    fn prune_failure_falls_back_to_original_name() {
        let temp = tempdir().unwrap();
        let mut manager = manager("");
        let request = ProcessRequest::new(temp.path().join("missing"), "a.css");

        let outcome = manager.process(&request);
        assert_eq!(outcome.name(), Some("a.css"));
        assert!(matches!(
            outcome,
            ProcessOutcome::Fallback { ref kind, .. } if kind == "list_failure"
        ));
        // the counter was already bumped before pruning failed
        assert_eq!(manager.get_version("css").unwrap(), Some(1));
    }

    struct LockedCopies;

    impl VersionedDir for LockedCopies {
        fn list(&self, _dir: &Path) -> Result<Vec<String>> {
            Ok(vec!["a.v1.css".into(), "a.v2.css".into()])
        }

        fn remove(&self, path: &Path) -> Result<()> {
            Err(VersionError::Delete {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"),
            })
        }
    }

    #[test]
    fn delete_failure_falls_back_to_original_name() {
        let mut manager = VersionManager::new(
            CounterStore::new(InMemory::new("CSS_VERSION=\"2\"\n")),
            Pruner::new(LockedCopies, PruneScope::Directory),
            Settings::default(),
        );
        let request = ProcessRequest::new("dist", "a.css").with_keep(1);

        match manager.process(&request) {
            ProcessOutcome::Fallback { name, kind, .. } => {
                assert_eq!(name, "a.css");
                assert_eq!(kind, "delete_failure");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(manager.has_seen("a.css"));
        assert_eq!(manager.get_version("css").unwrap(), Some(3));
    }

    #[test]
    fn explicit_variable_and_trailing_placement() {
        let temp = tempdir().unwrap();
        let mut manager = manager("ASSETS_VERSION=\"10\"\n");
        let request = ProcessRequest::new(temp.path(), "app.min.js")
            .with_variable("Assets")
            .with_placement(Placement::Trailing);

        assert_eq!(manager.process(&request).name(), Some("app.min.v11.js"));
        assert_eq!(manager.get_version("assets").unwrap(), Some(11));
        assert_eq!(manager.get_version("js").unwrap(), None);
    }

    #[test]
    fn request_uses_configured_defaults() {
        let settings = Settings {
            keep: 2,
            placement: Placement::Trailing,
            exclusions: Some("vendor".into()),
            ..Settings::default()
        };
        let manager = VersionManager::new(
            CounterStore::new(InMemory::default()),
            Pruner::local(PruneScope::Family),
            settings,
        );
        let request = manager.request("dist", "site.css");
        assert_eq!(request.keep, 2);
        assert_eq!(request.placement, Placement::Trailing);
        assert_eq!(request.exclusions.as_deref(), Some("vendor"));
        assert!(request.increment);
        assert_eq!(manager.prune_scope(), PruneScope::Family);
    }
}
