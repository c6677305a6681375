use serde::Serialize;
use std::path::PathBuf;
use verkeep_core::{ProcessOutcome, PrunedFile};

#[derive(Debug, Serialize)]
pub struct PruneReport {
    pub directory: PathBuf,
    pub original: String,
    pub keep: usize,
    pub deleted: Vec<PrunedFile>,
}

#[derive(Debug, Serialize)]
pub struct StampReport {
    pub destination: PathBuf,
    pub files: Vec<StampedEntry>,
}

#[derive(Debug, Serialize)]
pub struct StampedEntry {
    pub source: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ProcessOutcome>,
}

impl StampReport {
    pub fn written(&self) -> usize {
        self.files.iter().filter(|f| f.output.is_some()).count()
    }
}
