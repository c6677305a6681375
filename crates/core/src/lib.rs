//! # verkeep core
//!
//! Version counters for build artifacts, version tokens in file names, and
//! retention of old versioned copies.
//!
//! ## Flow
//!
//! ```text
//! Build output (site.css)
//!     │
//!     ├──> Batch (first file of a pass bumps, the rest reuse)
//!     │
//!     └──> VersionManager::process
//!            ├─> CounterStore   CSS_VERSION="12" → "13" (.env)
//!            ├─> filename       site.css → site.v13.css
//!            └─> Pruner         drop site.v7.css and older
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use verkeep_core::{Settings, VersionManager};
//!
//! let settings = Settings::load(std::path::Path::new("."), None)?;
//! let mut manager = VersionManager::from_settings(settings);
//! let request = manager.request("dist/css", "site.css");
//! let outcome = manager.process(&request);
//!
//! println!("write to {:?}", outcome.name());
//! # Ok::<(), verkeep_core::VersionError>(())
//! ```

mod batch;
mod config;
mod counter_store;
mod error;
mod filename;
mod manager;
mod pruner;

pub use batch::{Batch, OutputFile, Stamped};
pub use config::{Settings, CONFIG_FILE_NAME, DEFAULT_ENV_FILE};
pub use counter_store::{variable_key, CounterBackend, CounterStore, EnvFile, InMemory};
pub use error::{Result, VersionError};
pub use filename::{clean_name, extract_version, infer_variable, versioned_name, Placement};
pub use manager::{ProcessOutcome, ProcessRequest, VersionManager};
pub use pruner::{
    LocalFs, PruneScope, PrunedFile, Pruner, Retention, VersionedDir, DEFAULT_KEEP,
};
