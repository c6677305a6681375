use crate::filename::Placement;
use crate::pruner::{PruneScope, DEFAULT_KEEP};
use crate::{Result, VersionError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "verkeep.toml";
pub const DEFAULT_ENV_FILE: &str = ".env";

const ENV_FILE_VAR: &str = "VERKEEP_ENV_FILE";
const KEEP_VAR: &str = "VERKEEP_KEEP";

/// Resolved settings for one build invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Counter file (`KEY="value"` lines).
    pub env_file: PathBuf,
    /// Versions of a file allowed to remain after pruning.
    pub keep: usize,
    pub placement: Placement,
    /// Counter variable used instead of the file extension.
    pub variable: Option<String>,
    /// Files whose name contains this substring are never versioned.
    pub exclusions: Option<String>,
    pub prune_scope: PruneScope,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env_file: PathBuf::from(DEFAULT_ENV_FILE),
            keep: DEFAULT_KEEP,
            placement: Placement::Leading,
            variable: None,
            exclusions: None,
            prune_scope: PruneScope::Directory,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    env_file: Option<PathBuf>,
    keep: Option<usize>,
    placement: Option<String>,
    /// Legacy switch: `true` places the version after the base name.
    end: Option<bool>,
    variable: Option<String>,
    exclusions: Option<String>,
    prune_scope: Option<PruneScope>,
}

impl Settings {
    /// Defaults, then the config file, then `VERKEEP_*` environment variables.
    ///
    /// With `explicit == None` the file is `verkeep.toml` in `cwd`, and it is
    /// fine for it not to exist.
    pub fn load(cwd: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut settings = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = cwd.join(CONFIG_FILE_NAME);
                if path.is_file() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        settings.apply_env(|name| std::env::var(name).ok());
        if settings.env_file.is_relative() {
            settings.env_file = cwd.join(&settings.env_file);
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| VersionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self> {
        let raw: RawSettings = toml::from_str(text).map_err(|err| VersionError::Parse {
            path: origin.to_path_buf(),
            message: err.to_string(),
        })?;
        let settings = merge(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overlay environment knobs. Values that do not parse are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_FILE_VAR)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
        {
            self.env_file = PathBuf::from(path);
        }
        self.keep = parse_keep(lookup(KEEP_VAR).as_deref(), self.keep);
    }

    pub fn validate(&self) -> Result<()> {
        if self.keep == 0 {
            return Err(VersionError::Config(
                "keep must be at least 1 (the newest version always survives)".into(),
            ));
        }
        if self.env_file.as_os_str().is_empty() {
            return Err(VersionError::Config("env_file must not be empty".into()));
        }
        Ok(())
    }
}

fn merge(raw: RawSettings) -> Result<Settings> {
    let defaults = Settings::default();
    let placement = match (raw.placement.as_deref(), raw.end) {
        (Some(value), _) => Placement::parse(value).ok_or_else(|| {
            VersionError::Config(format!(
                "unknown placement '{value}' (expected 'leading' or 'trailing')"
            ))
        })?,
        (None, Some(true)) => Placement::Leading,
        (None, Some(false)) => Placement::Trailing,
        (None, None) => defaults.placement,
    };
    Ok(Settings {
        env_file: raw.env_file.unwrap_or(defaults.env_file),
        keep: raw.keep.unwrap_or(defaults.keep),
        placement,
        variable: non_empty(raw.variable),
        exclusions: non_empty(raw.exclusions),
        prune_scope: raw.prune_scope.unwrap_or(defaults.prune_scope),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_keep(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn toml_overrides_defaults() {
        let settings = Settings::from_toml_str(
            r#"
env_file = "config/versions.env"
keep = 3
placement = "trailing"
exclusions = "vendor"
prune_scope = "family"
"#,
            Path::new("verkeep.toml"),
        )
        .unwrap();

        assert_eq!(
            settings,
            Settings {
                env_file: PathBuf::from("config/versions.env"),
                keep: 3,
                placement: Placement::Trailing,
                variable: None,
                exclusions: Some("vendor".into()),
                prune_scope: PruneScope::Family,
            }
        );
    }

    #[test]
    fn legacy_end_flag_selects_placement() {
        let settings =
            Settings::from_toml_str("end = false\n", Path::new("verkeep.toml")).unwrap();
        assert_eq!(settings.placement, Placement::Trailing);
    }

    #[test]
    fn rejects_zero_keep_and_unknown_keys() {
        let err = Settings::from_toml_str("keep = 0\n", Path::new("verkeep.toml")).unwrap_err();
        assert_eq!(err.kind(), "config");

        let err = Settings::from_toml_str("kep = 3\n", Path::new("verkeep.toml")).unwrap_err();
        assert_eq!(err.kind(), "parse_failure");

        let err = Settings::from_toml_str("placement = \"middle\"\n", Path::new("verkeep.toml"))
            .unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> =
            HashMap::from([("VERKEEP_ENV_FILE", "other.env"), ("VERKEEP_KEEP", "9")]);
        let mut settings = Settings::default();
        settings.apply_env(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(settings.env_file, PathBuf::from("other.env"));
        assert_eq!(settings.keep, 9);
    }

    #[test]
    fn unparseable_env_values_are_ignored() {
        let env: HashMap<&str, &str> =
            HashMap::from([("VERKEEP_KEEP", "lots"), ("VERKEEP_ENV_FILE", " ")]);
        let mut settings = Settings::default();
        settings.apply_env(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(settings, Settings::default());
        assert_eq!(parse_keep(Some("0"), 5), 5);
    }

    #[test]
    fn load_reads_config_next_to_cwd() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), "keep = 2\n").unwrap();

        let settings = Settings::load(temp.path(), None).unwrap();
        assert_eq!(settings.keep, 2);
        assert_eq!(settings.env_file, temp.path().join(".env"));
    }

    #[test]
    fn explicit_config_must_exist() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("nope.toml");
        let err = Settings::load(temp.path(), Some(missing.as_path())).unwrap_err();
        assert_eq!(err.kind(), "read_failure");
    }
}
