use crate::{Result, VersionError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const KEY_SUFFIX: &str = "_VERSION";

/// Raw storage behind a [`CounterStore`].
///
/// The store owns parsing and formatting; a backend only moves the whole text
/// in and out.
pub trait CounterBackend {
    /// Full text of the counter file. A store that does not exist yet reads as
    /// empty.
    fn read(&self) -> Result<String>;

    /// Replace the full text of the counter file.
    fn write(&self, raw: &str) -> Result<()>;
}

/// Shell env-file on disk (`KEY="value"` per line).
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
}

impl EnvFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CounterBackend for EnvFile {
    fn read(&self) -> Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(VersionError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write(&self, raw: &str) -> Result<()> {
        std::fs::write(&self.path, raw).map_err(|source| VersionError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Process-local backend, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemory {
    raw: Mutex<String>,
    reject_writes: bool,
}

impl InMemory {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(raw.into()),
            reject_writes: false,
        }
    }

    /// Backend whose writes always fail with a permission error.
    pub fn read_only(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(raw.into()),
            reject_writes: true,
        }
    }

    pub fn contents(&self) -> String {
        self.raw.lock().map(|raw| raw.clone()).unwrap_or_default()
    }
}

impl CounterBackend for InMemory {
    fn read(&self) -> Result<String> {
        Ok(self.contents())
    }

    fn write(&self, raw: &str) -> Result<()> {
        if self.reject_writes {
            return Err(VersionError::Write {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "in-memory counter store is read-only",
                ),
            });
        }
        if let Ok(mut guard) = self.raw.lock() {
            *guard = raw.to_string();
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Loaded {
    values: HashMap<String, String>,
    raw: String,
}

/// Version counters keyed by variable name.
///
/// The backing text is read on first access and rewritten in full after every
/// update. The parsed values and the raw text always change together.
#[derive(Debug)]
pub struct CounterStore<B = EnvFile> {
    backend: B,
    loaded: Option<Loaded>,
}

impl CounterStore<EnvFile> {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::new(EnvFile::new(path))
    }
}

impl<B: CounterBackend> CounterStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            loaded: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Current version of `variable` (case-insensitive).
    ///
    /// `None` when the key was never set or its value is not a positive integer.
    pub fn get_version(&mut self, variable: &str) -> Result<Option<u64>> {
        let key = variable_key(variable)?;
        let loaded = self.ensure_loaded()?;
        Ok(loaded.values.get(&key).and_then(|raw| parse_version(raw)))
    }

    /// Bump `variable` by one (starting at 1), or set it to `forced`.
    ///
    /// The in-memory value is kept even when persisting fails.
    pub fn update_version(&mut self, variable: &str, forced: Option<u64>) -> Result<u64> {
        if forced == Some(0) {
            return Err(VersionError::Config(format!(
                "forced version for '{variable}' must be at least 1"
            )));
        }
        let key = variable_key(variable)?;
        let loaded = load(&self.backend, &mut self.loaded)?;
        let current = loaded.values.get(&key).and_then(|raw| parse_version(raw));
        let next = match (forced, current) {
            (Some(value), _) => value,
            (None, Some(value)) => value.checked_add(1).ok_or_else(|| {
                VersionError::Config(format!("version counter '{key}' overflowed"))
            })?,
            (None, None) => 1,
        };

        let value = next.to_string();
        loaded.raw = upsert_line(&loaded.raw, &key, &value);
        loaded.values.insert(key, value);

        self.backend.write(&loaded.raw)?;
        Ok(next)
    }

    /// Serialized form as it was last persisted (or loaded).
    pub fn raw_text(&mut self) -> Result<&str> {
        Ok(self.ensure_loaded()?.raw.as_str())
    }

    fn ensure_loaded(&mut self) -> Result<&mut Loaded> {
        load(&self.backend, &mut self.loaded)
    }
}

fn load<'a, B: CounterBackend>(
    backend: &B,
    slot: &'a mut Option<Loaded>,
) -> Result<&'a mut Loaded> {
    if slot.is_none() {
        let raw = backend.read()?;
        let values = parse_env(&raw);
        log::debug!("Loaded {} counter entries", values.len());
        *slot = Some(Loaded { values, raw });
    }
    Ok(slot.get_or_insert_with(Loaded::default))
}

/// Storage key for a variable: `css` → `CSS_VERSION`.
///
/// Rejects names that could not be read back from a `KEY="value"` line.
pub fn variable_key(variable: &str) -> Result<String> {
    let name = variable.trim();
    if name.contains('=') || name.contains(char::is_control) {
        return Err(VersionError::Config(format!("invalid counter variable {variable:?}")));
    }
    Ok(format!("{}{KEY_SUFFIX}", name.to_uppercase()))
}

fn parse_version(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|value| *value > 0)
}

fn parse_env(raw: &str) -> HashMap<String, String> {
    raw.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), unquote(value.trim()).to_string()))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Rewrite every line defining `key`, or append one.
fn upsert_line(raw: &str, key: &str, value: &str) -> String {
    let mut out = String::with_capacity(raw.len() + key.len() + value.len() + 4);
    let mut replaced = false;

    for line in raw.split_inclusive('\n') {
        let body = line.trim_end_matches(['\r', '\n']);
        let ending = &line[body.len()..];
        let defines_key = parse_line(body).is_some_and(|(k, _)| k == key);
        if defines_key {
            let prefix = if body.trim_start().starts_with("export ") {
                "export "
            } else {
                ""
            };
            out.push_str(&format!("{prefix}{key}=\"{value}\"{ending}"));
            replaced = true;
        } else {
            out.push_str(line);
        }
    }

    if !replaced {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("{key}=\"{value}\"\n"));
    }
    out
}
