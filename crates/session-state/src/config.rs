//! Session configuration: ambient defaults, user overrides and the boot snapshot.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use session_state_core::SavePath;
use thiserror::Error;

use crate::registry::Backend;

/// Reserved key naming the backend identity.
pub const SAVE_HANDLER: &str = "save_handler";

/// Reserved key naming the backend path.
pub const SAVE_PATH: &str = "save_path";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Unsupported value for setting `{0}`")]
    UnsupportedValue(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reserved {
    Handler,
    Path,
}

/// Classify a setting name as one of the two backend keys.
pub(crate) fn reserved(name: &str) -> Option<Reserved> {
    match name {
        SAVE_HANDLER | "backend-identity" => Some(Reserved::Handler),
        SAVE_PATH | "backend-path" => Some(Reserved::Path),
        _ => None,
    }
}

/// Permissive boolean parsing for setting values.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

/// Conversion into a setting value.
///
/// Settings are strings, as in an ini file. Booleans become `"1"` or `""`
/// and `None` becomes `""`.
pub trait IniValue {
    /// Convert into the stored string form.
    fn into_ini(self) -> String;
}

impl IniValue for &str {
    fn into_ini(self) -> String {
        self.to_string()
    }
}

impl IniValue for String {
    fn into_ini(self) -> String {
        self
    }
}

impl IniValue for &String {
    fn into_ini(self) -> String {
        self.clone()
    }
}

impl IniValue for bool {
    fn into_ini(self) -> String {
        if self { "1" } else { "" }.to_string()
    }
}

impl<T: IniValue> IniValue for Option<T> {
    fn into_ini(self) -> String {
        self.map(IniValue::into_ini).unwrap_or_default()
    }
}

macro_rules! int_ini_value {
    ($($t:ty),*) => {
        $(
            impl IniValue for $t {
                fn into_ini(self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

int_ini_value!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

/// Ambient setting defaults, captured once per engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IniDefaults {
    values: BTreeMap<String, String>,
}

impl Default for IniDefaults {
    fn default() -> Self {
        let values = [
            ("name", "PHPSESSID"),
            ("cookie_path", "/"),
            ("cookie_domain", ""),
            ("cookie_lifetime", "0"),
            ("cookie_samesite", ""),
            ("cookie_httponly", ""),
            ("cookie_secure", "0"),
            ("use_cookies", "1"),
            ("use_only_cookies", "1"),
            ("cache_expire", "180"),
            ("serialize_handler", "php"),
            (SAVE_HANDLER, "files"),
            (SAVE_PATH, ""),
            ("gc_probability", "1"),
            ("gc_divisor", "100"),
            ("gc_maxlifetime", "1440"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { values }
    }
}

impl IniDefaults {
    /// Defaults with no settings at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Override one default.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl IniValue) -> Self {
        self.values.insert(name.into(), value.into_ini());
        self
    }

    /// Get a default value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Iterate over all defaults.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay a TOML document on the built-in defaults.
    ///
    /// A `[session]` table is used when present, otherwise the top level.
    ///
    /// # Errors
    /// Returns error if the document does not parse or holds non-scalar values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut table: toml::Table = content.parse()?;
        if let Some(toml::Value::Table(session)) = table.remove("session") {
            table = session;
        }

        let mut defaults = Self::default();
        for (name, value) in table {
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.into_ini(),
                _ => return Err(ConfigError::UnsupportedValue(name)),
            };
            defaults.values.insert(name, value);
        }
        Ok(defaults)
    }

    /// Load defaults from a TOML file, falling back to the built-ins if it does not exist.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

/// Layered setting store.
///
/// Reads see user overrides first, then ambient defaults. Changes made after
/// the boot snapshot was locked are tracked so they can be rolled back when
/// the engine is released.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    defaults: IniDefaults,
    overrides: BTreeMap<String, String>,
    boot: Option<BTreeMap<String, Option<String>>>,
    dirty: BTreeSet<String>,
}

impl ConfigStore {
    /// Create a store over the given defaults.
    #[must_use]
    pub fn new(defaults: IniDefaults) -> Self {
        Self {
            defaults,
            overrides: BTreeMap::new(),
            boot: None,
            dirty: BTreeSet::new(),
        }
    }

    /// Get the live value of a setting.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.overrides
            .get(name)
            .map(String::as_str)
            .or_else(|| self.defaults.get(name))
    }

    /// Get the live value of a setting, or `default` if unset.
    #[must_use]
    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    /// Boolean interpretation of a setting.
    #[must_use]
    pub fn is_truthy(&self, name: &str) -> bool {
        self.get(name).is_some_and(is_truthy)
    }

    /// Integer interpretation of a setting; unset or unparsable is `None`.
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    /// The ambient defaults.
    #[must_use]
    pub const fn defaults(&self) -> &IniDefaults {
        &self.defaults
    }

    /// Whether a boot snapshot has been locked.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.boot.is_some()
    }

    /// Whether a setting changed since the boot snapshot.
    #[must_use]
    pub fn is_dirty(&self, name: &str) -> bool {
        self.dirty.contains(name)
    }

    /// The value recorded for a setting in the boot snapshot.
    ///
    /// `Some(None)` means the setting was unset at boot.
    #[must_use]
    pub fn boot_value(&self, name: &str) -> Option<Option<&str>> {
        self.boot
            .as_ref()?
            .get(name)
            .map(Option::as_deref)
    }

    /// Write a value, returning the previous one if it changed.
    fn put(&mut self, name: &str, value: String) -> Option<Option<String>> {
        let current = self.get(name).map(str::to_string);
        if current.as_deref() == Some(value.as_str()) {
            return None;
        }
        self.overrides.insert(name.to_string(), value);
        Some(current)
    }

    /// Change a setting and track it for restoration.
    ///
    /// The first tracked change of a key the boot snapshot does not know
    /// records the pre-change value as its boot value.
    pub(crate) fn set(&mut self, name: &str, value: String) -> bool {
        let Some(previous) = self.put(name, value) else {
            return false;
        };
        self.dirty.insert(name.to_string());
        if let Some(boot) = &mut self.boot {
            boot.entry(name.to_string()).or_insert(previous);
        }
        true
    }

    /// Change a setting without tracking it.
    pub(crate) fn set_untracked(&mut self, name: &str, value: String) -> bool {
        self.put(name, value).is_some()
    }

    pub(crate) fn mark_dirty(&mut self, name: &str) {
        self.dirty.insert(name.to_string());
    }

    /// Take the boot snapshot.
    ///
    /// Settings changed before the lock are folded in at their current
    /// values, `locked` holds the values applied by the lock itself, and
    /// tracking starts over from an empty dirty set.
    pub(crate) fn lock(&mut self, locked: BTreeMap<String, String>) {
        let carried: Vec<(String, Option<String>)> = self
            .dirty
            .iter()
            .filter(|name| reserved(name).is_none())
            .map(|name| (name.clone(), self.get(name).map(str::to_string)))
            .collect();
        let boot = self.boot.get_or_insert_with(BTreeMap::new);
        boot.extend(carried);
        boot.extend(locked.into_iter().map(|(k, v)| (k, Some(v))));
        self.dirty.clear();
    }

    pub(crate) fn take_dirty(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.dirty)
    }

    /// Put a setting back to its boot value.
    pub(crate) fn restore(&mut self, name: &str) {
        match self.boot_value(name).map(|v| v.map(str::to_string)) {
            Some(Some(value)) => {
                self.overrides.insert(name.to_string(), value);
            }
            Some(None) => {
                self.overrides.remove(name);
            }
            None => {}
        }
    }
}

/// Bulk configuration for [`Session::set_options`](crate::Session::set_options)
/// and [`Session::start_with`](crate::Session::start_with).
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub(crate) settings: Vec<(String, String)>,
    pub(crate) handler: Option<(Backend, bool)>,
    pub(crate) save_path: Option<SavePath>,
}

impl SessionOptions {
    /// Create empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a setting. The reserved backend keys are routed to
    /// [`handler`](Self::handler) and [`save_path`](Self::save_path).
    #[must_use]
    pub fn set(mut self, name: impl Into<String>, value: impl IniValue) -> Self {
        let name = name.into();
        let value = value.into_ini();
        match reserved(&name) {
            Some(Reserved::Handler) => self.handler = Some((Backend::Named(value), true)),
            Some(Reserved::Path) => self.save_path = Some(SavePath::Text(value)),
            None => self.settings.push((name, value)),
        }
        self
    }

    /// Set the backend identity.
    #[must_use]
    pub fn handler(self, backend: impl Into<Backend>) -> Self {
        self.handler_with_shutdown(backend, true)
    }

    /// Set the backend identity and its shutdown-registration flag.
    #[must_use]
    pub fn handler_with_shutdown(mut self, backend: impl Into<Backend>, register_shutdown: bool) -> Self {
        self.handler = Some((backend.into(), register_shutdown));
        self
    }

    /// Set the backend path.
    #[must_use]
    pub fn save_path(mut self, path: impl Into<SavePath>) -> Self {
        self.save_path = Some(path.into());
        self
    }

    /// Whether nothing was set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty() && self.handler.is_none() && self.save_path.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_reflects_default() {
        let mut store = ConfigStore::new(IniDefaults::default());
        assert_eq!(store.get("cookie_path"), Some("/"));
        assert!(store.set("cache_expire", "60".to_string()));
        assert_eq!(store.get("cookie_path"), Some("/"));
        assert_eq!(store.get("cache_expire"), Some("60"));
        assert_eq!(store.get("missing"), None);
        assert_eq!(store.get_or("missing", "x"), "x");
    }

    #[test]
    fn test_unchanged_value_is_noop() {
        let mut store = ConfigStore::new(IniDefaults::default());
        assert!(!store.set("cookie_path", "/".to_string()));
        assert!(!store.is_dirty("cookie_path"));
    }

    #[test]
    fn test_truthy_parsing() {
        for yes in ["1", "true", "ON", " yes "] {
            assert!(is_truthy(yes), "{yes}");
        }
        for no in ["", "0", "off", "no", "2", "false"] {
            assert!(!is_truthy(no), "{no}");
        }
    }

    #[test]
    fn test_ini_values() {
        assert_eq!(true.into_ini(), "1");
        assert_eq!(false.into_ini(), "");
        assert_eq!(None::<&str>.into_ini(), "");
        assert_eq!(Some("Lax").into_ini(), "Lax");
        assert_eq!(666_i64.into_ini(), "666");
    }

    #[test]
    fn test_lock_records_boot_and_tracks_changes() {
        let mut store = ConfigStore::new(IniDefaults::default());
        store.set_untracked("cache_expire", "120".to_string());
        store.lock(BTreeMap::from([("cache_expire".to_string(), "120".to_string())]));
        assert!(store.is_locked());
        assert_eq!(store.boot_value("cache_expire"), Some(Some("120")));

        store.set("cache_expire", "180".to_string());
        store.set("cookie_path", "/bar".to_string());
        // First touch of an unknown key records its pre-change value.
        assert_eq!(store.boot_value("cookie_path"), Some(Some("/")));

        for name in store.take_dirty() {
            store.restore(&name);
        }
        assert_eq!(store.get("cache_expire"), Some("120"));
        assert_eq!(store.get("cookie_path"), Some("/"));
    }

    #[test]
    fn test_lock_folds_earlier_changes() {
        let mut store = ConfigStore::new(IniDefaults::default());
        store.set("cookie_domain", "a.com".to_string());
        store.lock(BTreeMap::new());
        assert!(!store.is_dirty("cookie_domain"));
        assert_eq!(store.boot_value("cookie_domain"), Some(Some("a.com")));
    }

    #[test]
    fn test_restore_unset_boot_value() {
        let mut store = ConfigStore::new(IniDefaults::empty());
        store.lock(BTreeMap::new());
        store.set("custom", "x".to_string());
        assert_eq!(store.boot_value("custom"), Some(None));
        store.restore("custom");
        assert_eq!(store.get("custom"), None);
    }

    #[test]
    fn test_from_toml_overlays_builtins() {
        let defaults = IniDefaults::from_toml_str(
            r#"
            [session]
            name = "sid"
            cookie_lifetime = 3600
            cookie_httponly = true
            "#,
        )
        .unwrap();
        assert_eq!(defaults.get("name"), Some("sid"));
        assert_eq!(defaults.get("cookie_lifetime"), Some("3600"));
        assert_eq!(defaults.get("cookie_httponly"), Some("1"));
        assert_eq!(defaults.get("cookie_path"), Some("/"));
    }

    #[test]
    fn test_from_toml_top_level() {
        let defaults = IniDefaults::from_toml_str("save_path = \"/var/sessions\"").unwrap();
        assert_eq!(defaults.get(SAVE_PATH), Some("/var/sessions"));
    }

    #[test]
    fn test_from_toml_rejects_tables() {
        let err = IniDefaults::from_toml_str("name = [1, 2]").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedValue(name) if name == "name"));
    }

    #[test]
    fn test_load_missing_file_uses_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = IniDefaults::load(&dir.path().join("session.toml")).unwrap();
        assert_eq!(defaults, IniDefaults::default());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(&path, "gc_probability = 0\n").unwrap();
        let defaults = IniDefaults::load(&path).unwrap();
        assert_eq!(defaults.get("gc_probability"), Some("0"));
    }

    #[test]
    fn test_options_route_reserved_keys() {
        let options = SessionOptions::new()
            .set("save_handler", "files")
            .set("backend-path", "/tmp")
            .set("use_cookies", 0);
        assert!(matches!(&options.handler, Some((Backend::Named(n), true)) if n == "files"));
        assert_eq!(options.save_path, Some(SavePath::from("/tmp")));
        assert_eq!(options.settings, vec![("use_cookies".to_string(), "0".to_string())]);
    }
}
