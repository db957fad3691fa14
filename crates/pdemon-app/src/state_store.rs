//! Typed persisted state
//!
//! The daemon keeps a flattened summary of the last sync and the last world
//! update in a small TOML file. Every field has a fixed kind; values are
//! coerced once when the file is loaded, so the rest of the daemon only sees
//! typed values. Older state files stored everything as strings (`"True"`,
//! `"123"`) and are still accepted.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use pdemon_core::prelude::*;

/// Value kind of a persisted field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Bool,
    Text,
}

/// Persisted fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateKey {
    SyncLast,
    SyncCount,
    SyncState,
    SyncNext,
    SyncErrors,
    WorldLastStart,
    WorldLastStop,
    WorldLastState,
    WorldLastTotal,
    WorldLastFailed,
    PendingPackages,
    PortageUpdate,
}

impl StateKey {
    pub const ALL: &'static [StateKey] = &[
        StateKey::SyncLast,
        StateKey::SyncCount,
        StateKey::SyncState,
        StateKey::SyncNext,
        StateKey::SyncErrors,
        StateKey::WorldLastStart,
        StateKey::WorldLastStop,
        StateKey::WorldLastState,
        StateKey::WorldLastTotal,
        StateKey::WorldLastFailed,
        StateKey::PendingPackages,
        StateKey::PortageUpdate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StateKey::SyncLast => "sync_last",
            StateKey::SyncCount => "sync_count",
            StateKey::SyncState => "sync_state",
            StateKey::SyncNext => "sync_next",
            StateKey::SyncErrors => "sync_errors",
            StateKey::WorldLastStart => "world_last_start",
            StateKey::WorldLastStop => "world_last_stop",
            StateKey::WorldLastState => "world_last_state",
            StateKey::WorldLastTotal => "world_last_total",
            StateKey::WorldLastFailed => "world_last_failed",
            StateKey::PendingPackages => "pending_packages",
            StateKey::PortageUpdate => "portage_update",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            StateKey::SyncState | StateKey::WorldLastState | StateKey::WorldLastFailed => {
                FieldKind::Text
            }
            StateKey::PortageUpdate => FieldKind::Bool,
            _ => FieldKind::Int,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.name() == name)
    }
}

/// A typed persisted value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateValue {
    Int(i64),
    Bool(bool),
    Text(String),
}

impl StateValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            StateValue::Int(_) => FieldKind::Int,
            StateValue::Bool(_) => FieldKind::Bool,
            StateValue::Text(_) => FieldKind::Text,
        }
    }

    /// Coerce a stored TOML value to `kind`, accepting legacy string forms
    pub fn coerce(kind: FieldKind, raw: &toml::Value) -> Option<Self> {
        match (kind, raw) {
            (FieldKind::Int, toml::Value::Integer(n)) => Some(StateValue::Int(*n)),
            (FieldKind::Int, toml::Value::String(s)) => s.trim().parse().ok().map(StateValue::Int),
            (FieldKind::Int, toml::Value::Float(f)) if f.fract() == 0.0 => {
                Some(StateValue::Int(*f as i64))
            }
            (FieldKind::Bool, toml::Value::Boolean(b)) => Some(StateValue::Bool(*b)),
            (FieldKind::Bool, toml::Value::Integer(n)) => Some(StateValue::Bool(*n != 0)),
            (FieldKind::Bool, toml::Value::String(s)) => {
                match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" | "1" => Some(StateValue::Bool(true)),
                    "false" | "no" | "0" | "" => Some(StateValue::Bool(false)),
                    _ => None,
                }
            }
            (FieldKind::Text, toml::Value::String(s)) => Some(StateValue::Text(s.clone())),
            (FieldKind::Text, other) => Some(StateValue::Text(other.to_string())),
            _ => None,
        }
    }

    fn to_toml(&self) -> toml::Value {
        match self {
            StateValue::Int(n) => toml::Value::Integer(*n),
            StateValue::Bool(b) => toml::Value::Boolean(*b),
            StateValue::Text(s) => toml::Value::String(s.clone()),
        }
    }
}

/// String form used by the status surface: `True`/`False`, decimal integers
impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Int(n) => write!(f, "{}", n),
            StateValue::Bool(true) => f.write_str("True"),
            StateValue::Bool(false) => f.write_str("False"),
            StateValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        StateValue::Int(value)
    }
}

impl From<u32> for StateValue {
    fn from(value: u32) -> Self {
        StateValue::Int(i64::from(value))
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        StateValue::Bool(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::Text(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        StateValue::Text(value)
    }
}

/// Key/value store backed by a TOML file
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    values: BTreeMap<StateKey, StateValue>,
    dirty: bool,
}

impl StateStore {
    /// Store that never touched disk; `flush` still writes to `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            values: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load the store at `path`.
    ///
    /// A missing file gives an empty store. An unparsable file is logged and
    /// replaced on the next flush. Only I/O failures are errors.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::empty(path);

        let content = match std::fs::read_to_string(&store.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {:?}, starting empty", store.path);
                return Ok(store);
            }
            Err(e) => {
                return Err(Error::state_store(format!(
                    "Failed to read {:?}: {}",
                    store.path, e
                )))
            }
        };

        let table: toml::Table = match content.parse() {
            Ok(table) => table,
            Err(e) => {
                warn!("Ignoring unparsable state file {:?}: {}", store.path, e);
                store.dirty = true;
                return Ok(store);
            }
        };

        for (name, raw) in &table {
            let Some(key) = StateKey::from_name(name) else {
                debug!("Ignoring unknown state field '{}'", name);
                continue;
            };
            match StateValue::coerce(key.kind(), raw) {
                Some(value) => {
                    store.values.insert(key, value);
                }
                None => warn!("Ignoring state field '{}' with bad value {}", name, raw),
            }
        }

        debug!("Loaded {} state fields from {:?}", store.values.len(), store.path);
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: StateKey) -> Option<&StateValue> {
        self.values.get(&key)
    }

    pub fn get_int(&self, key: StateKey) -> Option<i64> {
        match self.values.get(&key) {
            Some(StateValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: StateKey) -> Option<bool> {
        match self.values.get(&key) {
            Some(StateValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_text(&self, key: StateKey) -> Option<&str> {
        match self.values.get(&key) {
            Some(StateValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Set `key`; returns whether the stored value changed
    pub fn set(&mut self, key: StateKey, value: impl Into<StateValue>) -> bool {
        let value = value.into();
        if value.kind() != key.kind() {
            warn!(
                "Refusing {:?} value for state field '{}' ({:?})",
                value.kind(),
                key.name(),
                key.kind()
            );
            return false;
        }
        if self.values.get(&key) == Some(&value) {
            return false;
        }
        self.values.insert(key, value);
        self.dirty = true;
        true
    }

    /// Set or clear `key`; returns whether anything changed
    pub fn set_opt<V: Into<StateValue>>(&mut self, key: StateKey, value: Option<V>) -> bool {
        match value {
            Some(value) => self.set(key, value),
            None => self.remove(key),
        }
    }

    pub fn remove(&mut self, key: StateKey) -> bool {
        let removed = self.values.remove(&key).is_some();
        self.dirty |= removed;
        removed
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write pending changes; returns whether the file was written
    pub fn flush(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }

        let table: toml::Table = self
            .values
            .iter()
            .map(|(key, value)| (key.name().to_string(), value.to_toml()))
            .collect();
        let content = toml::to_string(&table)
            .map_err(|e| Error::state_store(format!("Failed to serialize state: {}", e)))?;

        self.write_atomic(&content)?;
        self.dirty = false;
        trace!("Flushed {} state fields to {:?}", self.values.len(), self.path);
        Ok(true)
    }

    /// Status strings of every persisted field, `none` for unset ones
    pub fn snapshot(&self) -> BTreeMap<&'static str, String> {
        StateKey::ALL
            .iter()
            .map(|key| {
                let value = self
                    .values
                    .get(key)
                    .map_or_else(|| "none".to_string(), ToString::to_string);
                (key.name(), value)
            })
            .collect()
    }

    fn write_atomic(&self, content: &str) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    Error::state_store(format!("Failed to create {:?}: {}", dir, e))
                })?;
            }
        }

        // Writers serialize on a sidecar lock so the rename below stays atomic
        let lock_path = self.path.with_extension("lock");
        let lock = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| Error::state_store(format!("Failed to open {:?}: {}", lock_path, e)))?;
        lock.lock_exclusive()
            .map_err(|e| Error::state_store(format!("Failed to lock {:?}: {}", lock_path, e)))?;

        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, content)
            .map_err(|e| Error::state_store(format!("Failed to write temp file: {}", e)))?;
        std::fs::rename(&temp_path, &self.path)
            .map_err(|e| Error::state_store(format!("Failed to rename temp file: {}", e)))?;

        // Lock is released when `lock` is dropped
        Ok(())
    }
}
