//! Read-modify-write store over the external client's config document.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::paths::discover_host_config_path;

/// Errors from the host config boundary.
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    /// The file could not be read or written.
    #[error("config file I/O error at {path}: {reason}")]
    Io {
        /// The config file location.
        path: PathBuf,
        /// Underlying failure.
        reason: String,
    },

    /// The document exists but is not valid JSON. Callers typically treat
    /// the config as absent for reads and refuse to write until the
    /// operator fixes the file.
    #[error("config file {path} is not valid JSON: {reason}")]
    Parse {
        /// The config file location.
        path: PathBuf,
        /// Parser diagnostic.
        reason: String,
    },

    /// An entry with this name already exists.
    #[error("server already present in host config: {0}")]
    Duplicate(String),

    /// No config file location could be determined for this platform.
    #[error("no host config location could be determined")]
    NoLocation,
}

/// One server entry in the external client's schema.
///
/// Unknown per-entry keys written by the client are captured and preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostServerEntry {
    /// Program the client will execute.
    pub command: String,

    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment for the launched process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,

    /// Any other keys the client stores on this entry.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HostServerEntry {
    /// Create an entry from its core fields.
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        env: Option<BTreeMap<String, String>>,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            env,
            extra: Map::new(),
        }
    }
}

/// The full config document.
///
/// The schema is owned by the external client and may contain unrelated
/// top-level keys; those are captured and written back untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfigDocument {
    /// Server entries keyed by name.
    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: BTreeMap<String, HostServerEntry>,

    /// Unrelated top-level keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of a shape validation pass.
///
/// All violations are collected rather than failing fast, so a caller can
/// report a complete diagnostic in one go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether the document passed every check.
    pub valid: bool,
    /// One message per violation, each referencing the offending entry.
    pub errors: Vec<String>,
}

/// Store for the external client's persisted server list.
///
/// Mutations are always full read-modify-write cycles: re-read the whole
/// document, apply the change in memory, write the whole document back.
/// Partial patches are never used, because the document may contain keys
/// this process knows nothing about.
#[derive(Debug, Clone)]
pub struct HostConfigStore {
    path: PathBuf,
}

impl HostConfigStore {
    /// Build a store over the discovered platform config location.
    pub fn discover() -> Result<Self, ConfigStoreError> {
        discover_host_config_path()
            .map(|path| Self { path })
            .ok_or(ConfigStoreError::NoLocation)
    }

    /// Build a store over an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The resolved config file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full document. A missing file is an empty document, not an
    /// error; malformed JSON surfaces as [`ConfigStoreError::Parse`].
    pub fn read(&self) -> Result<HostConfigDocument, ConfigStoreError> {
        match self.read_raw()? {
            None => Ok(HostConfigDocument::default()),
            Some(raw) => {
                serde_json::from_value(raw).map_err(|e| ConfigStoreError::Parse {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Overwrite the full document.
    pub fn write(&self, document: &HostConfigDocument) -> Result<(), ConfigStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let mut rendered =
            serde_json::to_string_pretty(document).map_err(|e| ConfigStoreError::Parse {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        rendered.push('\n');

        fs::write(&self.path, rendered).map_err(|e| self.io_error(e))?;
        tracing::debug!(path = %self.path.display(), "wrote host config");
        Ok(())
    }

    /// Append a server entry via a read-modify-write cycle.
    pub fn add(
        &self,
        name: &str,
        command: impl Into<String>,
        args: Vec<String>,
        env: Option<BTreeMap<String, String>>,
    ) -> Result<(), ConfigStoreError> {
        let mut document = self.read()?;
        if document.mcp_servers.contains_key(name) {
            return Err(ConfigStoreError::Duplicate(name.to_string()));
        }
        document
            .mcp_servers
            .insert(name.to_string(), HostServerEntry::new(command, args, env));
        self.write(&document)?;

        tracing::info!(server_name = %name, "added server to host config");
        Ok(())
    }

    /// Delete a server entry. Returns whether an entry was removed.
    pub fn remove(&self, name: &str) -> Result<bool, ConfigStoreError> {
        let mut document = self.read()?;
        let removed = document.mcp_servers.remove(name).is_some();
        if removed {
            self.write(&document)?;
            tracing::info!(server_name = %name, "removed server from host config");
        }
        Ok(removed)
    }

    /// Look up one server entry.
    pub fn get(&self, name: &str) -> Result<Option<HostServerEntry>, ConfigStoreError> {
        Ok(self.read()?.mcp_servers.get(name).cloned())
    }

    /// All server entries, keyed by name.
    pub fn list(&self) -> Result<BTreeMap<String, HostServerEntry>, ConfigStoreError> {
        Ok(self.read()?.mcp_servers)
    }

    /// Check the document's shape without failing fast.
    ///
    /// A missing file is trivially valid; a file that is not JSON at all is
    /// reported as a single violation rather than an `Err`, so callers get
    /// one uniform diagnostic path.
    pub fn validate(&self) -> Result<ValidationReport, ConfigStoreError> {
        let raw = match self.read_raw() {
            Ok(None) => return Ok(ValidationReport { valid: true, errors: Vec::new() }),
            Ok(Some(raw)) => raw,
            Err(ConfigStoreError::Parse { reason, .. }) => {
                return Ok(ValidationReport {
                    valid: false,
                    errors: vec![format!("document is not valid JSON: {reason}")],
                });
            }
            Err(e) => return Err(e),
        };

        let mut errors = Vec::new();
        match raw.get("mcpServers") {
            None => {}
            Some(Value::Object(servers)) => {
                for (name, entry) in servers {
                    validate_entry(name, entry, &mut errors);
                }
            }
            Some(_) => errors.push("mcpServers must be an object".to_string()),
        }

        Ok(ValidationReport {
            valid: errors.is_empty(),
            errors,
        })
    }

    /// Read the raw JSON document, or `None` when the file does not exist.
    fn read_raw(&self) -> Result<Option<Value>, ConfigStoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| ConfigStoreError::Parse {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    fn io_error(&self, e: std::io::Error) -> ConfigStoreError {
        ConfigStoreError::Io {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }
}

/// Accumulate shape violations for one server entry.
fn validate_entry(name: &str, entry: &Value, errors: &mut Vec<String>) {
    let Some(object) = entry.as_object() else {
        errors.push(format!("server '{name}': entry must be an object"));
        return;
    };

    match object.get("command") {
        Some(Value::String(command)) if !command.is_empty() => {}
        Some(Value::String(_)) => {
            errors.push(format!("server '{name}': command must not be empty"));
        }
        Some(_) => errors.push(format!("server '{name}': command must be a string")),
        None => errors.push(format!("server '{name}': missing required command")),
    }

    if let Some(args) = object.get("args") {
        match args.as_array() {
            Some(items) if items.iter().all(Value::is_string) => {}
            _ => errors.push(format!("server '{name}': args must be an array of strings")),
        }
    }

    if let Some(env) = object.get("env") {
        match env.as_object() {
            Some(map) if map.values().all(Value::is_string) => {}
            _ => errors.push(format!(
                "server '{name}': env must be an object of string values"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> HostConfigStore {
        HostConfigStore::at(dir.path().join("claude_desktop_config.json"))
    }

    #[test]
    fn missing_file_reads_as_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let document = store.read().unwrap();
        assert!(document.mcp_servers.is_empty());
        assert!(document.extra.is_empty());
    }

    #[test]
    fn add_then_get_round_trips_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut env = BTreeMap::new();
        env.insert("K".to_string(), "V".to_string());
        store
            .add("x", "cmd", vec!["--flag".to_string()], Some(env.clone()))
            .unwrap();

        let entry = store.get("x").unwrap().unwrap();
        assert_eq!(entry.command, "cmd");
        assert_eq!(entry.args, vec!["--flag"]);
        assert_eq!(entry.env, Some(env));
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.add("x", "cmd", vec![], None).unwrap();
        let err = store.add("x", "other", vec![], None).unwrap_err();
        assert!(matches!(err, ConfigStoreError::Duplicate(name) if name == "x"));
    }

    #[test]
    fn remove_reports_whether_entry_existed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.add("x", "cmd", vec![], None).unwrap();
        assert!(store.remove("x").unwrap());
        assert!(!store.remove("x").unwrap());
        assert!(store.get("x").unwrap().is_none());
    }

    #[test]
    fn unrelated_document_keys_survive_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        std::fs::write(
            store.path(),
            r#"{"theme": "dark", "mcpServers": {"keep": {"command": "node"}}}"#,
        )
        .unwrap();

        store.add("x", "cmd", vec![], None).unwrap();

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw.get("theme"), Some(&Value::String("dark".to_string())));
        assert!(raw["mcpServers"].get("keep").is_some());
        assert!(raw["mcpServers"].get("x").is_some());
    }

    #[test]
    fn malformed_json_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        std::fs::write(store.path(), "{not json").unwrap();
        let err = store.read().unwrap_err();
        assert!(matches!(err, ConfigStoreError::Parse { .. }));
    }

    #[test]
    fn validate_reports_missing_command_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        std::fs::write(
            store.path(),
            r#"{"mcpServers": {"ok": {"command": "node"}, "broken": {"args": []}}}"#,
        )
        .unwrap();

        let report = store.validate().unwrap();
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("broken"));
        assert!(report.errors[0].contains("command"));
    }

    #[test]
    fn validate_collects_all_violations() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        std::fs::write(
            store.path(),
            r#"{"mcpServers": {
                "a": {"args": "not-an-array", "command": 7},
                "b": {"command": "ok", "env": {"K": 1}}
            }}"#,
        )
        .unwrap();

        let report = store.validate().unwrap();
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 3);
    }

    #[test]
    fn validate_missing_file_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let report = store.validate().unwrap();
        assert!(report.valid);
        assert!(report.errors.is_empty());
    }
}
