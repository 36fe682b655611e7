//! Persisted resource state
//!
//! A JSON document holding the authoritative state of every managed
//! resource, keyed by address and kept in the order resources were first
//! written. The file is rewritten after each successful operation so that a
//! failure part way through a run never loses what was already applied.

use crate::domain::ports::ResourceKind;
use crate::error::{Error, Result};
use crate::runtime::manifest::Address;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Current state file format
pub const FORMAT_VERSION: u32 = 1;

const MASK: &str = "(sensitive)";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub format_version: u32,
    /// Incremented on every write
    pub serial: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// `<kind>.<name>` → state
    #[serde(default)]
    pub resources: IndexMap<String, Value>,
}

impl StateFile {
    pub fn new() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            ..Default::default()
        }
    }

    pub fn get(&self, address: &Address) -> Option<&Value> {
        self.resources.get(&address.to_string())
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.resources.contains_key(&address.to_string())
    }

    /// Insert or replace, keeping the position of an existing entry
    pub fn put(&mut self, address: &Address, state: Value) {
        self.resources.insert(address.to_string(), state);
    }

    pub fn remove(&mut self, address: &Address) -> Option<Value> {
        self.resources.shift_remove(&address.to_string())
    }

    /// Stored addresses in order
    pub fn addresses(&self) -> Result<Vec<Address>> {
        self.resources.keys().map(|k| k.parse()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Copy of the state with sensitive attributes masked, for display
    pub fn rendered(&self) -> Result<Value> {
        let mut resources = serde_json::Map::new();
        for (key, state) in &self.resources {
            let address: Address = key.parse()?;
            resources.insert(key.clone(), mask_sensitive(address.kind, state));
        }
        Ok(serde_json::json!({
            "format_version": self.format_version,
            "serial": self.serial,
            "updated_at": self.updated_at,
            "resources": resources,
        }))
    }
}

/// Replace the values of a kind's sensitive attributes
pub fn mask_sensitive(kind: ResourceKind, state: &Value) -> Value {
    let mut masked = state.clone();
    if let Some(object) = masked.as_object_mut() {
        for attr in kind.sensitive_attributes() {
            if let Some(value) = object.get_mut(*attr) {
                if !value.is_null() {
                    *value = Value::String(MASK.to_string());
                }
            }
        }
    }
    masked
}

// =============================================================================
// Store
// =============================================================================

/// State file on disk
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: StateFile,
}

impl StateStore {
    /// Open the state file, starting empty when it does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|e| {
                Error::Configuration(format!("unable to read state {}: {}", path.display(), e))
            })?;
            let state: StateFile = serde_json::from_str(&text)?;
            if state.format_version != FORMAT_VERSION {
                return Err(Error::Configuration(format!(
                    "state {} has format version {}, expected {}",
                    path.display(),
                    state.format_version,
                    FORMAT_VERSION
                )));
            }
            state
        } else {
            debug!("No state at {}, starting empty", path.display());
            StateFile::new()
        };
        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &StateFile {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StateFile {
        &mut self.state
    }

    /// Bump the serial and write the file through a temporary sibling
    pub fn commit(&mut self) -> Result<()> {
        self.state.serial += 1;
        self.state.updated_at = Some(Utc::now());

        let json = serde_json::to_string_pretty(&self.state)?;
        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&tmp, &self.path)?;

        debug!("Wrote state serial {} to {}", self.state.serial, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn auth_address() -> Address {
        Address::new(ResourceKind::Auth, "foo")
    }

    #[test]
    fn test_store_roundtrip_keeps_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let mut store = StateStore::open(&path).unwrap();
        assert!(store.state().is_empty());

        let pool = Address::new(ResourceKind::Pool, "rbd");
        store.state_mut().put(&pool, json!({"name": "rbd"}));
        store.state_mut().put(&auth_address(), json!({"entity": "client.foo"}));
        store.commit().unwrap();
        store.state_mut().put(&pool, json!({"name": "rbd", "size": 3}));
        store.commit().unwrap();

        let reopened = StateStore::open(&path).unwrap();
        assert_eq!(reopened.state().serial, 2);
        assert!(reopened.state().updated_at.is_some());
        assert_eq!(
            reopened.state().addresses().unwrap(),
            vec![pool.clone(), auth_address()]
        );
        assert_eq!(reopened.state().get(&pool), Some(&json!({"name": "rbd", "size": 3})));
        assert!(!dir.path().join("state.tmp").exists());
    }

    #[test]
    fn test_rendered_masks_secrets() {
        let mut state = StateFile::new();
        state.put(
            &auth_address(),
            json!({"entity": "client.foo", "key": "AQD...", "keyring": "[client.foo]"}),
        );
        state.put(
            &Address::new(ResourceKind::RgwS3Key, "k"),
            json!({"user": "alice", "access_key": "AK", "secret_key": "SK"}),
        );

        let rendered = state.rendered().unwrap();
        let auth = &rendered["resources"]["ceph_auth.foo"];
        assert_eq!(auth["key"], "(sensitive)");
        assert_eq!(auth["keyring"], "(sensitive)");
        assert_eq!(auth["entity"], "client.foo");
        assert_eq!(rendered["resources"]["ceph_rgw_s3_key.k"]["secret_key"], "(sensitive)");
        assert_eq!(rendered["resources"]["ceph_rgw_s3_key.k"]["access_key"], "AK");
    }

    #[test]
    fn test_rejects_unknown_format_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"format_version": 9, "serial": 1, "resources": {}}"#).unwrap();
        assert!(StateStore::open(&path).is_err());
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut state = StateFile::new();
        let a = Address::new(ResourceKind::Pool, "a");
        let b = Address::new(ResourceKind::Pool, "b");
        let c = Address::new(ResourceKind::Pool, "c");
        for address in [&a, &b, &c] {
            state.put(address, json!({}));
        }
        state.remove(&b);
        assert_eq!(state.addresses().unwrap(), vec![a, c]);
    }
}
