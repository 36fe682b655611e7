//! Desired-state manifest
//!
//! ```yaml
//! provider:
//!   endpoint: https://mgr-0:8443
//!   username: admin
//!   password: secret
//! resources:
//!   - kind: ceph_pool
//!     name: rbd
//!     spec:
//!       name: rbd
//!       size: 3
//! ```
//!
//! Resources are applied in declaration order. The `spec` of each resource is
//! the model of its controller and is decoded when the resource is applied.

use crate::controllers::{
    AuthIdentity, ClusterConfig, CrushRule, ErasureCodeProfile, MgrModule, MgrModuleConfig, Pool,
    RgwBucket, RgwS3Key, RgwUser,
};
use crate::domain::ports::ResourceKind;
use crate::error::{Error, Result};
use crate::provider::ProviderConfig;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// =============================================================================
// Addresses
// =============================================================================

/// Unique address of a declared resource, rendered as `<kind>.<name>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    pub kind: ResourceKind,
    pub name: String,
}

impl Address {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, name) = s
            .split_once('.')
            .ok_or_else(|| Error::Parse(format!("invalid resource address {:?}", s)))?;
        let kind = parse_kind(kind)?;
        if name.is_empty() {
            return Err(Error::Parse(format!("resource address {:?} has no name", s)));
        }
        Ok(Address::new(kind, name))
    }
}

/// Resolve a type name such as `ceph_pool`
pub fn parse_kind(name: &str) -> Result<ResourceKind> {
    ResourceKind::from_type_name(name).ok_or_else(|| {
        let known: Vec<&str> = ResourceKind::ALL.iter().map(|k| k.type_name()).collect();
        Error::Parse(format!(
            "unknown resource kind {:?}; expected one of {}",
            name,
            known.join(", ")
        ))
    })
}

// =============================================================================
// Manifest
// =============================================================================

/// One declared resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ResourceDecl {
    /// Resource type, e.g. `ceph_config`
    pub kind: String,
    /// Local name, unique per kind
    pub name: String,
    /// Controller model
    #[serde(default)]
    pub spec: serde_json::Value,
}

impl ResourceDecl {
    pub fn address(&self) -> Result<Address> {
        Ok(Address::new(parse_kind(&self.kind)?, self.name.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
}

impl Manifest {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("unable to read manifest {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    /// Kinds must be known and addresses unique
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for decl in &self.resources {
            if decl.name.trim().is_empty() {
                return Err(Error::validation(format!(
                    "a {} resource has an empty name",
                    decl.kind
                )));
            }
            let address = decl.address()?;
            if !seen.insert(address.clone()) {
                return Err(Error::validation(format!(
                    "resource {} is declared more than once",
                    address
                )));
            }
        }
        Ok(())
    }

    /// Declared addresses in order
    pub fn addresses(&self) -> Result<Vec<Address>> {
        self.resources.iter().map(ResourceDecl::address).collect()
    }
}

// =============================================================================
// Schema
// =============================================================================

/// JSON Schema of the manifest and of every resource model
pub fn schema() -> Result<serde_json::Value> {
    let mut resources = serde_json::Map::new();
    for kind in ResourceKind::ALL {
        let schema = match kind {
            ResourceKind::Auth => schema_for!(AuthIdentity),
            ResourceKind::Config => schema_for!(ClusterConfig),
            ResourceKind::MgrModule => schema_for!(MgrModule),
            ResourceKind::MgrModuleConfig => schema_for!(MgrModuleConfig),
            ResourceKind::RgwUser => schema_for!(RgwUser),
            ResourceKind::RgwS3Key => schema_for!(RgwS3Key),
            ResourceKind::Pool => schema_for!(Pool),
            ResourceKind::CrushRule => schema_for!(CrushRule),
            ResourceKind::ErasureCodeProfile => schema_for!(ErasureCodeProfile),
            ResourceKind::RgwBucket => schema_for!(RgwBucket),
        };
        resources.insert(kind.type_name().to_string(), serde_json::to_value(schema)?);
    }

    Ok(serde_json::json!({
        "manifest": serde_json::to_value(schema_for!(Manifest))?,
        "resources": resources,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const MANIFEST: &str = r#"
provider:
  endpoint: https://mgr-0:8443
  token: abc
resources:
  - kind: ceph_config
    name: tuning
    spec:
      config:
        osd:
          osd_max_backfills: 2
  - kind: ceph_rgw_user
    name: alice
    spec:
      uid: alice
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_yaml(MANIFEST).unwrap();
        assert_eq!(manifest.provider.token.as_deref(), Some("abc"));

        let addresses: Vec<String> = manifest
            .addresses()
            .unwrap()
            .iter()
            .map(|a| a.to_string())
            .collect();
        assert_eq!(addresses, vec!["ceph_config.tuning", "ceph_rgw_user.alice"]);

        let config: ClusterConfig = serde_json::from_value(manifest.resources[0].spec.clone()).unwrap();
        assert_eq!(config.config["osd"]["osd_max_backfills"], "2");
    }

    #[test]
    fn test_duplicate_and_unknown_resources() {
        let duplicate = format!("{}  - kind: ceph_rgw_user\n    name: alice\n", MANIFEST);
        let err = Manifest::from_yaml(&duplicate).unwrap_err();
        assert!(err.to_string().contains("declared more than once"));

        let unknown = "provider:\n  endpoint: https://a\n  token: t\nresources:\n  - kind: ceph_volume\n    name: x\n";
        assert_matches!(Manifest::from_yaml(unknown), Err(Error::Parse(_)));
    }

    #[test]
    fn test_address_parse() {
        let address: Address = "ceph_config.global.tuning".parse().unwrap();
        assert_eq!(address.kind, ResourceKind::Config);
        assert_eq!(address.name, "global.tuning");
        assert!("ceph_pool.".parse::<Address>().is_err());
        assert!("pool".parse::<Address>().is_err());
    }

    #[test]
    fn test_schema_covers_every_kind() {
        let schema = schema().unwrap();
        for kind in ResourceKind::ALL {
            assert!(schema["resources"].get(kind.type_name()).is_some());
        }
        assert!(schema["manifest"]["properties"].get("resources").is_some());
    }
}
