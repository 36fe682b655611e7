//! Cephx capabilities
//!
//! A fixed-shape set of permission strings keyed by subsystem. The host
//! exposes them as an open string-keyed map, the Ceph Manager API as a list
//! of `{entity, cap}` pairs, and keyrings as `caps <sub> = "<value>"` lines.

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Subsystems
// =============================================================================

/// Ceph subsystem a capability applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Mds,
    Mgr,
    Mon,
    Osd,
}

impl Subsystem {
    /// All subsystems in render order
    pub const ALL: [Subsystem; 4] = [Subsystem::Mds, Subsystem::Mgr, Subsystem::Mon, Subsystem::Osd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subsystem::Mds => "mds",
            Subsystem::Mgr => "mgr",
            Subsystem::Mon => "mon",
            Subsystem::Osd => "osd",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subsystem {
    type Err = Error;

    /// Case-insensitive, as accepted by keyring files
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mds" => Ok(Subsystem::Mds),
            "mgr" => Ok(Subsystem::Mgr),
            "mon" => Ok(Subsystem::Mon),
            "osd" => Ok(Subsystem::Osd),
            _ => Err(Error::validation(format!(
                "unknown capability subsystem {:?}, expected one of mds, mgr, mon, osd",
                s
            ))),
        }
    }
}

// =============================================================================
// Wire Form
// =============================================================================

/// One capability as carried by the Ceph Manager API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapEntry {
    pub entity: String,
    pub cap: String,
}

// =============================================================================
// Capabilities
// =============================================================================

/// Permission strings for the four cephx subsystems
///
/// `Some("")` is kept distinct from `None` so that map conversion is
/// lossless, but both mean "not set" on the wire and in keyrings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Capabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mds: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mgr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osd: Option<String>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, subsystem: Subsystem) -> Option<&str> {
        match subsystem {
            Subsystem::Mds => self.mds.as_deref(),
            Subsystem::Mgr => self.mgr.as_deref(),
            Subsystem::Mon => self.mon.as_deref(),
            Subsystem::Osd => self.osd.as_deref(),
        }
    }

    pub fn set(&mut self, subsystem: Subsystem, value: impl Into<String>) {
        let slot = match subsystem {
            Subsystem::Mds => &mut self.mds,
            Subsystem::Mgr => &mut self.mgr,
            Subsystem::Mon => &mut self.mon,
            Subsystem::Osd => &mut self.osd,
        };
        *slot = Some(value.into());
    }

    /// Capabilities that are set and non-empty, in render order
    pub fn effective(&self) -> impl Iterator<Item = (Subsystem, &str)> + '_ {
        Subsystem::ALL
            .into_iter()
            .filter_map(move |s| self.get(s).filter(|v| !v.is_empty()).map(|v| (s, v)))
    }

    /// True when no capability would be sent on the wire
    pub fn is_empty(&self) -> bool {
        self.effective().next().is_none()
    }

    /// Build from an open string-keyed map, rejecting unknown keys
    ///
    /// Keys must be the lowercase subsystem names.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self> {
        let mut caps = Capabilities::default();
        for (key, value) in map {
            let subsystem = match key.as_str() {
                "mds" => Subsystem::Mds,
                "mgr" => Subsystem::Mgr,
                "mon" => Subsystem::Mon,
                "osd" => Subsystem::Osd,
                other => {
                    return Err(Error::validation(format!(
                        "invalid capability key {:?}, expected one of mds, mgr, mon, osd",
                        other
                    )))
                }
            };
            caps.set(subsystem, value.clone());
        }
        Ok(caps)
    }

    /// Convert to an open string-keyed map
    pub fn as_map(&self) -> BTreeMap<String, String> {
        Subsystem::ALL
            .into_iter()
            .filter_map(|s| self.get(s).map(|v| (s.as_str().to_string(), v.to_string())))
            .collect()
    }

    /// Convert to the Ceph Manager list-of-`{entity, cap}` form
    pub fn to_wire(&self) -> Vec<CapEntry> {
        self.effective()
            .map(|(s, v)| CapEntry {
                entity: s.as_str().to_string(),
                cap: v.to_string(),
            })
            .collect()
    }

    /// Build from the `caps` map the Ceph Manager returns when listing users
    pub fn from_wire_map(map: &BTreeMap<String, String>) -> Result<Self> {
        let mut caps = Capabilities::default();
        for (key, value) in map {
            let subsystem: Subsystem = key.parse()?;
            if !value.is_empty() {
                caps.set(subsystem, value.clone());
            }
        }
        Ok(caps)
    }

    /// Same capabilities ignoring the `None` / `Some("")` distinction
    pub fn equivalent(&self, other: &Capabilities) -> bool {
        self.effective().eq(other.effective())
    }
}

impl TryFrom<BTreeMap<String, String>> for Capabilities {
    type Error = Error;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self> {
        Capabilities::from_map(&map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_map_conversion_is_lossless() {
        let samples = [
            map(&[]),
            map(&[("mon", "allow r")]),
            map(&[("mon", "allow r"), ("osd", "allow rw pool=foo")]),
            map(&[("mds", "allow *"), ("mgr", "allow *"), ("mon", "allow *"), ("osd", "allow *")]),
            map(&[("mgr", "")]),
        ];
        for m in samples {
            let caps = Capabilities::from_map(&m).unwrap();
            assert_eq!(caps.as_map(), m);
        }
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Capabilities::from_map(&map(&[("rgw", "allow *")])).unwrap_err();
        assert!(err.to_string().contains("invalid capability key"));

        // map keys are exact, only keyrings are case-insensitive
        assert!(Capabilities::from_map(&map(&[("MON", "allow r")])).is_err());
    }

    #[test]
    fn test_wire_omits_empty_and_keeps_order() {
        let caps =
            Capabilities::from_map(&map(&[("osd", "allow rw"), ("mds", ""), ("mon", "allow r")]))
                .unwrap();
        let wire = caps.to_wire();
        assert_eq!(
            wire,
            vec![
                CapEntry { entity: "mon".into(), cap: "allow r".into() },
                CapEntry { entity: "osd".into(), cap: "allow rw".into() },
            ]
        );
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json[0]["entity"], "mon");
        assert_eq!(json[0]["cap"], "allow r");
    }

    #[test]
    fn test_subsystem_parse_case_insensitive() {
        assert_eq!("OSD".parse::<Subsystem>().unwrap(), Subsystem::Osd);
        assert_eq!("Mgr".parse::<Subsystem>().unwrap(), Subsystem::Mgr);
        assert!("rgw".parse::<Subsystem>().is_err());
    }

    #[test]
    fn test_equivalent_ignores_empty_strings() {
        let a = Capabilities::from_map(&map(&[("mon", "allow r"), ("mds", "")])).unwrap();
        let b = Capabilities::from_map(&map(&[("mon", "allow r")])).unwrap();
        assert_ne!(a, b);
        assert!(a.equivalent(&b));
        assert!(Capabilities::new().is_empty());
    }
}
