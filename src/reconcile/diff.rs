//! Keyed diff over composite maps

use std::collections::BTreeMap;
use std::fmt;

/// Address of one cluster configuration cell
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub section: String,
    pub name: String,
}

impl CellKey {
    pub fn new(section: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.section, self.name)
    }
}

/// Flatten a section → name → value map into cells
pub fn flatten(
    groups: &BTreeMap<String, BTreeMap<String, String>>,
) -> BTreeMap<CellKey, String> {
    groups
        .iter()
        .flat_map(|(section, names)| {
            names
                .iter()
                .map(move |(name, value)| (CellKey::new(section, name), value.clone()))
        })
        .collect()
}

/// Inverse of [`flatten`]
pub fn group(cells: BTreeMap<CellKey, String>) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut groups: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for (key, value) in cells {
        groups.entry(key.section).or_default().insert(key.name, value);
    }
    groups
}

/// Mutations needed to move from one keyed map to another
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedDiff<K, V> {
    pub create: Vec<(K, V)>,
    pub update: Vec<(K, V)>,
    pub delete: Vec<K>,
}

impl<K, V> KeyedDiff<K, V> {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// Keys that must be written, created first
    pub fn upserts(&self) -> impl Iterator<Item = &(K, V)> {
        self.create.iter().chain(self.update.iter())
    }
}

/// Compare `prior` and `plan`; unchanged keys appear in no set
pub fn diff<K, V>(prior: &BTreeMap<K, V>, plan: &BTreeMap<K, V>) -> KeyedDiff<K, V>
where
    K: Ord + Clone,
    V: PartialEq + Clone,
{
    let mut result = KeyedDiff {
        create: Vec::new(),
        update: Vec::new(),
        delete: Vec::new(),
    };

    for (key, value) in plan {
        match prior.get(key) {
            None => result.create.push((key.clone(), value.clone())),
            Some(old) if old != value => result.update.push((key.clone(), value.clone())),
            Some(_) => {}
        }
    }
    for key in prior.keys() {
        if !plan.contains_key(key) {
            result.delete.push(key.clone());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(cells: &[(&str, &str, &str)]) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut map: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (section, name, value) in cells {
            map.entry(section.to_string())
                .or_default()
                .insert(name.to_string(), value.to_string());
        }
        map
    }

    #[test]
    fn test_diff_sets() {
        let prior = flatten(&groups(&[
            ("global", "a", "1"),
            ("global", "b", "2"),
            ("osd", "c", "3"),
        ]));
        let plan = flatten(&groups(&[
            ("global", "a", "1"),
            ("global", "b", "20"),
            ("mon", "d", "4"),
        ]));

        let d = diff(&prior, &plan);
        assert_eq!(d.create, vec![(CellKey::new("mon", "d"), "4".to_string())]);
        assert_eq!(d.update, vec![(CellKey::new("global", "b"), "20".to_string())]);
        assert_eq!(d.delete, vec![CellKey::new("osd", "c")]);
        assert_eq!(d.upserts().count(), 2);
    }

    #[test]
    fn test_applying_diff_yields_plan() {
        let prior = flatten(&groups(&[("global", "x", "1"), ("osd", "y", "2")]));
        let plan = flatten(&groups(&[("osd", "x", "1"), ("osd", "y", "3")]));

        let d = diff(&prior, &plan);
        let mut server = prior.clone();
        for key in &d.delete {
            server.remove(key);
        }
        for (key, value) in d.upserts() {
            server.insert(key.clone(), value.clone());
        }
        assert_eq!(server, plan);
    }

    #[test]
    fn test_identical_maps() {
        let cells = flatten(&groups(&[("global", "x", "1")]));
        assert!(diff(&cells, &cells).is_empty());
    }

    #[test]
    fn test_group_roundtrip() {
        let original = groups(&[("global", "x", "1"), ("osd.1", "y", "2")]);
        assert_eq!(group(flatten(&original)), original);
    }
}
