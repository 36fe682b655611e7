//! Import id parsers

use crate::error::{Error, Result};
use crate::reconcile::diff::CellKey;
use std::collections::BTreeSet;

/// Ids that ask for every importable object instead of a named one
pub const BULK_SELECTORS: [&str; 3] = ["", "*", "id-attribute-not-set"];

pub fn is_bulk(id: &str) -> bool {
    BULK_SELECTORS.contains(&id.trim())
}

/// Parse a comma separated list of `section.name` pairs
///
/// The last `.` separates section from name, so `osd.1.osd_max_backfills`
/// addresses `osd_max_backfills` in section `osd.1`. Option names never
/// contain dots; sections may.
pub fn parse_cells(id: &str) -> Result<Vec<CellKey>> {
    let mut seen = BTreeSet::new();
    let mut cells = Vec::new();

    for raw in id.split(',') {
        let item = raw.trim();
        let (section, name) = item
            .rsplit_once('.')
            .filter(|(s, n)| !s.is_empty() && !n.is_empty())
            .ok_or_else(|| {
                Error::validation(format!(
                    "invalid import id {:?}: expected <section>.<name>[,<section>.<name>...]",
                    item
                ))
            })?;
        let cell = CellKey::new(section, name);
        if !seen.insert(cell.clone()) {
            return Err(Error::validation(format!(
                "invalid import id: {} is listed more than once",
                item
            )));
        }
        cells.push(cell);
    }
    Ok(cells)
}

/// Plain object name; surrounding whitespace is ignored
pub fn parse_name<'a>(kind: &str, id: &'a str) -> Result<&'a str> {
    let name = id.trim();
    if name.is_empty() || is_bulk(name) {
        return Err(Error::validation(format!(
            "{} import requires the object name as id",
            kind
        )));
    }
    Ok(name)
}

/// `<uid>/<access_key>`; `uid` may name a subuser as `parent:subuser`
pub fn parse_s3_key_id(id: &str) -> Result<(&str, &str)> {
    id.trim()
        .rsplit_once('/')
        .filter(|(uid, key)| !uid.is_empty() && !key.is_empty())
        .ok_or_else(|| {
            Error::validation(format!(
                "invalid import id {:?}: expected <uid>/<access_key>",
                id
            ))
        })
}

/// Split an RGW uid into parent and optional subuser
pub fn split_subuser(uid: &str) -> (&str, Option<&str>) {
    match uid.split_once(':') {
        Some((parent, sub)) if !sub.is_empty() => (parent, Some(sub)),
        _ => (uid, None),
    }
}
