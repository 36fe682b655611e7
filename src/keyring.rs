//! Cephx keyring codec
//!
//! Parses and renders the text format produced by `ceph auth export`:
//!
//! ```text
//! [client.admin]
//!     key = AQB5m89objcKIxAAda2ULz/l3NH+mv9XzKePHQ==
//!     caps mon = "allow *"
//! ```
//!
//! The codec is pure; the auth controller feeds it the string returned by the
//! export endpoint and uses [`render`] to build `import_data` payloads.

use crate::domain::caps::{Capabilities, Subsystem};
use thiserror::Error;

/// Errors produced while parsing a keyring
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyringError {
    #[error("invalid keyring format")]
    InvalidFormat,

    /// `line` is 1-based, `text` is the line as it appeared in the input
    #[error("parse error:{line}:{text}")]
    Parse { line: usize, text: String },
}

/// One identity section of a keyring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyringEntry {
    pub entity: String,
    pub key: String,
    pub caps: Capabilities,
}

impl KeyringEntry {
    pub fn new(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            key: key.into(),
            caps: Capabilities::default(),
        }
    }

    pub fn with_caps(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }
}

enum Line<'a> {
    Blank,
    Section(&'a str),
    Key(&'a str),
    Caps(&'a str, &'a str),
    Other,
}

fn classify(line: &str) -> Line<'_> {
    if line.is_empty() {
        return Line::Blank;
    }
    if let Some(entity) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
        return Line::Section(entity.trim());
    }
    let Some((lhs, rhs)) = line.split_once('=') else {
        return Line::Other;
    };
    let lhs = lhs.trim();
    if lhs == "key" {
        return Line::Key(rhs.trim());
    }
    match lhs.strip_prefix("caps") {
        Some(rest) if rest.starts_with(char::is_whitespace) => Line::Caps(rest.trim(), rhs.trim()),
        _ => Line::Other,
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Parse keyring text into its identity sections
pub fn parse(input: &str) -> Result<Vec<KeyringEntry>, KeyringError> {
    let mut entries: Vec<KeyringEntry> = Vec::new();

    for (idx, original) in input.lines().enumerate() {
        let parse_error = || KeyringError::Parse {
            line: idx + 1,
            text: original.to_string(),
        };

        match classify(original.trim()) {
            Line::Blank => {}
            Line::Section(entity) => entries.push(KeyringEntry::new(entity, "")),
            line => {
                let Some(current) = entries.last_mut() else {
                    return Err(parse_error());
                };
                match line {
                    Line::Key(value) => current.key = value.to_string(),
                    Line::Caps(subsystem, value) => {
                        let subsystem: Subsystem =
                            subsystem.parse().map_err(|_| parse_error())?;
                        current.caps.set(subsystem, unquote(value));
                    }
                    // unknown settings inside a section are tolerated
                    _ => {}
                }
            }
        }
    }

    if entries.is_empty() {
        return Err(KeyringError::InvalidFormat);
    }
    Ok(entries)
}

/// Render identities to keyring text
pub fn render(entries: &[KeyringEntry]) -> String {
    entries
        .iter()
        .map(render_entry)
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_entry(entry: &KeyringEntry) -> String {
    let mut out = format!("[{}]\n\tkey = {}\n", entry.entity, entry.key);
    for (subsystem, value) in entry.caps.effective() {
        out.push_str(&format!("\tcaps {} = \"{}\"\n", subsystem, value));
    }
    out
}
