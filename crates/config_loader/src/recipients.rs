//! Recipient list parsing
//!
//! One identifier per line. Blank lines and lines starting with `#` are
//! ignored; duplicates keep their first occurrence.

use std::collections::HashSet;
use std::path::Path;

use contracts::{ContractError, Recipient};
use tracing::debug;

/// Parsed recipient list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientList {
    /// Valid, deduplicated recipients in file order
    pub valid: Vec<Recipient>,
    /// Lines that are not valid identifiers (trimmed)
    pub invalid: Vec<String>,
    /// Number of dropped duplicates
    pub duplicates: usize,
}

impl RecipientList {
    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }
}

pub fn parse_recipients(text: &str) -> RecipientList {
    let mut list = RecipientList::default();
    let mut seen = HashSet::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.parse::<Recipient>() {
            Ok(recipient) if seen.insert(recipient) => list.valid.push(recipient),
            Ok(_) => list.duplicates += 1,
            Err(_) => list.invalid.push(line.to_string()),
        }
    }

    debug!(
        valid = list.valid.len(),
        invalid = list.invalid.len(),
        duplicates = list.duplicates,
        "Parsed recipient list"
    );
    list
}

pub fn load_recipients(path: &Path) -> Result<RecipientList, ContractError> {
    let bytes = std::fs::read(path)?;
    Ok(parse_recipients(&String::from_utf8_lossy(&bytes)))
}
