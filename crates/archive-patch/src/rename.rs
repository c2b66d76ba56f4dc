//! Rename maps
//!
//! A rename map lists target entries that are byte-identical copies of a
//! differently named entry in the old archive. The reconciler consumes it:
//! resolved pairs are removed, and whatever is left names sources that were
//! never found.
//!
//! The text form has one pair per line, new name first, separated by a tab:
//!
//! ```text
//! # new name<TAB>old name
//! meshes/armor/helm_v2.nif	meshes/armor/helm.nif
//! ```

use crate::path::normalize_entry_name;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::io::BufRead;

/// Mapping from new entry name to the old entry it was copied from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameMap {
    pairs: BTreeMap<String, String>,
}

impl RenameMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the tab-separated text form
    ///
    /// Blank lines and lines starting with `#` are skipped. Later lines
    /// override earlier ones for the same new name.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut map = Self::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim_end_matches('\r');
            if trimmed.trim().is_empty() || trimmed.trim_start().starts_with('#') {
                continue;
            }

            let (new_name, old_name) = trimmed.split_once('\t').ok_or_else(|| {
                Error::invalid_format(format!(
                    "Rename line {} has no tab separator: {trimmed:?}",
                    index + 1
                ))
            })?;
            if new_name.trim().is_empty() || old_name.trim().is_empty() {
                return Err(Error::invalid_format(format!(
                    "Rename line {} has an empty name",
                    index + 1
                )));
            }
            map.insert(new_name.trim(), old_name.trim());
        }
        Ok(map)
    }

    /// Add a pair; both names are normalized
    pub fn insert(&mut self, new_name: &str, old_name: &str) {
        self.pairs.insert(
            normalize_entry_name(new_name),
            normalize_entry_name(old_name),
        );
    }

    /// Old name recorded for `new_name`
    pub fn source_for(&self, new_name: &str) -> Option<&str> {
        self.pairs
            .get(&normalize_entry_name(new_name))
            .map(String::as_str)
    }

    /// Drop the pair for `new_name`, returning its old name
    pub fn resolve(&mut self, new_name: &str) -> Option<String> {
        self.pairs.remove(&normalize_entry_name(new_name))
    }

    /// Number of unresolved pairs
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether every pair has been resolved
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pairs as `(new, old)` in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(new, old)| (new.as_str(), old.as_str()))
    }
}

impl<N: AsRef<str>, O: AsRef<str>> FromIterator<(N, O)> for RenameMap {
    fn from_iter<I: IntoIterator<Item = (N, O)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (new_name, old_name) in iter {
            map.insert(new_name.as_ref(), old_name.as_ref());
        }
        map
    }
}
