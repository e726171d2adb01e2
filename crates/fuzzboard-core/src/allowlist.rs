use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::{BugId, Corpus, CoreError};

/// Bug ids that were already published and must stay tracked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allowlist {
    ids: BTreeSet<BugId>,
}

impl Allowlist {
    /// Extracts the trailing id from every line that starts with `line_prefix`.
    pub fn from_document(document: &str, line_prefix: &str) -> Result<Self, CoreError> {
        if line_prefix.is_empty() {
            return Err(CoreError::Configuration(
                "allowlist line prefix cannot be empty".to_owned(),
            ));
        }

        let pattern = Regex::new(&format!(r"^{}\s*(\d+)\s*$", regex::escape(line_prefix)))
            .map_err(|error| {
                CoreError::Configuration(format!(
                    "allowlist prefix '{line_prefix}' does not form a valid pattern: {error}"
                ))
            })?;

        let mut ids = BTreeSet::new();
        for (line_number, line) in document.lines().enumerate() {
            if !line.starts_with(line_prefix) {
                continue;
            }
            let captures = pattern.captures(line.trim_end()).ok_or_else(|| {
                CoreError::Parse(format!(
                    "published document line {} starts with '{line_prefix}' but does not end in a bug id: {line}",
                    line_number + 1
                ))
            })?;
            ids.insert(BugId::parse(&captures[1])?);
        }

        debug!(ids = ids.len(), prefix = line_prefix, "extracted allowlist");
        Ok(Self { ids })
    }

    pub fn load(path: &Path, line_prefix: &str) -> Result<Self, CoreError> {
        let document = std::fs::read_to_string(path)
            .map_err(|error| CoreError::file_access(path, "read published document", error))?;
        Self::from_document(&document, line_prefix)
    }

    pub fn ids(&self) -> &BTreeSet<BugId> {
        &self.ids
    }

    pub fn contains(&self, id: BugId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<BugId> for Allowlist {
    fn from_iter<T: IntoIterator<Item = BugId>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Narrows `corpus` to ids that are either live or already published.
///
/// Duplicate and invalid resolutions are removed after the restriction, so the
/// allowlist can never resurrect them. One record survives per id (the first).
pub fn reconcile(corpus: &Corpus, allowlist: &Allowlist, fresh_ids: &BTreeSet<BugId>) -> Corpus {
    let keep = fresh_ids
        .union(allowlist.ids())
        .copied()
        .collect::<BTreeSet<_>>();

    let mut seen = HashSet::new();
    corpus
        .iter()
        .filter(|record| keep.contains(&record.id))
        .filter(|record| !record.is_duplicate() && !record.is_invalid())
        .filter(|record| seen.insert(record.id))
        .cloned()
        .collect()
}
