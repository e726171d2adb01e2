use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;

mod allowlist;
mod classify;
mod codec;
mod error;
mod merge;
mod report;
mod timeseries;
mod workdir;

pub use allowlist::{reconcile, Allowlist};
pub use classify::{
    Classification, ClassificationStrategy, KeywordRuleClassifier, OverrideLists,
    SingleHeuristicClassifier, DEFAULT_INTERNAL_ERROR_PHRASES, DEFAULT_MISCOMPILE_PHRASES,
};
pub use codec::{
    read_corpus_csv, read_corpus_csv_file, write_corpus_csv, COLUMN_BUG_ID, COLUMN_OPENED,
    COLUMN_RESOLUTION, COLUMN_STACK_TRACE, COLUMN_STATUS, COLUMN_SUMMARY,
};
pub use error::CoreError;
pub use merge::merge;
pub use report::{
    category_file_name, filtered_file_name, plot_file_name, render_cumulative_svg,
    render_link_list, render_tracker_report, RenderedFile, ReportBundle,
};
pub use timeseries::{aggregate, parse_opened_date, CumulativeSeries, SeriesPoint};
pub use workdir::WorkDir;

pub const DUPLICATE_RESOLUTIONS: &[&str] = &["DUPL", "DUPLICATE"];
pub const INVALID_RESOLUTIONS: &[&str] = &["INVA", "INVALID"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BugId(u64);

impl BugId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        trimmed
            .parse::<u64>()
            .map(Self)
            .map_err(|_| {
                CoreError::Parse(format!("bug id '{trimmed}' is not a non-negative integer"))
            })
    }
}

impl fmt::Display for BugId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl From<u64> for BugId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerSource {
    Bugzilla,
    Github,
}

impl TrackerSource {
    pub const fn as_key(self) -> &'static str {
        match self {
            Self::Bugzilla => "bugzilla",
            Self::Github => "github",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "bugzilla" => Some(Self::Bugzilla),
            "github" => Some(Self::Github),
            _ => None,
        }
    }
}

impl fmt::Display for TrackerSource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Miscompile,
    InternalError,
    Other,
}

impl Category {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Miscompile => "miscompile",
            Self::InternalError => "internal_error",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A tracker report normalized into the fields the pipeline reasons about.
///
/// Columns the pipeline does not interpret are kept in `extra` so that CSV
/// snapshots carry them through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugRecord {
    pub id: BugId,
    pub source: TrackerSource,
    pub title: String,
    pub status: String,
    pub resolution: String,
    pub opened: String,
    pub stack_trace: bool,
    pub extra: BTreeMap<String, String>,
}

impl BugRecord {
    pub fn new(
        id: u64,
        source: TrackerSource,
        title: impl Into<String>,
        resolution: impl Into<String>,
        opened: impl Into<String>,
    ) -> Self {
        Self {
            id: BugId::new(id),
            source,
            title: title.into(),
            status: String::new(),
            resolution: resolution.into(),
            opened: opened.into(),
            stack_trace: false,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_stack_trace(mut self, stack_trace: bool) -> Self {
        self.stack_trace = stack_trace;
        self
    }

    pub fn resolution_or_status(&self) -> &str {
        let resolution = self.resolution.trim();
        if resolution.is_empty() || resolution == "---" {
            self.status.trim()
        } else {
            resolution
        }
    }

    pub fn is_duplicate(&self) -> bool {
        resolution_in(&self.resolution, DUPLICATE_RESOLUTIONS)
    }

    pub fn is_invalid(&self) -> bool {
        resolution_in(&self.resolution, INVALID_RESOLUTIONS)
    }

    pub fn opened_date(&self) -> Result<NaiveDate, CoreError> {
        parse_opened_date(&self.opened).map_err(|error| match error {
            CoreError::Parse(message) => CoreError::Parse(format!("bug {}: {message}", self.id)),
            other => other,
        })
    }
}

fn resolution_in(resolution: &str, restricted: &[&str]) -> bool {
    let resolution = resolution.trim();
    restricted
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(resolution))
}

/// An ordered working set of records for one tracker.
///
/// Stages never mutate a corpus; each one builds a new one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Corpus {
    records: Vec<BugRecord>,
}

impl Corpus {
    pub fn new(records: Vec<BugRecord>) -> Self {
        Self { records }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[BugRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BugRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> BTreeSet<BugId> {
        self.records.iter().map(|record| record.id).collect()
    }

    pub fn contains_id(&self, id: BugId) -> bool {
        self.records.iter().any(|record| record.id == id)
    }

    pub fn get(&self, id: BugId) -> Option<&BugRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn filtered<F>(&self, predicate: F) -> Self
    where
        F: Fn(&BugRecord) -> bool,
    {
        self.records
            .iter()
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }

    pub fn sorted_by_id(&self) -> Vec<&BugRecord> {
        let mut sorted = self.records.iter().collect::<Vec<_>>();
        sorted.sort_by_key(|record| record.id);
        sorted
    }
}

impl FromIterator<BugRecord> for Corpus {
    fn from_iter<T: IntoIterator<Item = BugRecord>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Corpus {
    type Item = &'a BugRecord;
    type IntoIter = std::slice::Iter<'a, BugRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[async_trait]
pub trait BugSource: Send + Sync {
    fn tracker(&self) -> TrackerSource;

    async fn fetch(&self, workdir: &WorkDir) -> Result<Corpus, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bug_id_parse_trims_and_rejects_non_numeric_values() {
        assert_eq!(BugId::parse(" 112801 ").expect("parse id"), BugId::new(112801));
        let error = BugId::parse("PR112801").expect_err("reject prefixed id");
        assert!(matches!(error, CoreError::Parse(_)));
    }

    #[test]
    fn restricted_resolutions_match_case_insensitively() {
        let duplicate = BugRecord::new(1, TrackerSource::Bugzilla, "x", " dupl ", "2024-01-01");
        let invalid = BugRecord::new(2, TrackerSource::Bugzilla, "x", "INVALID", "2024-01-01");
        let fixed = BugRecord::new(3, TrackerSource::Bugzilla, "x", "FIXED", "2024-01-01");

        assert!(duplicate.is_duplicate());
        assert!(!duplicate.is_invalid());
        assert!(invalid.is_invalid());
        assert!(!fixed.is_duplicate() && !fixed.is_invalid());
    }

    #[test]
    fn resolution_or_status_falls_back_to_status_for_open_reports() {
        let open = BugRecord::new(1, TrackerSource::Bugzilla, "x", "---", "2024-01-01")
            .with_status("NEW");
        let fixed = BugRecord::new(2, TrackerSource::Bugzilla, "x", "FIXED", "2024-01-01")
            .with_status("RESOLVED");

        assert_eq!(open.resolution_or_status(), "NEW");
        assert_eq!(fixed.resolution_or_status(), "FIXED");
    }

    #[test]
    fn tracker_source_keys_roundtrip() {
        for tracker in [TrackerSource::Bugzilla, TrackerSource::Github] {
            assert_eq!(TrackerSource::from_key(tracker.as_key()), Some(tracker));
        }
        assert_eq!(TrackerSource::from_key("jira"), None);
    }

    #[test]
    fn corpus_sorted_by_id_leaves_the_original_order_untouched() {
        let corpus = Corpus::new(vec![
            BugRecord::new(3, TrackerSource::Github, "c", "", "2024-01-03"),
            BugRecord::new(1, TrackerSource::Github, "a", "", "2024-01-01"),
        ]);

        let sorted = corpus.sorted_by_id();
        assert_eq!(sorted[0].id, BugId::new(1));
        assert_eq!(corpus.records()[0].id, BugId::new(3));
    }
}
