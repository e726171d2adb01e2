use std::collections::BTreeSet;

use tracing::debug;

use crate::{BugId, BugRecord, Category, Corpus};

pub const DEFAULT_MISCOMPILE_PHRASES: &[&str] = &[
    "miscompile",
    "miscompilation",
    "incorrect code",
    "incorrect behavior",
    "wrong code",
    "wrong result",
    "incorrect result",
    "incorrect output",
    "wrong output",
    "mismatch",
    "runtime",
    "runtime error",
];

pub const DEFAULT_INTERNAL_ERROR_PHRASES: &[&str] = &[
    "internal compiler error",
    "ice",
    "segmentation fault",
    "segfault",
    "unrecognizable insn",
    "unrecognize",
    "undefined",
    "assertion",
    "crash",
    "abort",
    "core dump",
    "core dumped",
];

/// Hand-maintained ids forced into a category regardless of their title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideLists {
    pub miscompile: BTreeSet<BugId>,
    pub internal_error: BTreeSet<BugId>,
}

impl OverrideLists {
    pub fn new(
        miscompile: impl IntoIterator<Item = u64>,
        internal_error: impl IntoIterator<Item = u64>,
    ) -> Self {
        Self {
            miscompile: miscompile.into_iter().map(BugId::new).collect(),
            internal_error: internal_error.into_iter().map(BugId::new).collect(),
        }
    }
}

/// A partition of one corpus into the categories of the strategy that built it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    buckets: Vec<(Category, Corpus)>,
}

impl Classification {
    fn new(buckets: Vec<(Category, Corpus)>) -> Self {
        Self { buckets }
    }

    pub fn bucket(&self, category: Category) -> Option<&Corpus> {
        self.buckets
            .iter()
            .find(|(candidate, _)| *candidate == category)
            .map(|(_, corpus)| corpus)
    }

    pub fn buckets(&self) -> impl Iterator<Item = (Category, &Corpus)> {
        self.buckets.iter().map(|(category, corpus)| (*category, corpus))
    }

    pub fn categories(&self) -> Vec<Category> {
        self.buckets.iter().map(|(category, _)| *category).collect()
    }

    pub fn total_len(&self) -> usize {
        self.buckets.iter().map(|(_, corpus)| corpus.len()).sum()
    }

    pub fn category_of(&self, id: BugId) -> Option<Category> {
        self.buckets
            .iter()
            .find(|(_, corpus)| corpus.contains_id(id))
            .map(|(category, _)| *category)
    }
}

pub trait ClassificationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn categories(&self) -> &'static [Category];

    fn classify(&self, corpus: &Corpus) -> Classification;
}

/// Keyword matching over titles plus per-category override ids.
///
/// Miscompile wins over internal-error when a record qualifies for both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRuleClassifier {
    miscompile_phrases: Vec<String>,
    internal_error_phrases: Vec<String>,
    overrides: OverrideLists,
}

impl KeywordRuleClassifier {
    pub fn new<M, I>(
        miscompile_phrases: M,
        internal_error_phrases: I,
        overrides: OverrideLists,
    ) -> Self
    where
        M: IntoIterator,
        M::Item: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self {
            miscompile_phrases: normalize_phrases(miscompile_phrases),
            internal_error_phrases: normalize_phrases(internal_error_phrases),
            overrides,
        }
    }

    pub fn with_default_phrases(overrides: OverrideLists) -> Self {
        Self::new(
            DEFAULT_MISCOMPILE_PHRASES.iter().copied(),
            DEFAULT_INTERNAL_ERROR_PHRASES.iter().copied(),
            overrides,
        )
    }

    pub fn overrides(&self) -> &OverrideLists {
        &self.overrides
    }

    fn selects(record: &BugRecord, phrases: &[String], overrides: &BTreeSet<BugId>) -> bool {
        overrides.contains(&record.id) || title_matches(&record.title, phrases)
    }
}

impl ClassificationStrategy for KeywordRuleClassifier {
    fn name(&self) -> &'static str {
        "keyword-rules"
    }

    fn categories(&self) -> &'static [Category] {
        &[Category::Miscompile, Category::InternalError, Category::Other]
    }

    fn classify(&self, corpus: &Corpus) -> Classification {
        let miscompile_ids = corpus
            .iter()
            .filter(|record| {
                Self::selects(record, &self.miscompile_phrases, &self.overrides.miscompile)
            })
            .map(|record| record.id)
            .collect::<BTreeSet<_>>();

        let internal_error_ids = corpus
            .iter()
            .filter(|record| !miscompile_ids.contains(&record.id))
            .filter(|record| {
                Self::selects(
                    record,
                    &self.internal_error_phrases,
                    &self.overrides.internal_error,
                )
            })
            .map(|record| record.id)
            .collect::<BTreeSet<_>>();

        debug!(
            miscompile = miscompile_ids.len(),
            internal_error = internal_error_ids.len(),
            "keyword classification complete"
        );

        Classification::new(vec![
            (
                Category::Miscompile,
                corpus.filtered(|record| miscompile_ids.contains(&record.id)),
            ),
            (
                Category::InternalError,
                corpus.filtered(|record| internal_error_ids.contains(&record.id)),
            ),
            (
                Category::Other,
                corpus.filtered(|record| {
                    !miscompile_ids.contains(&record.id) && !internal_error_ids.contains(&record.id)
                }),
            ),
        ])
    }
}

/// Splits on the stack-trace flag computed when the record was fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleHeuristicClassifier;

impl ClassificationStrategy for SingleHeuristicClassifier {
    fn name(&self) -> &'static str {
        "stack-trace-heuristic"
    }

    fn categories(&self) -> &'static [Category] {
        &[Category::Miscompile, Category::InternalError]
    }

    fn classify(&self, corpus: &Corpus) -> Classification {
        Classification::new(vec![
            (
                Category::Miscompile,
                corpus.filtered(|record| !record.stack_trace),
            ),
            (
                Category::InternalError,
                corpus.filtered(|record| record.stack_trace),
            ),
        ])
    }
}

fn normalize_phrases<P>(phrases: P) -> Vec<String>
where
    P: IntoIterator,
    P::Item: AsRef<str>,
{
    phrases
        .into_iter()
        .map(|phrase| phrase.as_ref().trim().to_lowercase())
        .filter(|phrase| !phrase.is_empty())
        .collect()
}

fn title_matches(title: &str, phrases: &[String]) -> bool {
    let title = title.to_lowercase();
    phrases.iter().any(|phrase| title.contains(phrase.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrackerSource;

    fn record(id: u64, title: &str) -> BugRecord {
        BugRecord::new(id, TrackerSource::Bugzilla, title, "---", "2024-01-01")
    }

    fn bucket_ids(classification: &Classification, category: Category) -> Vec<u64> {
        classification
            .bucket(category)
            .expect("bucket exists")
            .iter()
            .map(|record| record.id.get())
            .collect()
    }

    #[test]
    fn keyword_classifier_routes_titles_to_their_category() {
        let corpus = Corpus::new(vec![
            record(1, "[14 Regression] Wrong code at -O3 with vectorization"),
            record(2, "ICE: in extract_insn, at recog.cc:2812"),
            record(3, "Missed optimization for popcount"),
        ]);
        let classifier = KeywordRuleClassifier::with_default_phrases(OverrideLists::default());

        let classification = classifier.classify(&corpus);

        assert_eq!(bucket_ids(&classification, Category::Miscompile), vec![1]);
        assert_eq!(bucket_ids(&classification, Category::InternalError), vec![2]);
        assert_eq!(bucket_ids(&classification, Category::Other), vec![3]);
    }

    #[test]
    fn dual_matching_title_lands_in_miscompile() {
        let corpus = Corpus::new(vec![record(
            10,
            "RISC-V: runtime mismatch and segfault with -march=rv64gcv",
        )]);
        let classifier = KeywordRuleClassifier::with_default_phrases(OverrideLists::default());

        let classification = classifier.classify(&corpus);

        assert_eq!(bucket_ids(&classification, Category::Miscompile), vec![10]);
        assert!(classification
            .bucket(Category::InternalError)
            .expect("ice bucket")
            .is_empty());
    }

    #[test]
    fn internal_error_override_claims_titles_without_phrases() {
        let corpus = Corpus::new(vec![record(115143, "Hang in tree-vect with -O3")]);
        let classifier =
            KeywordRuleClassifier::with_default_phrases(OverrideLists::new([], [115143]));

        let classification = classifier.classify(&corpus);

        assert_eq!(
            classification.category_of(BugId::new(115143)),
            Some(Category::InternalError)
        );
    }

    #[test]
    fn miscompile_override_beats_an_internal_error_phrase() {
        let corpus = Corpus::new(vec![record(112801, "ICE in vsetvl pass")]);
        let classifier =
            KeywordRuleClassifier::with_default_phrases(OverrideLists::new([112801], []));

        let classification = classifier.classify(&corpus);

        assert_eq!(
            classification.category_of(BugId::new(112801)),
            Some(Category::Miscompile)
        );
    }

    #[test]
    fn override_ids_absent_from_the_corpus_are_ignored() {
        let corpus = Corpus::new(vec![record(1, "Missed optimization")]);
        let classifier =
            KeywordRuleClassifier::with_default_phrases(OverrideLists::new([99], [98]));

        let classification = classifier.classify(&corpus);

        assert_eq!(classification.total_len(), 1);
        assert_eq!(bucket_ids(&classification, Category::Other), vec![1]);
    }

    #[test]
    fn phrase_matching_ignores_case_and_blank_phrases() {
        let classifier =
            KeywordRuleClassifier::new(["  ", "WRONG CODE"], ["Crash"], OverrideLists::default());
        let corpus = Corpus::new(vec![
            record(1, "wrong code"),
            record(2, "CRASH in lra"),
            record(3, "slow"),
        ]);

        let classification = classifier.classify(&corpus);

        assert_eq!(bucket_ids(&classification, Category::Miscompile), vec![1]);
        assert_eq!(bucket_ids(&classification, Category::InternalError), vec![2]);
        assert_eq!(bucket_ids(&classification, Category::Other), vec![3]);
    }

    #[test]
    fn single_heuristic_splits_on_the_stack_trace_flag() {
        let corpus = Corpus::new(vec![
            BugRecord::new(
                70001,
                TrackerSource::Github,
                "[RISCV] Assertion failed",
                "",
                "2024-01-01",
            )
            .with_stack_trace(false),
            BugRecord::new(70002, TrackerSource::Github, "wrong code", "", "2024-01-02")
                .with_stack_trace(true),
        ]);

        let classification = SingleHeuristicClassifier.classify(&corpus);

        assert_eq!(
            classification.categories(),
            vec![Category::Miscompile, Category::InternalError]
        );
        assert_eq!(bucket_ids(&classification, Category::Miscompile), vec![70001]);
        assert_eq!(bucket_ids(&classification, Category::InternalError), vec![70002]);
        assert!(classification.bucket(Category::Other).is_none());
    }
}
