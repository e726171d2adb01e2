use std::path::{Path, PathBuf};
use std::sync::Arc;

use fuzzboard_core::{
    aggregate, merge, read_corpus_csv_file, reconcile, render_tracker_report, write_corpus_csv,
    Allowlist, BugSource, ClassificationStrategy, Corpus, CoreError, ReportBundle, TrackerSource,
    WorkDir,
};
use tracing::info;

/// Fetch, merge, reconcile, classify, aggregate and render for one tracker.
#[derive(Clone)]
pub struct TrackerPipeline {
    source: Arc<dyn BugSource>,
    strategy: Arc<dyn ClassificationStrategy>,
    link_base: String,
    baseline_csv: Option<PathBuf>,
    merged_csv: Option<PathBuf>,
}

impl std::fmt::Debug for TrackerPipeline {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TrackerPipeline")
            .field("tracker", &self.source.tracker())
            .field("strategy", &self.strategy.name())
            .field("link_base", &self.link_base)
            .field("baseline_csv", &self.baseline_csv)
            .field("merged_csv", &self.merged_csv)
            .finish()
    }
}

impl TrackerPipeline {
    pub fn new(
        source: Arc<dyn BugSource>,
        strategy: Arc<dyn ClassificationStrategy>,
        link_base: impl Into<String>,
    ) -> Self {
        Self {
            source,
            strategy,
            link_base: link_base.into(),
            baseline_csv: None,
            merged_csv: None,
        }
    }

    pub fn with_baseline_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.baseline_csv = Some(path.into());
        self
    }

    pub fn with_merged_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.merged_csv = Some(path.into());
        self
    }

    pub fn tracker(&self) -> TrackerSource {
        self.source.tracker()
    }

    pub fn allowlist_prefix(&self) -> String {
        format!("1. {}", self.link_base)
    }

    pub async fn run(
        &self,
        workdir: &WorkDir,
        published_document: &str,
    ) -> Result<PipelineOutput, CoreError> {
        let tracker = self.tracker();

        let fresh = self.source.fetch(workdir).await?;
        info!(%tracker, records = fresh.len(), "fetched fresh corpus");

        let baseline = match &self.baseline_csv {
            Some(path) => read_corpus_csv_file(path, tracker)?,
            None => Corpus::empty(),
        };
        let merged = merge(&baseline, &fresh);
        info!(
            %tracker,
            baseline = baseline.len(),
            records = merged.len(),
            "merged corpus"
        );

        // A report the tracker now marks duplicate is no longer live; its
        // baseline copy survives only through the allowlist.
        let live_ids = fresh.filtered(|record| !record.is_duplicate()).ids();
        let allowlist = Allowlist::from_document(published_document, &self.allowlist_prefix())?;
        let reconciled = reconcile(&merged, &allowlist, &live_ids);
        info!(
            %tracker,
            allowlist = allowlist.len(),
            records = reconciled.len(),
            "reconciled corpus"
        );

        let classification = self.strategy.classify(&reconciled);
        for (category, bucket) in classification.buckets() {
            info!(
                %tracker,
                %category,
                records = bucket.len(),
                strategy = self.strategy.name(),
                "classified"
            );
        }

        let series = aggregate(&reconciled)?;
        let bundle = render_tracker_report(
            tracker,
            &self.link_base,
            &reconciled,
            &classification,
            &series,
        )?;

        let merged_snapshot = match &self.merged_csv {
            Some(path) => Some(RenderedSnapshot {
                path: path.clone(),
                contents: write_corpus_csv(&merged, tracker)?,
            }),
            None => None,
        };

        Ok(PipelineOutput {
            tracker,
            reconciled: reconciled.len(),
            bundle,
            merged_snapshot,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSnapshot {
    pub path: PathBuf,
    pub contents: String,
}

/// Everything one pipeline produces, still in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    pub tracker: TrackerSource,
    pub reconciled: usize,
    pub bundle: ReportBundle,
    pub merged_snapshot: Option<RenderedSnapshot>,
}

/// Runs every pipeline in order. The first failure aborts the run before any
/// output is written.
pub async fn render_all(
    pipelines: &[TrackerPipeline],
    workdir: &WorkDir,
    published_document: &str,
) -> Result<Vec<PipelineOutput>, CoreError> {
    let mut outputs = Vec::with_capacity(pipelines.len());
    for pipeline in pipelines {
        outputs.push(pipeline.run(workdir, published_document).await?);
    }
    Ok(outputs)
}

pub fn write_outputs(
    outputs: &[PipelineOutput],
    output_dir: &Path,
) -> Result<Vec<PathBuf>, CoreError> {
    let mut written = Vec::new();
    for output in outputs {
        written.extend(output.bundle.write_to(output_dir)?);
        if let Some(snapshot) = &output.merged_snapshot {
            if let Some(parent) = snapshot.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|error| {
                        CoreError::file_access(parent, "create snapshot directory", error)
                    })?;
                }
            }
            std::fs::write(&snapshot.path, snapshot.contents.as_bytes()).map_err(|error| {
                CoreError::file_access(&snapshot.path, "write snapshot", error)
            })?;
            info!(
                tracker = %output.tracker,
                path = %snapshot.path.display(),
                "wrote merged corpus"
            );
            written.push(snapshot.path.clone());
        }
    }
    Ok(written)
}
