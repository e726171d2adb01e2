use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use fuzzboard_config::{load_override_lists, FuzzboardConfig};
use fuzzboard_core::{
    BugSource, CoreError, KeywordRuleClassifier, SingleHeuristicClassifier, TrackerSource,
    WorkDir,
};
use integration_bugzilla::{BugzillaConfig, BugzillaSource, SavedBugzillaSource};
use integration_github::{GithubIssueSource, GithubSearchConfig};
use tracing::info;

mod pipeline;

pub use pipeline::{render_all, write_outputs, PipelineOutput, RenderedSnapshot, TrackerPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerSelection {
    Bugzilla,
    Github,
    #[default]
    All,
}

impl TrackerSelection {
    pub fn trackers(self) -> &'static [TrackerSource] {
        match self {
            Self::Bugzilla => &[TrackerSource::Bugzilla],
            Self::Github => &[TrackerSource::Github],
            Self::All => &[TrackerSource::Bugzilla, TrackerSource::Github],
        }
    }
}

impl FromStr for TrackerSelection {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bugzilla" => Ok(Self::Bugzilla),
            "github" => Ok(Self::Github),
            "all" => Ok(Self::All),
            other => Err(CoreError::Configuration(format!(
                "Unknown tracker '{other}'. Use --tracker <bugzilla|github|all>."
            ))),
        }
    }
}

impl fmt::Display for TrackerSelection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Bugzilla => "bugzilla",
            Self::Github => "github",
            Self::All => "all",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOptions {
    pub selection: TrackerSelection,
    pub offline: bool,
}

pub fn build_pipelines(
    config: &FuzzboardConfig,
    options: RunOptions,
) -> Result<Vec<TrackerPipeline>, CoreError> {
    options
        .selection
        .trackers()
        .iter()
        .map(|tracker| match tracker {
            TrackerSource::Bugzilla => build_bugzilla_pipeline(config, options.offline),
            TrackerSource::Github => build_github_pipeline(config),
        })
        .collect()
}

fn build_bugzilla_pipeline(
    config: &FuzzboardConfig,
    offline: bool,
) -> Result<TrackerPipeline, CoreError> {
    let settings = &config.bugzilla;
    let source: Arc<dyn BugSource> = if offline {
        Arc::new(SavedBugzillaSource)
    } else {
        let search = match &settings.search_url {
            Some(search_url) => BugzillaConfig::new(search_url.as_str())?,
            None => BugzillaConfig::from_base_url(&settings.base_url, &settings.provenance_phrase)?,
        };
        Arc::new(BugzillaSource::new(search)?)
    };

    let overrides = load_override_lists(Path::new(&config.override_lists))?;
    let classifier = KeywordRuleClassifier::new(
        &config.classifier.miscompile_phrases,
        &config.classifier.internal_error_phrases,
        overrides,
    );

    Ok(TrackerPipeline::new(source, Arc::new(classifier), settings.link_base.as_str())
        .with_baseline_csv(&settings.baseline_csv)
        .with_merged_csv(&settings.merged_csv))
}

fn build_github_pipeline(config: &FuzzboardConfig) -> Result<TrackerPipeline, CoreError> {
    let settings = &config.github;
    let token = settings
        .token()
        .map_err(|error| CoreError::Configuration(error.to_string()))?;
    let search = GithubSearchConfig {
        api_url: settings.api_url.clone(),
        repository: settings.repository.clone(),
        provenance_phrase: settings.provenance_phrase.clone(),
        stack_trace_marker: settings.stack_trace_marker.clone(),
        page_size: settings.page_size,
        request_timeout: settings.request_timeout(),
    };
    let source = GithubIssueSource::new(search, token)?;

    let pipeline = TrackerPipeline::new(
        Arc::new(source),
        Arc::new(SingleHeuristicClassifier),
        settings.link_base.as_str(),
    );
    Ok(match &settings.baseline_csv {
        Some(path) => pipeline.with_baseline_csv(path),
        None => pipeline,
    })
}

pub fn open_workdir(config: &FuzzboardConfig, options: RunOptions) -> Result<WorkDir, CoreError> {
    match (&config.scratch_dir, options.offline) {
        (Some(path), _) => WorkDir::persistent(path),
        (None, true) => Err(CoreError::Configuration(
            "--offline re-parses a previous download and needs scratch_dir to be configured"
                .to_owned(),
        )),
        (None, false) => WorkDir::temporary(),
    }
}

pub fn read_published_document(path: &Path) -> Result<String, CoreError> {
    std::fs::read_to_string(path)
        .map_err(|error| CoreError::file_access(path, "read published document", error))
}

/// Renders every selected tracker, then writes all outputs.
pub async fn run(config: &FuzzboardConfig, options: RunOptions) -> Result<Vec<PathBuf>, CoreError> {
    let workdir = open_workdir(config, options)?;
    let pipelines = build_pipelines(config, options)?;
    let document = read_published_document(Path::new(&config.published_document))?;
    info!(
        selection = %options.selection,
        offline = options.offline,
        scratch = %workdir.path().display(),
        "starting run"
    );

    let written = execute(&pipelines, &workdir, &document, Path::new(&config.output_dir)).await?;
    info!(files = written.len(), output_dir = %config.output_dir, "run complete");
    Ok(written)
}

/// Nothing reaches `output_dir` unless every pipeline rendered successfully.
pub async fn execute(
    pipelines: &[TrackerPipeline],
    workdir: &WorkDir,
    published_document: &str,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, CoreError> {
    let outputs = render_all(pipelines, workdir, published_document).await?;
    write_outputs(&outputs, output_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> FuzzboardConfig {
        let mut config = FuzzboardConfig::default();
        config.output_dir = dir.join("out").to_string_lossy().into_owned();
        config.override_lists = dir.join("overrides.toml").to_string_lossy().into_owned();
        config.github.token_env = "FUZZBOARD_APP_TEST_UNSET_TOKEN".to_owned();
        config
    }

    #[test]
    fn tracker_selection_parses_known_names() {
        let parse = |raw: &str| raw.parse::<TrackerSelection>().expect("parse");
        assert_eq!(parse("bugzilla"), TrackerSelection::Bugzilla);
        assert_eq!(parse(" GitHub "), TrackerSelection::Github);
        assert_eq!(parse("all"), TrackerSelection::All);
        assert!(matches!(
            "gitlab".parse::<TrackerSelection>(),
            Err(CoreError::Configuration(_))
        ));
        assert_eq!(
            TrackerSelection::All.trackers(),
            &[TrackerSource::Bugzilla, TrackerSource::Github]
        );
    }

    #[test]
    fn offline_runs_require_a_scratch_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config_in(temp.path());
        let options = RunOptions {
            selection: TrackerSelection::Bugzilla,
            offline: true,
        };

        let error = open_workdir(&config, options).expect_err("no scratch dir");

        assert!(matches!(error, CoreError::Configuration(_)));
    }

    #[test]
    fn configured_scratch_directory_is_kept() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = config_in(temp.path());
        config.scratch_dir = Some(temp.path().join("scratch").to_string_lossy().into_owned());

        let workdir = open_workdir(&config, RunOptions::default()).expect("workdir");

        assert!(!workdir.is_temporary());
        assert!(temp.path().join("scratch").is_dir());
    }

    #[test]
    fn offline_bugzilla_pipeline_uses_configured_overrides() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config_in(temp.path());
        std::fs::write(
            temp.path().join("overrides.toml"),
            "version = 1\n[bugzilla]\nmiscompile = [1]\n",
        )
        .expect("write overrides");
        let options = RunOptions {
            selection: TrackerSelection::Bugzilla,
            offline: true,
        };

        let pipelines = build_pipelines(&config, options).expect("pipelines");

        assert_eq!(pipelines.len(), 1);
        assert_eq!(pipelines[0].tracker(), TrackerSource::Bugzilla);
        assert_eq!(
            pipelines[0].allowlist_prefix(),
            "1. https://gcc.gnu.org/bugzilla/show_bug.cgi?id="
        );
    }

    #[test]
    fn bugzilla_pipeline_fails_without_override_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config_in(temp.path());
        let options = RunOptions {
            selection: TrackerSelection::Bugzilla,
            offline: true,
        };

        let error = build_pipelines(&config, options).expect_err("missing overrides");

        assert!(matches!(error, CoreError::FileAccess(_)));
    }

    #[test]
    fn github_pipeline_requires_a_token() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = config_in(temp.path());
        let options = RunOptions {
            selection: TrackerSelection::Github,
            offline: false,
        };

        let error = build_pipelines(&config, options).expect_err("missing token");

        assert!(matches!(
            error,
            CoreError::Configuration(message) if message.contains("FUZZBOARD_APP_TEST_UNSET_TOKEN")
        ));
    }
}
