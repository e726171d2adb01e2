use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use fuzzboard_core::{read_corpus_csv_file, BugSource, Corpus, CoreError, TrackerSource, WorkDir};
use reqwest::{StatusCode, Url};
use tracing::info;

pub const DEFAULT_BUGZILLA_BASE_URL: &str = "https://gcc.gnu.org/bugzilla";
pub const DEFAULT_PROVENANCE_PHRASE: &str = "found via fuzzer";
pub const RAW_CSV_SCRATCH_FILE: &str = "temp-fuzzer-find-reports.csv";

const SEARCH_STATUSES: &[&str] = &[
    "UNCONFIRMED",
    "NEW",
    "ASSIGNED",
    "SUSPENDED",
    "WAITING",
    "REOPENED",
    "RESOLVED",
    "VERIFIED",
    "CLOSED",
];
const SEARCH_RESOLUTIONS: &[&str] = &[
    "---",
    "FIXED",
    "INVALID",
    "WONTFIX",
    "DUPLICATE",
    "WORKSFORME",
    "MOVED",
];
const SEARCH_COLUMNS: &str =
    "product,component,assigned_to,bug_status,resolution,short_desc,opendate,changeddate";

/// Builds the buglist query for every report whose comments mention `phrase`,
/// across all statuses and resolutions, as human-readable CSV.
pub fn build_search_url(base_url: &str, phrase: &str) -> Result<String, CoreError> {
    let endpoint = format!("{}/buglist.cgi", base_url.trim_end_matches('/'));

    let mut params: Vec<(&str, &str)> = Vec::new();
    params.extend(SEARCH_STATUSES.iter().map(|status| ("bug_status", *status)));
    params.extend(SEARCH_RESOLUTIONS.iter().map(|resolution| ("resolution", *resolution)));
    params.extend([
        ("f1", "longdesc"),
        ("o1", "substring"),
        ("v1", phrase),
        ("query_format", "advanced"),
        ("columnlist", SEARCH_COLUMNS),
        ("ctype", "csv"),
        ("human", "1"),
    ]);

    Url::parse_with_params(&endpoint, &params)
        .map(String::from)
        .map_err(|error| {
            CoreError::Configuration(format!(
                "Bugzilla base URL '{base_url}' is not a valid URL: {error}"
            ))
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugzillaConfig {
    pub search_url: String,
}

impl BugzillaConfig {
    pub fn new(search_url: impl Into<String>) -> Result<Self, CoreError> {
        let search_url = search_url.into().trim().to_owned();
        if search_url.is_empty() {
            return Err(CoreError::Configuration(
                "Bugzilla search URL cannot be empty.".to_owned(),
            ));
        }
        Ok(Self { search_url })
    }

    pub fn from_base_url(base_url: &str, phrase: &str) -> Result<Self, CoreError> {
        Self::new(build_search_url(base_url, phrase)?)
    }
}

#[async_trait]
pub trait BugzillaTransport: Send + Sync {
    async fn fetch_csv(&self, url: &str) -> Result<String, CoreError>;
}

#[derive(Clone)]
pub struct ReqwestBugzillaTransport {
    client: reqwest::Client,
}

impl fmt::Debug for ReqwestBugzillaTransport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ReqwestBugzillaTransport")
            .field("client", &self.client)
            .finish()
    }
}

impl ReqwestBugzillaTransport {
    pub fn new() -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .user_agent("fuzzboard/integration-bugzilla")
            .build()
            .map_err(|error| {
                CoreError::Configuration(format!("failed to build Bugzilla HTTP client: {error}"))
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BugzillaTransport for ReqwestBugzillaTransport {
    async fn fetch_csv(&self, url: &str) -> Result<String, CoreError> {
        let response = self.client.get(url).send().await.map_err(|error| {
            CoreError::Fetch(format!("Bugzilla search request failed: {error}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            CoreError::Fetch(format!("Bugzilla search response read failed: {error}"))
        })?;

        if status != StatusCode::OK {
            return Err(CoreError::Fetch(format!(
                "Bugzilla search returned HTTP {status}: {}",
                truncate_for_error(&body)
            )));
        }
        Ok(body)
    }
}

/// Fetches the saved search, stores the raw CSV in the scratch directory and
/// parses it from there.
#[derive(Clone)]
pub struct BugzillaSource {
    config: BugzillaConfig,
    transport: Arc<dyn BugzillaTransport>,
}

impl fmt::Debug for BugzillaSource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BugzillaSource")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BugzillaSource {
    pub fn new(config: BugzillaConfig) -> Result<Self, CoreError> {
        let transport = ReqwestBugzillaTransport::new()?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: BugzillaConfig, transport: Arc<dyn BugzillaTransport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &BugzillaConfig {
        &self.config
    }
}

#[async_trait]
impl BugSource for BugzillaSource {
    fn tracker(&self) -> TrackerSource {
        TrackerSource::Bugzilla
    }

    async fn fetch(&self, workdir: &WorkDir) -> Result<Corpus, CoreError> {
        let body = self.transport.fetch_csv(&self.config.search_url).await?;
        let raw_path = workdir.write_scratch(RAW_CSV_SCRATCH_FILE, body.as_bytes())?;
        let corpus = read_corpus_csv_file(&raw_path, TrackerSource::Bugzilla)?;
        info!(
            records = corpus.len(),
            raw_csv = %raw_path.display(),
            "fetched Bugzilla reports"
        );
        Ok(corpus)
    }
}

/// Re-parses the raw CSV a previous run left in a persistent scratch directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct SavedBugzillaSource;

#[async_trait]
impl BugSource for SavedBugzillaSource {
    fn tracker(&self) -> TrackerSource {
        TrackerSource::Bugzilla
    }

    async fn fetch(&self, workdir: &WorkDir) -> Result<Corpus, CoreError> {
        let raw_path = workdir.scratch_path(RAW_CSV_SCRATCH_FILE);
        let corpus = read_corpus_csv_file(&raw_path, TrackerSource::Bugzilla)?;
        info!(
            records = corpus.len(),
            raw_csv = %raw_path.display(),
            "re-parsed saved Bugzilla reports"
        );
        Ok(corpus)
    }
}

fn truncate_for_error(body: &str) -> String {
    const MAX_LEN: usize = 200;
    if body.chars().count() <= MAX_LEN {
        body.to_owned()
    } else {
        format!("{}...", body.chars().take(MAX_LEN).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuzzboard_core::BugId;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    const EXPORT: &str = "\
\"Bug ID\",\"Product\",\"Component\",\"Assignee\",\"Status\",\"Resolution\",\"Summary\",\"Opened\",\"Changed\"
112561,\"gcc\",\"target\",\"unassigned\",\"RESOLVED\",\"FIXED\",\"RISC-V: Wrong code at -O3\",\"2023-11-15 19:34:56\",\"2023-12-01 10:00:00\"
112855,\"gcc\",\"middle-end\",\"unassigned\",\"NEW\",\"---\",\"Incorrect result with -ftree-vectorize\",\"2023-12-04 11:12:13\",\"2023-12-04 11:12:13\"
";

    #[derive(Debug, Default)]
    struct StubTransport {
        requests: Mutex<Vec<String>>,
        responses: Mutex<VecDeque<Result<String, CoreError>>>,
    }

    impl StubTransport {
        async fn push_response(&self, response: Result<String, CoreError>) {
            self.responses.lock().await.push_back(response);
        }

        async fn requests(&self) -> Vec<String> {
            self.requests.lock().await.clone()
        }
    }

    #[async_trait]
    impl BugzillaTransport for StubTransport {
        async fn fetch_csv(&self, url: &str) -> Result<String, CoreError> {
            self.requests.lock().await.push(url.to_owned());
            self.responses.lock().await.pop_front().unwrap_or_else(|| {
                Err(CoreError::Fetch(
                    "stub transport has no more queued responses".to_owned(),
                ))
            })
        }
    }

    fn config() -> BugzillaConfig {
        BugzillaConfig::from_base_url(DEFAULT_BUGZILLA_BASE_URL, DEFAULT_PROVENANCE_PHRASE)
            .expect("default config")
    }

    #[test]
    fn search_url_requests_every_status_and_the_provenance_phrase_as_csv() {
        let url = build_search_url("https://gcc.gnu.org/bugzilla/", "found via fuzzer")
            .expect("build url");

        assert!(url.starts_with(
            "https://gcc.gnu.org/bugzilla/buglist.cgi?bug_status=UNCONFIRMED&"
        ));
        assert!(url.contains("bug_status=CLOSED"));
        assert!(url.contains("resolution=---&resolution=FIXED"));
        assert!(url.contains("f1=longdesc&o1=substring&v1=found+via+fuzzer"));
        assert!(url.contains("opendate"));
        assert!(url.ends_with("ctype=csv&human=1"));
    }

    #[test]
    fn search_url_rejects_malformed_base_urls() {
        let error = build_search_url("not a url", "found via fuzzer").expect_err("reject url");
        assert!(matches!(error, CoreError::Configuration(_)));
    }

    #[test]
    fn config_rejects_blank_search_url() {
        assert!(matches!(BugzillaConfig::new("  "), Err(CoreError::Configuration(_))));
    }

    #[tokio::test]
    async fn fetch_saves_the_raw_csv_and_parses_it() {
        let transport = Arc::new(StubTransport::default());
        transport.push_response(Ok(EXPORT.to_owned())).await;
        let source = BugzillaSource::with_transport(config(), transport.clone());
        let workdir = WorkDir::temporary().expect("workdir");

        let corpus = source.fetch(&workdir).await.expect("fetch");

        assert_eq!(transport.requests().await, vec![config().search_url]);
        assert_eq!(
            corpus.iter().map(|record| record.id).collect::<Vec<_>>(),
            vec![BugId::new(112561), BugId::new(112855)]
        );
        assert_eq!(corpus.records()[1].title, "Incorrect result with -ftree-vectorize");
        assert_eq!(
            workdir.read_scratch(RAW_CSV_SCRATCH_FILE).expect("scratch copy"),
            EXPORT
        );
    }

    #[tokio::test]
    async fn fetch_propagates_transport_failures_without_touching_scratch() {
        let transport = Arc::new(StubTransport::default());
        transport
            .push_response(Err(CoreError::Fetch("HTTP 503".to_owned())))
            .await;
        let source = BugzillaSource::with_transport(config(), transport);
        let workdir = WorkDir::temporary().expect("workdir");

        let error = source.fetch(&workdir).await.expect_err("fetch should fail");

        assert_eq!(error, CoreError::Fetch("HTTP 503".to_owned()));
        assert!(!workdir.scratch_path(RAW_CSV_SCRATCH_FILE).exists());
    }

    #[tokio::test]
    async fn fetch_rejects_exports_missing_required_columns() {
        let transport = Arc::new(StubTransport::default());
        transport
            .push_response(Ok("\"Bug ID\",\"Summary\"\n1,\"x\"\n".to_owned()))
            .await;
        let source = BugzillaSource::with_transport(config(), transport);
        let workdir = WorkDir::temporary().expect("workdir");

        let error = source.fetch(&workdir).await.expect_err("parse should fail");

        assert!(matches!(error, CoreError::Parse(_)));
    }

    #[tokio::test]
    async fn saved_source_reparses_a_previous_download() {
        let workdir = WorkDir::temporary().expect("workdir");
        workdir
            .write_scratch(RAW_CSV_SCRATCH_FILE, EXPORT.as_bytes())
            .expect("seed scratch");

        let corpus = SavedBugzillaSource.fetch(&workdir).await.expect("reparse");

        assert_eq!(corpus.len(), 2);
        assert_eq!(
            corpus.records()[0].extra.get("Changed").map(String::as_str),
            Some("2023-12-01 10:00:00")
        );
    }

    #[tokio::test]
    async fn saved_source_requires_a_previous_download() {
        let workdir = WorkDir::temporary().expect("workdir");

        let error = SavedBugzillaSource.fetch(&workdir).await.expect_err("nothing saved");

        assert!(matches!(error, CoreError::FileAccess(_)));
    }
}
