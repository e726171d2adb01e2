use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fuzzboard_core::{BugRecord, BugSource, Corpus, CoreError, TrackerSource, WorkDir};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info};

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_GITHUB_REPOSITORY: &str = "llvm/llvm-project";
pub const DEFAULT_PROVENANCE_PHRASE: &str = "found via fuzzer";
pub const DEFAULT_STACK_TRACE_MARKER: &str = "Stack dump";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15 * 60);
const MAX_PAGE_SIZE: u32 = 100;
const GITHUB_API_VERSION: &str = "2022-11-28";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubSearchConfig {
    pub api_url: String,
    pub repository: String,
    pub provenance_phrase: String,
    pub stack_trace_marker: String,
    pub page_size: u32,
    pub request_timeout: Duration,
}

impl Default for GithubSearchConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_GITHUB_API_URL.to_owned(),
            repository: DEFAULT_GITHUB_REPOSITORY.to_owned(),
            provenance_phrase: DEFAULT_PROVENANCE_PHRASE.to_owned(),
            stack_trace_marker: DEFAULT_STACK_TRACE_MARKER.to_owned(),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl GithubSearchConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        let required = [
            ("api_url", self.api_url.as_str()),
            ("repository", self.repository.as_str()),
            ("provenance_phrase", self.provenance_phrase.as_str()),
            ("stack_trace_marker", self.stack_trace_marker.as_str()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(CoreError::Configuration(format!(
                "GitHub search setting '{field}' cannot be empty."
            )));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(CoreError::Configuration(format!(
                "GitHub search page size must be between 1 and {MAX_PAGE_SIZE}, got {}.",
                self.page_size
            )));
        }
        Ok(())
    }

    pub fn search_url(&self, page: u32) -> Result<String, CoreError> {
        let endpoint = format!("{}/search/issues", self.api_url.trim_end_matches('/'));
        let query = format!(
            "repo:{} \"{}\" in:body",
            self.repository, self.provenance_phrase
        );
        let per_page = self.page_size.to_string();
        let page = page.to_string();

        Url::parse_with_params(
            &endpoint,
            [
                ("q", query.as_str()),
                ("per_page", per_page.as_str()),
                ("page", page.as_str()),
            ],
        )
        .map(String::from)
        .map_err(|error| {
            CoreError::Configuration(format!(
                "GitHub API URL '{}' is not a valid URL: {error}",
                self.api_url
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchPage {
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchItem {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub state_reason: Option<String>,
    #[serde(default)]
    pub labels: Vec<SearchLabel>,
    pub created_at: String,
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchLabel {
    pub name: String,
}

impl SearchItem {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    fn has_label(&self, name: &str) -> bool {
        self.labels
            .iter()
            .any(|label| label.name.trim().eq_ignore_ascii_case(name))
    }

    fn resolution(&self) -> String {
        let reason = self.state_reason.as_deref().map(str::trim).unwrap_or_default();
        if reason.eq_ignore_ascii_case("duplicate") || self.has_label("duplicate") {
            "DUPLICATE".to_owned()
        } else if self.has_label("invalid") {
            "INVALID".to_owned()
        } else {
            reason.to_owned()
        }
    }
}

#[async_trait]
pub trait GithubSearchTransport: Send + Sync {
    async fn search_page(&self, url: &str) -> Result<SearchPage, CoreError>;
}

#[derive(Clone)]
pub struct ReqwestGithubSearchTransport {
    token: String,
    client: reqwest::Client,
}

impl fmt::Debug for ReqwestGithubSearchTransport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ReqwestGithubSearchTransport")
            .field("token", &"<redacted>")
            .field("client", &self.client)
            .finish()
    }
}

impl ReqwestGithubSearchTransport {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self, CoreError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(CoreError::Configuration(
                "GitHub token cannot be empty.".to_owned(),
            ));
        }
        let client = reqwest::Client::builder()
            .user_agent("fuzzboard/integration-github")
            .timeout(timeout)
            .build()
            .map_err(|error| {
                CoreError::Configuration(format!("failed to build GitHub HTTP client: {error}"))
            })?;
        Ok(Self {
            token: token.trim().to_owned(),
            client,
        })
    }
}

#[async_trait]
impl GithubSearchTransport for ReqwestGithubSearchTransport {
    async fn search_page(&self, url: &str) -> Result<SearchPage, CoreError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .send()
            .await
            .map_err(|error| CoreError::Fetch(format!("GitHub search request failed: {error}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            CoreError::Fetch(format!("GitHub search response read failed: {error}"))
        })?;

        if status != StatusCode::OK {
            return Err(CoreError::Fetch(format!(
                "GitHub search returned HTTP {status}: {}",
                truncate_for_error(&body)
            )));
        }

        serde_json::from_str(&body).map_err(|error| {
            CoreError::Parse(format!("failed to parse GitHub search response JSON: {error}"))
        })
    }
}

/// Pages through the issue search and keeps the issues whose body really
/// carries the provenance phrase.
#[derive(Clone)]
pub struct GithubIssueSource {
    config: GithubSearchConfig,
    transport: Arc<dyn GithubSearchTransport>,
}

impl fmt::Debug for GithubIssueSource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GithubIssueSource")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GithubIssueSource {
    pub fn new(config: GithubSearchConfig, token: impl Into<String>) -> Result<Self, CoreError> {
        let transport = ReqwestGithubSearchTransport::new(token, config.request_timeout)?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(
        config: GithubSearchConfig,
        transport: Arc<dyn GithubSearchTransport>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self { config, transport })
    }

    pub fn config(&self) -> &GithubSearchConfig {
        &self.config
    }

    async fn collect_items(&self) -> Result<Vec<SearchItem>, CoreError> {
        let mut items = Vec::new();
        let mut expected: u64;
        let mut page = 1;

        loop {
            let url = self.config.search_url(page)?;
            let response = self.transport.search_page(&url).await?;
            expected = response.total_count;
            debug!(
                page,
                items = response.items.len(),
                total_count = response.total_count,
                "fetched GitHub search page"
            );

            if response.items.is_empty() {
                break;
            }
            items.extend(response.items);
            if items.len() as u64 >= expected {
                break;
            }
            page += 1;
        }

        let accumulated = items.len() as u64;
        if accumulated != expected {
            return Err(CoreError::Consistency {
                expected,
                accumulated,
            });
        }
        Ok(items)
    }

    fn to_record(&self, item: SearchItem) -> Option<BugRecord> {
        if item.is_pull_request() {
            return None;
        }
        let body = item.body.as_deref().unwrap_or_default().to_lowercase();
        if !body.contains(&self.config.provenance_phrase.trim().to_lowercase()) {
            return None;
        }
        let stack_trace = body.contains(&self.config.stack_trace_marker.trim().to_lowercase());
        let resolution = item.resolution();

        Some(
            BugRecord::new(
                item.number,
                TrackerSource::Github,
                item.title.trim(),
                resolution,
                item.created_at.trim(),
            )
            .with_status(item.state.trim())
            .with_stack_trace(stack_trace),
        )
    }
}

#[async_trait]
impl BugSource for GithubIssueSource {
    fn tracker(&self) -> TrackerSource {
        TrackerSource::Github
    }

    async fn fetch(&self, _workdir: &WorkDir) -> Result<Corpus, CoreError> {
        let items = self.collect_items().await?;
        let searched = items.len();
        let corpus: Corpus = items
            .into_iter()
            .filter_map(|item| self.to_record(item))
            .collect();
        info!(
            searched,
            records = corpus.len(),
            repository = %self.config.repository,
            "fetched GitHub issues"
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
