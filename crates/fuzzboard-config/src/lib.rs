use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use fuzzboard_core::{DEFAULT_INTERNAL_ERROR_PHRASES, DEFAULT_MISCOMPILE_PHRASES};

mod overrides;

pub use overrides::{
    load_override_lists, parse_override_lists, BugzillaOverridesToml, ClassificationOverridesToml,
    OVERRIDES_FORMAT_VERSION,
};

pub const ENV_FUZZBOARD_CONFIG: &str = "FUZZBOARD_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "fuzzboard.toml";

const DEFAULT_OUTPUT_DIR: &str = "dashboard";
const DEFAULT_PUBLISHED_DOCUMENT: &str = "README.md";
const DEFAULT_OVERRIDE_LISTS: &str = "dashboard/classification-overrides.toml";
const DEFAULT_BUGZILLA_BASE_URL: &str = "https://gcc.gnu.org/bugzilla";
const DEFAULT_BUGZILLA_BASELINE_CSV: &str = "dashboard/fuzzer-find-reports.csv";
const DEFAULT_BUGZILLA_MERGED_CSV: &str = "dashboard/merged-bugzilla-reports.csv";
const DEFAULT_BUGZILLA_LINK_BASE: &str = "https://gcc.gnu.org/bugzilla/show_bug.cgi?id=";
const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_GITHUB_REPOSITORY: &str = "llvm/llvm-project";
const DEFAULT_GITHUB_STACK_TRACE_MARKER: &str = "Stack dump";
const DEFAULT_GITHUB_PAGE_SIZE: u32 = 100;
const MAX_GITHUB_PAGE_SIZE: u32 = 100;
const DEFAULT_GITHUB_REQUEST_TIMEOUT_SECS: u64 = 15 * 60;
const DEFAULT_GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
const DEFAULT_GITHUB_LINK_BASE: &str = "https://github.com/llvm/llvm-project/issues/";
const DEFAULT_PROVENANCE_PHRASE: &str = "found via fuzzer";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}

impl ConfigError {
    fn configuration(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FuzzboardConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_published_document")]
    pub published_document: String,
    #[serde(default = "default_override_lists")]
    pub override_lists: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<String>,
    #[serde(default)]
    pub bugzilla: BugzillaConfigToml,
    #[serde(default)]
    pub github: GithubConfigToml,
    #[serde(default)]
    pub classifier: ClassifierConfigToml,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BugzillaConfigToml {
    #[serde(default = "default_bugzilla_base_url")]
    pub base_url: String,
    #[serde(default = "default_provenance_phrase")]
    pub provenance_phrase: String,
    /// Replaces the query built from `base_url` and `provenance_phrase`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_url: Option<String>,
    #[serde(default = "default_bugzilla_baseline_csv")]
    pub baseline_csv: String,
    #[serde(default = "default_bugzilla_merged_csv")]
    pub merged_csv: String,
    #[serde(default = "default_bugzilla_link_base")]
    pub link_base: String,
}

impl Default for BugzillaConfigToml {
    fn default() -> Self {
        Self {
            base_url: default_bugzilla_base_url(),
            provenance_phrase: default_provenance_phrase(),
            search_url: None,
            baseline_csv: default_bugzilla_baseline_csv(),
            merged_csv: default_bugzilla_merged_csv(),
            link_base: default_bugzilla_link_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GithubConfigToml {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    #[serde(default = "default_github_repository")]
    pub repository: String,
    #[serde(default = "default_provenance_phrase")]
    pub provenance_phrase: String,
    #[serde(default = "default_github_stack_trace_marker")]
    pub stack_trace_marker: String,
    #[serde(default = "default_github_page_size")]
    pub page_size: u32,
    #[serde(default = "default_github_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_csv: Option<String>,
    #[serde(default = "default_github_link_base")]
    pub link_base: String,
}

impl Default for GithubConfigToml {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            repository: default_github_repository(),
            provenance_phrase: default_provenance_phrase(),
            stack_trace_marker: default_github_stack_trace_marker(),
            page_size: default_github_page_size(),
            request_timeout_secs: default_github_request_timeout_secs(),
            token_env: default_github_token_env(),
            baseline_csv: None,
            link_base: default_github_link_base(),
        }
    }
}

impl GithubConfigToml {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reads the bearer token from the environment variable named by `token_env`.
    pub fn token(&self) -> Result<String, ConfigError> {
        match std::env::var(&self.token_env) {
            Ok(raw) if !raw.trim().is_empty() => Ok(raw.trim().to_owned()),
            Ok(_) | Err(std::env::VarError::NotPresent) => Err(ConfigError::configuration(
                format!(
                    "GitHub token is not set; export {} to run the GitHub pipeline",
                    self.token_env
                ),
            )),
            Err(_) => Err(ConfigError::configuration(format!(
                "{} contained invalid UTF-8",
                self.token_env
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifierConfigToml {
    #[serde(default = "default_miscompile_phrases")]
    pub miscompile_phrases: Vec<String>,
    #[serde(default = "default_internal_error_phrases")]
    pub internal_error_phrases: Vec<String>,
}

impl Default for ClassifierConfigToml {
    fn default() -> Self {
        Self {
            miscompile_phrases: default_miscompile_phrases(),
            internal_error_phrases: default_internal_error_phrases(),
        }
    }
}

impl Default for FuzzboardConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            published_document: default_published_document(),
            override_lists: default_override_lists(),
            scratch_dir: None,
            bugzilla: BugzillaConfigToml::default(),
            github: GithubConfigToml::default(),
            classifier: ClassifierConfigToml::default(),
        }
    }
}

pub fn load_from_env() -> Result<FuzzboardConfig, ConfigError> {
    let path = config_path_from_env()?;
    load_from_path(path)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<FuzzboardConfig, ConfigError> {
    load_or_create_config(path.as_ref())
}

/// Picks the explicit path when given, else `FUZZBOARD_CONFIG`, else
/// `./fuzzboard.toml`.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(path) if !path.as_os_str().is_empty() => Ok(path),
        _ => config_path_from_env(),
    }
}

fn config_path_from_env() -> Result<PathBuf, ConfigError> {
    match std::env::var(ENV_FUZZBOARD_CONFIG) {
        Ok(raw) => {
            if raw.trim().is_empty() {
                Ok(PathBuf::from(DEFAULT_CONFIG_FILE))
            } else {
                Ok(raw.trim().into())
            }
        }
        Err(std::env::VarError::NotPresent) => Ok(PathBuf::from(DEFAULT_CONFIG_FILE)),
        Err(_) => Err(ConfigError::configuration(
            "FUZZBOARD_CONFIG contained invalid UTF-8",
        )),
    }
}

fn default_output_dir() -> String {
    DEFAULT_OUTPUT_DIR.to_owned()
}

fn default_published_document() -> String {
    DEFAULT_PUBLISHED_DOCUMENT.to_owned()
}

fn default_override_lists() -> String {
    DEFAULT_OVERRIDE_LISTS.to_owned()
}

fn default_bugzilla_base_url() -> String {
    DEFAULT_BUGZILLA_BASE_URL.to_owned()
}

fn default_bugzilla_baseline_csv() -> String {
    DEFAULT_BUGZILLA_BASELINE_CSV.to_owned()
}

fn default_bugzilla_merged_csv() -> String {
    DEFAULT_BUGZILLA_MERGED_CSV.to_owned()
}

fn default_bugzilla_link_base() -> String {
    DEFAULT_BUGZILLA_LINK_BASE.to_owned()
}

fn default_github_api_url() -> String {
    DEFAULT_GITHUB_API_URL.to_owned()
}

fn default_github_repository() -> String {
    DEFAULT_GITHUB_REPOSITORY.to_owned()
}

fn default_github_stack_trace_marker() -> String {
    DEFAULT_GITHUB_STACK_TRACE_MARKER.to_owned()
}

fn default_github_page_size() -> u32 {
    DEFAULT_GITHUB_PAGE_SIZE
}

fn default_github_request_timeout_secs() -> u64 {
    DEFAULT_GITHUB_REQUEST_TIMEOUT_SECS
}

fn default_github_token_env() -> String {
    DEFAULT_GITHUB_TOKEN_ENV.to_owned()
}

fn default_github_link_base() -> String {
    DEFAULT_GITHUB_LINK_BASE.to_owned()
}

fn default_provenance_phrase() -> String {
    DEFAULT_PROVENANCE_PHRASE.to_owned()
}

fn default_miscompile_phrases() -> Vec<String> {
    DEFAULT_MISCOMPILE_PHRASES
        .iter()
        .map(|phrase| (*phrase).to_owned())
        .collect()
}

fn default_internal_error_phrases() -> Vec<String> {
    DEFAULT_INTERNAL_ERROR_PHRASES
        .iter()
        .map(|phrase| (*phrase).to_owned())
        .collect()
}

fn persist_config(path: &Path, config: &FuzzboardConfig) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to serialize FUZZBOARD_CONFIG for {}: {err}",
            path.display()
        ))
    })?;

    std::fs::write(path, rendered.as_bytes()).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to write FUZZBOARD_CONFIG to {}: {err}",
            path.display()
        ))
    })
}

fn load_or_create_config(path: &Path) -> Result<FuzzboardConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|err| {
                        ConfigError::configuration(format!(
                            "Failed to create parent directory {} for FUZZBOARD_CONFIG: {err}",
                            parent.display()
                        ))
                    })?;
                }
            }

            let default_config = FuzzboardConfig::default();
            persist_config(path, &default_config)?;
            return Ok(default_config);
        }
        Err(err) => {
            return Err(ConfigError::configuration(format!(
                "Failed to read FUZZBOARD_CONFIG from {}: {err}",
                path.display()
            )));
        }
    };

    let mut config: FuzzboardConfig = toml::from_str(&raw).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to parse FUZZBOARD_CONFIG from {}: {err}",
            path.display()
        ))
    })?;

    let changed = normalize_config(&mut config)?;
    if changed {
        persist_config(path, &config)?;
    }

    Ok(config)
}

fn normalize_config(config: &mut FuzzboardConfig) -> Result<bool, ConfigError> {
    let mut changed = false;

    changed |= normalize_non_empty_string(&mut config.output_dir, default_output_dir());
    changed |= normalize_non_empty_string(
        &mut config.published_document,
        default_published_document(),
    );
    changed |= normalize_non_empty_string(&mut config.override_lists, default_override_lists());
    changed |= normalize_optional_string(&mut config.scratch_dir);

    let bugzilla = &mut config.bugzilla;
    changed |= normalize_non_empty_string(&mut bugzilla.base_url, default_bugzilla_base_url());
    changed |= normalize_non_empty_string(
        &mut bugzilla.provenance_phrase,
        default_provenance_phrase(),
    );
    changed |= normalize_optional_string(&mut bugzilla.search_url);
    changed |= normalize_non_empty_string(
        &mut bugzilla.baseline_csv,
        default_bugzilla_baseline_csv(),
    );
    changed |= normalize_non_empty_string(&mut bugzilla.merged_csv, default_bugzilla_merged_csv());
    changed |= normalize_non_empty_string(&mut bugzilla.link_base, default_bugzilla_link_base());
    if bugzilla.merged_csv == bugzilla.baseline_csv {
        return Err(ConfigError::configuration(format!(
            "bugzilla.merged_csv must differ from bugzilla.baseline_csv ('{}'); the baseline is never overwritten",
            bugzilla.baseline_csv
        )));
    }

    let github = &mut config.github;
    changed |= normalize_non_empty_string(&mut github.api_url, default_github_api_url());
    changed |= normalize_non_empty_string(&mut github.repository, default_github_repository());
    changed |= normalize_non_empty_string(
        &mut github.provenance_phrase,
        default_provenance_phrase(),
    );
    changed |= normalize_non_empty_string(
        &mut github.stack_trace_marker,
        default_github_stack_trace_marker(),
    );
    changed |= normalize_non_empty_string(&mut github.token_env, default_github_token_env());
    changed |= normalize_optional_string(&mut github.baseline_csv);
    changed |= normalize_non_empty_string(&mut github.link_base, default_github_link_base());
    if github.page_size == 0 || github.page_size > MAX_GITHUB_PAGE_SIZE {
        return Err(ConfigError::configuration(format!(
            "github.page_size must be between 1 and {MAX_GITHUB_PAGE_SIZE}, got {}",
            github.page_size
        )));
    }
    if github.request_timeout_secs == 0 {
        github.request_timeout_secs = default_github_request_timeout_secs();
        changed = true;
    }

    let classifier = &mut config.classifier;
    changed |= normalize_phrase_list(
        &mut classifier.miscompile_phrases,
        default_miscompile_phrases(),
    );
    changed |= normalize_phrase_list(
        &mut classifier.internal_error_phrases,
        default_internal_error_phrases(),
    );

    Ok(changed)
}

fn normalize_non_empty_string(value: &mut String, default: String) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        *value = default;
        return true;
    }
    if trimmed.len() != value.len() {
        *value = trimmed.to_owned();
        return true;
    }
    false
}

fn normalize_optional_string(value: &mut Option<String>) -> bool {
    let Some(raw) = value.as_ref() else {
        return false;
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        *value = None;
        return true;
    }
    if trimmed.len() != raw.len() {
        *value = Some(trimmed.to_owned());
        return true;
    }
    false
}

fn normalize_phrase_list(values: &mut Vec<String>, default: Vec<String>) -> bool {
    let normalized = values
        .iter()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>();
    let normalized = if normalized.is_empty() {
        default
    } else {
        normalized
    };
    if normalized == *values {
        return false;
    }
    *values = normalized;
    true
}
