use std::path::Path;

use fuzzboard_core::{CoreError, OverrideLists};
use serde::{Deserialize, Serialize};

pub const OVERRIDES_FORMAT_VERSION: u32 = 1;

const SHIPPED_MISCOMPILE_OVERRIDES: &[u64] = &[112801, 112855, 112932, 116033, 116035];
const SHIPPED_INTERNAL_ERROR_OVERRIDES: &[u64] = &[115143, 116280];

/// On-disk form of the hand-maintained classification overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationOverridesToml {
    pub version: u32,
    #[serde(default)]
    pub bugzilla: BugzillaOverridesToml,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BugzillaOverridesToml {
    #[serde(default)]
    pub miscompile: Vec<u64>,
    #[serde(default)]
    pub internal_error: Vec<u64>,
}

impl Default for ClassificationOverridesToml {
    fn default() -> Self {
        Self {
            version: OVERRIDES_FORMAT_VERSION,
            bugzilla: BugzillaOverridesToml {
                miscompile: SHIPPED_MISCOMPILE_OVERRIDES.to_vec(),
                internal_error: SHIPPED_INTERNAL_ERROR_OVERRIDES.to_vec(),
            },
        }
    }
}

impl ClassificationOverridesToml {
    pub fn into_override_lists(self) -> Result<OverrideLists, CoreError> {
        if self.version != OVERRIDES_FORMAT_VERSION {
            return Err(CoreError::Configuration(format!(
                "unsupported classification override version {} (expected {OVERRIDES_FORMAT_VERSION})",
                self.version
            )));
        }
        Ok(OverrideLists::new(
            self.bugzilla.miscompile,
            self.bugzilla.internal_error,
        ))
    }
}

pub fn parse_override_lists(raw: &str) -> Result<OverrideLists, CoreError> {
    let parsed: ClassificationOverridesToml = toml::from_str(raw).map_err(|error| {
        CoreError::Parse(format!("failed to parse classification overrides: {error}"))
    })?;
    parsed.into_override_lists()
}

pub fn load_override_lists(path: &Path) -> Result<OverrideLists, CoreError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|error| CoreError::file_access(path, "read classification overrides", error))?;
    parse_override_lists(&raw).map_err(|error| match error {
        CoreError::Parse(message) => CoreError::Parse(format!("{}: {message}", path.display())),
        other => other,
    })
}
