use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config_paths::ensure_parent_dir;
use crate::error::{ManagerError, Result};

pub const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_WAIT_ATTEMPTS: u32 = 20;
const DEFAULT_WAIT_DELAY_SECS: u64 = 5;

pub const KNOWN_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "af-south-1",
    "ap-east-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ca-central-1",
    "eu-central-1",
    "eu-north-1",
    "eu-south-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "me-south-1",
    "sa-east-1",
];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub default_region: String,
    pub endpoint: Option<String>,
    pub use_keychain: bool,
    pub bucket_wait_attempts: u32,
    pub bucket_wait_delay_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_region: DEFAULT_REGION.to_string(),
            endpoint: None,
            use_keychain: true,
            bucket_wait_attempts: DEFAULT_WAIT_ATTEMPTS,
            bucket_wait_delay_secs: DEFAULT_WAIT_DELAY_SECS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl WaitPolicy {
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            delay: Duration::ZERO,
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_WAIT_ATTEMPTS,
            delay: Duration::from_secs(DEFAULT_WAIT_DELAY_SECS),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn env_var_non_empty(key: &str) -> Option<String> {
    non_empty(std::env::var(key).ok())
}

pub fn validate_endpoint(endpoint: &str) -> Result<String> {
    let url = Url::parse(endpoint.trim())
        .map_err(|err| ManagerError::InvalidInput(format!("Invalid endpoint '{endpoint}': {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url.as_str().trim_end_matches('/').to_string()),
        other => Err(ManagerError::InvalidInput(format!(
            "Endpoint scheme must be http or https, got '{other}'"
        ))),
    }
}

impl AppSettings {
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|err| ManagerError::local_io(path, err))?;
        serde_json::from_str(&raw).map_err(|err| {
            ManagerError::InvalidInput(format!("Invalid settings file {}: {err}", path.display()))
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        ensure_parent_dir(path)?;
        let body = serde_json::to_string_pretty(self)
            .map_err(|err| ManagerError::Unexpected(format!("Failed to encode settings: {err}")))?;
        fs::write(path, body).map_err(|err| ManagerError::local_io(path, err))
    }

    /// Layers `AWS_DEFAULT_REGION`, `S3MANAGER_ENDPOINT` and `TEST_MODE` over
    /// the persisted values.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(region) = non_empty(lookup("AWS_DEFAULT_REGION")) {
            self.default_region = region;
        }
        if let Some(endpoint) = non_empty(lookup("S3MANAGER_ENDPOINT")) {
            self.endpoint = Some(validate_endpoint(&endpoint)?);
        }
        if lookup("TEST_MODE").as_deref() == Some("1") {
            self.use_keychain = false;
        }
        Ok(())
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            attempts: self.bucket_wait_attempts.max(1),
            delay: Duration::from_secs(self.bucket_wait_delay_secs),
        }
    }
}
