pub mod aws;
pub mod backend;
pub mod ops;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use backend::{ClientConfig, ClientFactory, S3Backend};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSummary {
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectSummary {
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub objects: Vec<ObjectSummary>,
    pub next_token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectVersionRef {
    pub key: String,
    pub version_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionPage {
    pub entries: Vec<ObjectVersionRef>,
    pub next_key_marker: Option<String>,
    pub next_version_marker: Option<String>,
}

impl VersionPage {
    pub fn is_truncated(&self) -> bool {
        self.next_key_marker.is_some() || self.next_version_marker.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersioningStatus {
    Enabled,
    Suspended,
    Disabled,
}

impl VersioningStatus {
    /// Suspended buckets keep the versions written while versioning was on.
    pub fn keeps_versions(self) -> bool {
        matches!(self, VersioningStatus::Enabled | VersioningStatus::Suspended)
    }
}

impl fmt::Display for VersioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VersioningStatus::Enabled => "Enabled",
            VersioningStatus::Suspended => "Suspended",
            VersioningStatus::Disabled => "Disabled",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub granted: bool,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn from_result<T>(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(_) => Self {
                granted: true,
                error: None,
            },
            Err(err) => Self {
                granted: false,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionReport {
    pub bucket: String,
    pub region: Option<String>,
    pub list: ProbeResult,
    pub read: ProbeResult,
    pub write: ProbeResult,
    pub delete: ProbeResult,
    pub versioning: Option<VersioningStatus>,
    pub encryption_enabled: bool,
    pub cors_rules: Option<usize>,
}

fn probe_line(f: &mut fmt::Formatter<'_>, label: &str, probe: &ProbeResult) -> fmt::Result {
    match (&probe.error, probe.granted) {
        (_, true) => writeln!(f, "  [OK]     {label}"),
        (Some(err), false) => writeln!(f, "  [FAILED] {label}: {err}"),
        (None, false) => writeln!(f, "  [FAILED] {label}"),
    }
}

impl fmt::Display for PermissionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Permission check for '{}'", self.bucket)?;
        writeln!(f, "Region: {}", self.region.as_deref().unwrap_or("unknown"))?;
        writeln!(f, "Permissions:")?;
        probe_line(f, "Read", &self.read)?;
        probe_line(f, "Write", &self.write)?;
        probe_line(f, "Delete", &self.delete)?;
        probe_line(f, "List", &self.list)?;
        match self.versioning {
            Some(status) => writeln!(f, "Versioning: {status}")?,
            None => writeln!(f, "Versioning: not available")?,
        }
        if self.encryption_enabled {
            writeln!(f, "Encryption: enabled")?;
        } else {
            writeln!(f, "Encryption: not configured")?;
        }
        match self.cors_rules {
            Some(count) => write!(f, "CORS: {count} rule(s)"),
            None => write!(f, "CORS: not configured"),
        }
    }
}

/// How a create request ended, with the region the bucket was requested in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Created { region: String },
    AlreadyOwned { region: String },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmptyStats {
    pub versioned: bool,
    pub removed: usize,
}

/// Legacy location constraints: an empty value means `us-east-1` and `EU`
/// means `eu-west-1`.
pub fn normalize_location(constraint: Option<&str>) -> String {
    match constraint.map(str::trim) {
        None | Some("") => crate::settings::DEFAULT_REGION.to_string(),
        Some("EU") => "eu-west-1".to_string(),
        Some(region) => region.to_string(),
    }
}
