use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::s3::{BucketSummary, ObjectSummary, PermissionReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ListBuckets,
    ListFiles,
    DownloadFiles,
    DeleteFiles,
    CheckPermissions,
    DeleteBucket,
    CreateBucket,
}

impl OperationKind {
    pub fn label(self) -> &'static str {
        match self {
            OperationKind::ListBuckets => "list_buckets",
            OperationKind::ListFiles => "list_files",
            OperationKind::DownloadFiles => "download_files",
            OperationKind::DeleteFiles => "delete_files",
            OperationKind::CheckPermissions => "check_permissions",
            OperationKind::DeleteBucket => "delete_bucket",
            OperationKind::CreateBucket => "create_bucket",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventPayload {
    Progress {
        percent: u8,
        message: String,
    },
    Log {
        level: LogLevel,
        message: String,
    },
    BucketsListed {
        buckets: Vec<BucketSummary>,
    },
    ObjectsListed {
        bucket: String,
        objects: Vec<ObjectSummary>,
    },
    PermissionsChecked {
        report: PermissionReport,
    },
    Completed {
        success: bool,
        message: String,
        error: Option<ErrorKind>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerEvent {
    pub operation_id: Uuid,
    pub kind: OperationKind,
    pub payload: EventPayload,
}

impl WorkerEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self.payload, EventPayload::Completed { .. })
    }

    pub fn succeeded(&self) -> Option<bool> {
        match self.payload {
            EventPayload::Completed { success, .. } => Some(success),
            _ => None,
        }
    }
}
