use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::error::{ManagerError, Result};
use crate::s3::ops::{self, Reporter};
use crate::s3::{ClientConfig, ClientFactory, CreateOutcome, S3Backend};
use crate::settings::WaitPolicy;

use super::events::{EventPayload, LogLevel, OperationKind};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    ListBuckets,
    ListObjects {
        bucket: String,
    },
    DownloadObjects {
        bucket: String,
        keys: Vec<String>,
        destination: PathBuf,
    },
    DeleteObjects {
        bucket: String,
        keys: Vec<String>,
    },
    CheckPermissions {
        bucket: String,
    },
    DeleteBucket {
        bucket: String,
    },
    CreateBucket {
        bucket: String,
        region: String,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::ListBuckets => OperationKind::ListBuckets,
            Operation::ListObjects { .. } => OperationKind::ListFiles,
            Operation::DownloadObjects { .. } => OperationKind::DownloadFiles,
            Operation::DeleteObjects { .. } => OperationKind::DeleteFiles,
            Operation::CheckPermissions { .. } => OperationKind::CheckPermissions,
            Operation::DeleteBucket { .. } => OperationKind::DeleteBucket,
            Operation::CreateBucket { .. } => OperationKind::CreateBucket,
        }
    }

    pub fn bucket(&self) -> Option<&str> {
        match self {
            Operation::ListBuckets => None,
            Operation::ListObjects { bucket }
            | Operation::DownloadObjects { bucket, .. }
            | Operation::DeleteObjects { bucket, .. }
            | Operation::CheckPermissions { bucket }
            | Operation::DeleteBucket { bucket }
            | Operation::CreateBucket { bucket, .. } => Some(bucket.as_str()),
        }
    }

    /// Rejects requests that cannot start, before the worker is claimed.
    pub fn validate(&self) -> Result<()> {
        if let Some(bucket) = self.bucket() {
            if bucket.trim().is_empty() {
                return Err(ManagerError::InvalidInput("No bucket selected".to_string()));
            }
        }
        match self {
            Operation::DownloadObjects { keys, .. } | Operation::DeleteObjects { keys, .. }
                if keys.is_empty() =>
            {
                Err(ManagerError::InvalidInput("No files selected".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// What a successful operation hands back to the worker: an optional result
/// event and the terminal message.
#[derive(Debug)]
pub(crate) struct Outcome {
    pub payload: Option<EventPayload>,
    pub message: String,
}

impl Outcome {
    fn message(message: String) -> Self {
        Self {
            payload: None,
            message,
        }
    }
}

async fn connect_for_bucket(
    factory: &dyn ClientFactory,
    config: &ClientConfig,
    bucket: &str,
    reporter: &mut dyn Reporter,
) -> Result<Arc<dyn S3Backend>> {
    let backend = factory.connect(config)?;
    if config.endpoint.is_some() {
        return Ok(backend);
    }

    match backend.bucket_location(bucket).await {
        Ok(region) if region == config.region => Ok(backend),
        Ok(region) => {
            debug!("Bucket {bucket} lives in {region}");
            factory.connect(&config.with_region(region))
        }
        Err(err) => {
            reporter.log(
                LogLevel::Warning,
                format!(
                    "Could not determine the region of '{bucket}', using '{}': {err}",
                    config.region
                ),
            );
            Ok(backend)
        }
    }
}

pub(crate) async fn execute(
    operation: Operation,
    factory: &dyn ClientFactory,
    config: &ClientConfig,
    wait: WaitPolicy,
    reporter: &mut dyn Reporter,
) -> Result<Outcome> {
    match operation {
        Operation::ListBuckets => {
            let backend = factory.connect(config)?;
            let buckets = ops::list_buckets(backend.as_ref()).await?;
            let message = format!("Found {} bucket(s)", buckets.len());
            Ok(Outcome {
                payload: Some(EventPayload::BucketsListed { buckets }),
                message,
            })
        }
        Operation::ListObjects { bucket } => {
            let backend = connect_for_bucket(factory, config, &bucket, reporter).await?;
            let objects = ops::list_objects(backend.as_ref(), &bucket).await?;
            let message = format!("Found {} object(s) in '{bucket}'", objects.len());
            Ok(Outcome {
                payload: Some(EventPayload::ObjectsListed { bucket, objects }),
                message,
            })
        }
        Operation::DownloadObjects {
            bucket,
            keys,
            destination,
        } => {
            let backend = connect_for_bucket(factory, config, &bucket, reporter).await?;
            let count =
                ops::download_objects(backend.as_ref(), &bucket, &keys, &destination, reporter)
                    .await?;
            Ok(Outcome::message(format!(
                "Downloaded {count} file(s) to {}",
                destination.display()
            )))
        }
        Operation::DeleteObjects { bucket, keys } => {
            let backend = connect_for_bucket(factory, config, &bucket, reporter).await?;
            let count = ops::delete_objects(backend.as_ref(), &bucket, &keys, reporter).await?;
            Ok(Outcome::message(format!(
                "Deleted {count} file(s) from '{bucket}'"
            )))
        }
        Operation::CheckPermissions { bucket } => {
            let backend = connect_for_bucket(factory, config, &bucket, reporter).await?;
            let report = ops::check_permissions(backend.as_ref(), &bucket).await;
            let message = report.to_string();
            Ok(Outcome {
                payload: Some(EventPayload::PermissionsChecked { report }),
                message,
            })
        }
        Operation::DeleteBucket { bucket } => {
            let backend = connect_for_bucket(factory, config, &bucket, reporter).await?;
            let stats = ops::delete_bucket(backend.as_ref(), &bucket, reporter).await?;
            Ok(Outcome::message(format!(
                "Bucket '{bucket}' deleted ({} {} removed)",
                stats.removed,
                if stats.versioned { "versions" } else { "objects" }
            )))
        }
        Operation::CreateBucket { bucket, region } => {
            let backend = if config.endpoint.is_some() {
                factory.connect(config)?
            } else {
                factory.connect(&config.with_region(ops::resolve_region(&region)))?
            };
            let outcome =
                ops::create_bucket(backend.as_ref(), &bucket, &region, wait, reporter).await?;
            let message = match outcome {
                CreateOutcome::Created { region } => {
                    format!("Bucket '{bucket}' created in '{region}'")
                }
                CreateOutcome::AlreadyOwned { .. } => {
                    format!("Bucket '{bucket}' already exists and is owned by you")
                }
            };
            Ok(Outcome::message(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selections_are_rejected_up_front() {
        let download = Operation::DownloadObjects {
            bucket: "media".into(),
            keys: Vec::new(),
            destination: PathBuf::from("/tmp"),
        };
        assert!(matches!(download.validate(), Err(ManagerError::InvalidInput(_))));

        let list = Operation::ListObjects { bucket: " ".into() };
        assert!(matches!(list.validate(), Err(ManagerError::InvalidInput(_))));

        assert!(Operation::ListBuckets.validate().is_ok());
        assert!(Operation::DeleteObjects {
            bucket: "media".into(),
            keys: vec!["a".into()],
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(Operation::ListBuckets.kind().label(), "list_buckets");
        assert_eq!(
            Operation::CreateBucket {
                bucket: "b".into(),
                region: "eu-west-1".into(),
            }
            .kind(),
            OperationKind::CreateBucket
        );
        assert_eq!(
            Operation::DeleteBucket { bucket: "b".into() }.bucket(),
            Some("b")
        );
    }
}
