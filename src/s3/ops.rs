use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ManagerError, Result};
use crate::settings::{WaitPolicy, DEFAULT_REGION};
use crate::worker::events::LogLevel;

use super::backend::S3Backend;
use super::{
    BucketSummary, CreateOutcome, EmptyStats, ObjectSummary, ObjectVersionRef, PermissionReport,
    ProbeResult,
};

const DELETE_BATCH_SIZE: usize = 1000;
const PROBE_KEY_PREFIX: &str = "s3manager-permission-check";
const PROBE_BODY: &[u8] = b"Test file for permission check";

/// Sink for the incremental output of an operation.
pub trait Reporter: Send {
    fn progress(&mut self, percent: u8, message: String);
    fn log(&mut self, level: LogLevel, message: String);
}

#[derive(Debug, Default)]
pub struct SilentReporter;

impl Reporter for SilentReporter {
    fn progress(&mut self, _percent: u8, _message: String) {}
    fn log(&mut self, _level: LogLevel, _message: String) {}
}

pub fn calculate_percentage(done: usize, total: usize) -> u8 {
    if total == 0 {
        100
    } else {
        ((done.min(total) * 100) / total) as u8
    }
}

fn sanitize_relative_path(relative_path: &str) -> Option<PathBuf> {
    let candidate = Path::new(relative_path.trim_start_matches('/'));
    if candidate.as_os_str().is_empty() || candidate.is_absolute() {
        return None;
    }
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_) | Component::RootDir))
    {
        return None;
    }
    Some(candidate.to_path_buf())
}

pub fn local_target(destination: &Path, key: &str) -> Result<PathBuf> {
    sanitize_relative_path(key)
        .map(|relative| destination.join(relative))
        .ok_or_else(|| {
            ManagerError::InvalidInput(format!("Object key '{key}' cannot be mapped to a local path"))
        })
}

pub fn validate_bucket_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| ManagerError::InvalidBucketName {
        bucket: name.to_string(),
        reason: reason.to_string(),
    };

    if name.len() < 3 || name.len() > 63 {
        return Err(invalid("must be 3-63 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(invalid(
            "only lowercase letters, numbers, hyphens and periods are allowed",
        ));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric())
        || !name.ends_with(|c: char| c.is_ascii_alphanumeric())
    {
        return Err(invalid("must start and end with a letter or number"));
    }
    if name.contains("..") {
        return Err(invalid("cannot contain consecutive periods"));
    }
    if name.split('.').count() == 4 && name.split('.').all(|part| part.parse::<u8>().is_ok()) {
        return Err(invalid("cannot be formatted as an IP address"));
    }
    Ok(())
}

pub async fn list_buckets(backend: &dyn S3Backend) -> Result<Vec<BucketSummary>> {
    let buckets = backend.list_buckets().await?;
    debug!("Listed {} buckets", buckets.len());
    Ok(buckets)
}

pub async fn list_objects(backend: &dyn S3Backend, bucket: &str) -> Result<Vec<ObjectSummary>> {
    let mut continuation_token: Option<String> = None;
    let mut all_objects = Vec::new();

    loop {
        let page = backend
            .list_objects_page(bucket, continuation_token.take(), Some(1000))
            .await?;
        all_objects.extend(page.objects);
        match page.next_token {
            Some(token) => continuation_token = Some(token),
            None => break,
        }
    }

    Ok(all_objects)
}

async fn download_one(
    backend: &dyn S3Backend,
    bucket: &str,
    key: &str,
    destination: &Path,
) -> Result<u64> {
    let target = local_target(destination, key)?;
    if key.ends_with('/') {
        std::fs::create_dir_all(&target).map_err(|err| ManagerError::local_io(&target, err))?;
        return Ok(0);
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|err| ManagerError::local_io(parent, err))?;
    }
    backend.download_object(bucket, key, &target).await
}

pub async fn download_objects(
    backend: &dyn S3Backend,
    bucket: &str,
    keys: &[String],
    destination: &Path,
    reporter: &mut dyn Reporter,
) -> Result<usize> {
    let total = keys.len();
    std::fs::create_dir_all(destination).map_err(|err| ManagerError::local_io(destination, err))?;

    for (index, key) in keys.iter().enumerate() {
        reporter.progress(
            calculate_percentage(index, total),
            format!("Downloading: {key}"),
        );

        let bytes = download_one(backend, bucket, key, destination)
            .await
            .map_err(|source| ManagerError::BatchItem {
                position: index + 1,
                total,
                key: key.clone(),
                source: Box::new(source),
            })?;
        debug!("Downloaded {key} ({bytes} bytes)");
    }

    reporter.progress(100, "Download completed".to_string());
    info!("Downloaded {total} objects from {bucket} to {}", destination.display());
    Ok(total)
}

pub async fn delete_objects(
    backend: &dyn S3Backend,
    bucket: &str,
    keys: &[String],
    reporter: &mut dyn Reporter,
) -> Result<usize> {
    let total = keys.len();

    for (index, key) in keys.iter().enumerate() {
        reporter.progress(calculate_percentage(index, total), format!("Deleting: {key}"));
        backend
            .delete_object(bucket, key)
            .await
            .map_err(|source| ManagerError::BatchItem {
                position: index + 1,
                total,
                key: key.clone(),
                source: Box::new(source),
            })?;
    }

    reporter.progress(100, "Deletion completed".to_string());
    info!("Deleted {total} objects from {bucket}");
    Ok(total)
}

pub async fn check_permissions(backend: &dyn S3Backend, bucket: &str) -> PermissionReport {
    let list = ProbeResult::from_result(backend.list_objects_page(bucket, None, Some(1)).await);
    let read = ProbeResult::from_result(backend.get_bucket_acl(bucket).await);

    let probe_key = format!("{PROBE_KEY_PREFIX}-{}.txt", Uuid::new_v4());
    let write =
        ProbeResult::from_result(backend.put_object(bucket, &probe_key, PROBE_BODY.to_vec()).await);
    // Without a written marker this still probes the permission: deleting a
    // missing key succeeds when DeleteObject is allowed.
    let delete = ProbeResult::from_result(backend.delete_object(bucket, &probe_key).await);

    let region = backend.bucket_location(bucket).await.ok();
    let versioning = backend.bucket_versioning(bucket).await.ok();
    let encryption_enabled = backend.get_bucket_encryption(bucket).await.is_ok();
    let cors_rules = backend.cors_rule_count(bucket).await.ok();

    PermissionReport {
        bucket: bucket.to_string(),
        region,
        list,
        read,
        write,
        delete,
        versioning,
        encryption_enabled,
        cors_rules,
    }
}

fn map_create_error(err: ManagerError, bucket: &str, region: &str) -> ManagerError {
    match err.code() {
        Some("BucketAlreadyExists") => ManagerError::BucketNameTaken {
            bucket: bucket.to_string(),
        },
        Some("InvalidBucketName") => ManagerError::InvalidBucketName {
            bucket: bucket.to_string(),
            reason: match &err {
                ManagerError::Client { message, .. } => message.clone(),
                _ => "rejected by the provider".to_string(),
            },
        },
        Some("IllegalLocationConstraintException" | "InvalidLocationConstraint") => {
            ManagerError::InvalidRegion {
                region: region.to_string(),
            }
        }
        _ => err,
    }
}

pub async fn wait_for_bucket(backend: &dyn S3Backend, bucket: &str, wait: WaitPolicy) -> Result<()> {
    let attempts = wait.attempts.max(1);
    for attempt in 1..=attempts {
        if backend.bucket_exists(bucket).await? {
            debug!("Bucket {bucket} visible after {attempt} check(s)");
            return Ok(());
        }
        if attempt < attempts {
            tokio::time::sleep(wait.delay).await;
        }
    }
    Err(ManagerError::Unexpected(format!(
        "Bucket '{bucket}' was not visible after {attempts} checks"
    )))
}

/// A blank region means the default one.
pub fn resolve_region(region: &str) -> &str {
    Some(region.trim())
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_REGION)
}

pub async fn create_bucket(
    backend: &dyn S3Backend,
    bucket: &str,
    region: &str,
    wait: WaitPolicy,
    reporter: &mut dyn Reporter,
) -> Result<CreateOutcome> {
    validate_bucket_name(bucket)?;
    let region = resolve_region(region);

    reporter.log(
        LogLevel::Info,
        format!("Creating bucket '{bucket}' in region '{region}'"),
    );
    match backend.create_bucket(bucket, region).await {
        Ok(()) => {}
        Err(err) if err.code() == Some("BucketAlreadyOwnedByYou") => {
            return Ok(CreateOutcome::AlreadyOwned {
                region: region.to_string(),
            });
        }
        Err(err) => return Err(map_create_error(err, bucket, region)),
    }

    reporter.progress(50, format!("Waiting for bucket '{bucket}' to become available"));
    wait_for_bucket(backend, bucket, wait).await?;
    reporter.progress(100, format!("Bucket '{bucket}' is available"));
    Ok(CreateOutcome::Created {
        region: region.to_string(),
    })
}

pub async fn empty_bucket(
    backend: &dyn S3Backend,
    bucket: &str,
    reporter: &mut dyn Reporter,
) -> Result<EmptyStats> {
    let status = backend.bucket_versioning(bucket).await?;
    let versioned = status.keeps_versions();
    let mut entries: Vec<ObjectVersionRef> = Vec::new();

    if versioned {
        reporter.log(
            LogLevel::Info,
            format!("Versioning is {status}; deleting every object version and delete marker"),
        );
        let (mut key_marker, mut version_marker) = (None, None);
        loop {
            let page = backend
                .list_object_versions_page(bucket, key_marker.take(), version_marker.take())
                .await?;
            let truncated = page.is_truncated();
            entries.extend(page.entries);
            if !truncated {
                break;
            }
            key_marker = page.next_key_marker;
            version_marker = page.next_version_marker;
        }
    } else {
        reporter.log(
            LogLevel::Info,
            "Versioning is not enabled; deleting every object".to_string(),
        );
        entries.extend(
            list_objects(backend, bucket)
                .await?
                .into_iter()
                .map(|object| ObjectVersionRef {
                    key: object.key,
                    version_id: None,
                }),
        );
    }

    let total = entries.len();
    let mut removed = 0;
    for chunk in entries.chunks(DELETE_BATCH_SIZE) {
        // emptying occupies the first 90% of the bucket deletion
        let percent = (calculate_percentage(removed, total) as u16 * 90 / 100) as u8;
        reporter.progress(percent, format!("Emptying bucket: {removed}/{total}"));
        backend.delete_object_batch(bucket, chunk).await?;
        removed += chunk.len();
    }

    Ok(EmptyStats { versioned, removed })
}

pub async fn delete_bucket(
    backend: &dyn S3Backend,
    bucket: &str,
    reporter: &mut dyn Reporter,
) -> Result<EmptyStats> {
    reporter.progress(0, format!("Emptying bucket '{bucket}'"));
    let stats = empty_bucket(backend, bucket, reporter).await?;
    reporter.log(
        LogLevel::Info,
        format!("Removed {} entries from '{bucket}'", stats.removed),
    );

    reporter.progress(90, format!("Deleting bucket '{bucket}'"));
    backend.delete_bucket(bucket).await?;
    reporter.progress(100, format!("Bucket '{bucket}' deleted"));
    info!("Deleted bucket {bucket}");
    Ok(stats)
}
