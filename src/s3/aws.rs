use std::{fmt::Debug, path::Path, sync::Arc};

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials as AwsCredentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    types::{
        BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration, Delete,
        ObjectIdentifier,
    },
    Client as S3Client,
};
use chrono::Utc;
use tokio::{
    fs as tokio_fs,
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter},
};
use tracing::debug;

use crate::error::{ManagerError, Result};
use crate::settings::DEFAULT_REGION;

use super::backend::{ClientConfig, ClientFactory, S3Backend};
use super::{
    normalize_location, BucketSummary, ObjectPage, ObjectSummary, ObjectVersionRef, VersionPage,
    VersioningStatus,
};

fn sdk_error<E, R>(err: SdkError<E, R>) -> ManagerError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: Debug,
{
    match &err {
        SdkError::ServiceError(context) => {
            let service = context.err();
            ManagerError::client(
                service.code().unwrap_or("Unknown"),
                service
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| service.to_string()),
            )
        }
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => ManagerError::Transport {
            message: DisplayErrorContext(&err).to_string(),
        },
        _ => ManagerError::Unexpected(DisplayErrorContext(&err).to_string()),
    }
}

fn s3_datetime_to_utc(dt: &aws_sdk_s3::primitives::DateTime) -> Option<chrono::DateTime<Utc>> {
    dt.to_millis()
        .ok()
        .and_then(chrono::DateTime::<Utc>::from_timestamp_millis)
}

fn to_s3_client(config: &ClientConfig) -> Result<S3Client> {
    let credentials = config
        .credentials
        .as_ref()
        .filter(|credentials| credentials.is_complete())
        .ok_or(ManagerError::NoCredentials)?;

    let region = Some(config.region.trim())
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_REGION);

    let provider = AwsCredentials::new(
        credentials.access_key.clone(),
        credentials.secret_key.clone(),
        None,
        None,
        "s3manager",
    );

    let mut config_builder = aws_sdk_s3::config::Builder::new()
        .behavior_version_latest()
        .region(Region::new(region.to_string()))
        .credentials_provider(provider);

    if let Some(endpoint) = config
        .endpoint
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        config_builder = config_builder
            .endpoint_url(endpoint.to_string())
            .force_path_style(true);
    }

    Ok(S3Client::from_conf(config_builder.build()))
}

pub struct AwsBackend {
    client: S3Client,
}

impl AwsBackend {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl S3Backend for AwsBackend {
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        let output = self.client.list_buckets().send().await.map_err(sdk_error)?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|bucket| {
                bucket.name().map(|name| BucketSummary {
                    name: name.to_string(),
                    created_at: bucket.creation_date().and_then(s3_datetime_to_utc),
                })
            })
            .collect())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
        max_keys: Option<i32>,
    ) -> Result<ObjectPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation_token)
            .set_max_keys(max_keys)
            .send()
            .await
            .map_err(sdk_error)?;

        let objects = output
            .contents()
            .iter()
            .map(|item| ObjectSummary {
                key: item.key().unwrap_or_default().to_string(),
                size: item.size().unwrap_or(0).max(0) as u64,
                last_modified: item.last_modified().and_then(s3_datetime_to_utc),
            })
            .collect();

        let next_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ObjectPage {
            objects,
            next_token,
        })
    }

    async fn download_object(&self, bucket: &str, key: &str, destination: &Path) -> Result<u64> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(sdk_error)?;

        let body = Box::pin(output.body.into_async_read());
        let transferred = write_body(body, key, destination).await?;
        debug!("Downloaded s3://{bucket}/{key} ({transferred} bytes)");
        Ok(transferred)
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn delete_object_batch(&self, bucket: &str, entries: &[ObjectVersionRef]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut objects = Vec::with_capacity(entries.len());
        for entry in entries {
            let object = ObjectIdentifier::builder()
                .key(entry.key.clone())
                .set_version_id(entry.version_id.clone())
                .build()
                .map_err(|err| ManagerError::InvalidInput(format!("Invalid object identifier: {err}")))?;
            objects.push(object);
        }

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|err| ManagerError::InvalidInput(format!("Invalid delete payload: {err}")))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(sdk_error)?;

        if let Some(failed) = output.errors().first() {
            return Err(ManagerError::client(
                failed.code().unwrap_or("Unknown"),
                format!(
                    "{} ({})",
                    failed.message().unwrap_or("delete failed"),
                    failed.key().unwrap_or_default()
                ),
            ));
        }
        Ok(())
    }

    async fn list_object_versions_page(
        &self,
        bucket: &str,
        key_marker: Option<String>,
        version_marker: Option<String>,
    ) -> Result<VersionPage> {
        let output = self
            .client
            .list_object_versions()
            .bucket(bucket)
            .set_key_marker(key_marker)
            .set_version_id_marker(version_marker)
            .send()
            .await
            .map_err(sdk_error)?;

        let versions = output.versions().iter().map(|version| ObjectVersionRef {
            key: version.key().unwrap_or_default().to_string(),
            version_id: version.version_id().map(str::to_string),
        });
        let markers = output.delete_markers().iter().map(|marker| ObjectVersionRef {
            key: marker.key().unwrap_or_default().to_string(),
            version_id: marker.version_id().map(str::to_string),
        });
        let entries = versions.chain(markers).collect();

        let (next_key_marker, next_version_marker) = if output.is_truncated().unwrap_or(false) {
            (
                output.next_key_marker().map(str::to_string),
                output.next_version_id_marker().map(str::to_string),
            )
        } else {
            (None, None)
        };

        Ok(VersionPage {
            entries,
            next_key_marker,
            next_version_marker,
        })
    }

    async fn bucket_location(&self, bucket: &str) -> Result<String> {
        let output = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(normalize_location(
            output.location_constraint().map(BucketLocationConstraint::as_str),
        ))
    }

    async fn bucket_versioning(&self, bucket: &str) -> Result<VersioningStatus> {
        let output = self
            .client
            .get_bucket_versioning()
            .bucket(bucket)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(match output.status() {
            Some(BucketVersioningStatus::Enabled) => VersioningStatus::Enabled,
            Some(BucketVersioningStatus::Suspended) => VersioningStatus::Suspended,
            _ => VersioningStatus::Disabled,
        })
    }

    async fn get_bucket_encryption(&self, bucket: &str) -> Result<()> {
        self.client
            .get_bucket_encryption()
            .bucket(bucket)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn get_bucket_acl(&self, bucket: &str) -> Result<()> {
        self.client
            .get_bucket_acl()
            .bucket(bucket)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn cors_rule_count(&self, bucket: &str) -> Result<usize> {
        let output = self
            .client
            .get_bucket_cors()
            .bucket(bucket)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(output.cors_rules().len())
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()> {
        self.client
            .create_bucket()
            .bucket(bucket)
            .set_create_bucket_configuration(location_constraint(region))
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(context)) if context.err().is_not_found() => Ok(false),
            Err(err) => Err(sdk_error(err)),
        }
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }
}

/// `us-east-1` is the one region that rejects an explicit location constraint.
fn location_constraint(region: &str) -> Option<CreateBucketConfiguration> {
    (region != DEFAULT_REGION).then(|| {
        CreateBucketConfiguration::builder()
            .location_constraint(BucketLocationConstraint::from(region))
            .build()
    })
}

const COPY_BUFFER_BYTES: usize = 64 * 1024;

/// Streams an object body into a new file. A failed transfer removes the
/// partial file so no truncated copy is left at `destination`.
async fn write_body<R>(mut body: R, key: &str, destination: &Path) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let file = tokio_fs::File::create(destination)
        .await
        .map_err(|err| ManagerError::local_io(destination, err))?;
    let mut writer = BufWriter::new(file);
    let result = copy_body(&mut body, &mut writer, key, destination).await;
    if result.is_err() {
        drop(writer);
        if let Err(err) = tokio_fs::remove_file(destination).await {
            debug!(
                "Could not remove partial download {}: {err}",
                destination.display()
            );
        }
    }
    result
}

async fn copy_body<R, W>(body: &mut R, writer: &mut W, key: &str, destination: &Path) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; COPY_BUFFER_BYTES];
    let mut transferred: u64 = 0;
    loop {
        let read = body
            .read(&mut buffer)
            .await
            .map_err(|err| ManagerError::Transport {
                message: format!("Download stream for {key} failed: {err}"),
            })?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..read])
            .await
            .map_err(|err| ManagerError::local_io(destination, err))?;
        transferred += read as u64;
    }
    writer
        .flush()
        .await
        .map_err(|err| ManagerError::local_io(destination, err))?;
    Ok(transferred)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AwsClientFactory;

impl ClientFactory for AwsClientFactory {
    fn connect(&self, config: &ClientConfig) -> Result<Arc<dyn S3Backend>> {
        let client = to_s3_client(config)?;
        debug!("Built S3 client for region {}", config.region);
        Ok(Arc::new(AwsBackend::new(client)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Yields one chunk, then fails like a dropped connection.
    struct DroppedConnection {
        sent: bool,
    }

    impl AsyncRead for DroppedConnection {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )));
            }
            self.sent = true;
            buf.put_slice(b"partial");
            Poll::Ready(Ok(()))
        }
    }

    struct FullDisk;

    impl AsyncWrite for FullDisk {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(
                io::ErrorKind::Other,
                "No space left on device",
            )))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn only_regions_outside_us_east_1_send_a_location_constraint() {
        assert!(location_constraint("us-east-1").is_none());
        let configuration = location_constraint("eu-west-2").unwrap();
        assert_eq!(
            configuration.location_constraint().map(|c| c.as_str()),
            Some("eu-west-2")
        );
    }

    #[tokio::test]
    async fn body_is_written_to_the_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        let written = write_body(&b"hello"[..], "hello.txt", &path).await.unwrap();
        assert_eq!(written, 5);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn interrupted_body_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let err = write_body(DroppedConnection { sent: false }, "report.csv", &path)
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::Transport { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn local_write_failure_is_reported_as_local_io() {
        let path = Path::new("/downloads/report.csv");
        let err = copy_body(&mut &b"data"[..], &mut FullDisk, "report.csv", path)
            .await
            .unwrap_err();
        match err {
            ManagerError::LocalIo { path, message } => {
                assert!(path.ends_with("report.csv"));
                assert!(message.contains("No space left"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_credentials_fail_before_any_request() {
        let config = ClientConfig {
            credentials: None,
            region: "us-east-1".into(),
            endpoint: None,
        };
        assert!(matches!(
            AwsClientFactory.connect(&config),
            Err(ManagerError::NoCredentials)
        ));

        let blank = ClientConfig {
            credentials: Some(Credentials::new("AKIA", "")),
            ..config
        };
        assert!(matches!(
            AwsClientFactory.connect(&blank),
            Err(ManagerError::NoCredentials)
        ));
    }

    #[test]
    fn client_builds_with_custom_endpoint() {
        let config = ClientConfig {
            credentials: Some(Credentials::new("AKIA", "secret")),
            region: String::new(),
            endpoint: Some("http://127.0.0.1:9000".into()),
        };
        assert!(AwsClientFactory.connect(&config).is_ok());
    }
}
