#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use s3manager_lib::credentials::Credentials;
use s3manager_lib::error::{ManagerError, Result};
use s3manager_lib::s3::{
    BucketSummary, ClientConfig, ClientFactory, ObjectPage, ObjectSummary, ObjectVersionRef,
    S3Backend, VersionPage, VersioningStatus,
};
use s3manager_lib::worker::{Worker, WorkerEvent, WorkerOptions};
use s3manager_lib::settings::WaitPolicy;

const PAGE_SIZE: usize = 2;

#[derive(Debug)]
struct MemoryBucket {
    region: String,
    versioning: VersioningStatus,
    objects: BTreeMap<String, Vec<u8>>,
    versions: Vec<ObjectVersionRef>,
    encrypted: bool,
    cors_rules: Option<usize>,
}

#[derive(Debug, Default)]
struct Inner {
    buckets: BTreeMap<String, MemoryBucket>,
    taken_names: Vec<String>,
    failures: HashMap<String, ManagerError>,
    panics: Vec<String>,
    invisible_checks: u32,
    calls: Vec<String>,
    hold: Option<Receiver<()>>,
}

/// In-memory S3 with injectable failures, paging two entries at a time.
#[derive(Debug, Default)]
pub struct MemoryS3 {
    inner: Mutex<Inner>,
}

fn not_found(code: &str, message: &str) -> ManagerError {
    ManagerError::client(code, message)
}

impl MemoryS3 {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn add_bucket(&self, name: &str, region: &str) {
        self.inner().buckets.insert(
            name.to_string(),
            MemoryBucket {
                region: region.to_string(),
                versioning: VersioningStatus::Disabled,
                objects: BTreeMap::new(),
                versions: Vec::new(),
                encrypted: false,
                cors_rules: None,
            },
        );
    }

    pub fn set_versioning(&self, bucket: &str, status: VersioningStatus) {
        self.inner().buckets.get_mut(bucket).unwrap().versioning = status;
    }

    pub fn set_encrypted(&self, bucket: &str) {
        self.inner().buckets.get_mut(bucket).unwrap().encrypted = true;
    }

    pub fn set_cors_rules(&self, bucket: &str, rules: usize) {
        self.inner().buckets.get_mut(bucket).unwrap().cors_rules = Some(rules);
    }

    /// Seeds an object; versioned buckets also gain a version entry.
    pub fn put(&self, bucket: &str, key: &str, body: &[u8]) {
        let mut inner = self.inner();
        let bucket = inner.buckets.get_mut(bucket).unwrap();
        bucket.objects.insert(key.to_string(), body.to_vec());
        if bucket.versioning.keeps_versions() {
            bucket.versions.push(ObjectVersionRef {
                key: key.to_string(),
                version_id: Some(Uuid::new_v4().to_string()),
            });
        }
    }

    /// Adds a delete marker without a current object.
    pub fn add_delete_marker(&self, bucket: &str, key: &str) {
        self.inner()
            .buckets
            .get_mut(bucket)
            .unwrap()
            .versions
            .push(ObjectVersionRef {
                key: key.to_string(),
                version_id: Some(Uuid::new_v4().to_string()),
            });
    }

    pub fn mark_taken(&self, name: &str) {
        self.inner().taken_names.push(name.to_string());
    }

    /// Fails `call` (optionally only for `key`) with `err`.
    pub fn fail(&self, call: &str, key: Option<&str>, err: ManagerError) {
        let id = match key {
            Some(key) => format!("{call}:{key}"),
            None => call.to_string(),
        };
        self.inner().failures.insert(id, err);
    }

    pub fn panic_on(&self, call: &str) {
        self.inner().panics.push(call.to_string());
    }

    /// `bucket_exists` reports false this many times before the truth.
    pub fn hide_new_buckets_for(&self, checks: u32) {
        self.inner().invisible_checks = checks;
    }

    /// Blocks the next `list_buckets` until the returned sender fires.
    pub fn hold_list_buckets(&self) -> Sender<()> {
        let (tx, rx) = mpsc::channel();
        self.inner().hold = Some(rx);
        tx
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner().calls.clone()
    }

    pub fn count_calls(&self, call: &str) -> usize {
        self.inner().calls.iter().filter(|c| c.as_str() == call).count()
    }

    pub fn has_bucket(&self, name: &str) -> bool {
        self.inner().buckets.contains_key(name)
    }

    pub fn object_keys(&self, bucket: &str) -> Vec<String> {
        self.inner().buckets[bucket].objects.keys().cloned().collect()
    }

    pub fn version_count(&self, bucket: &str) -> usize {
        self.inner().buckets[bucket].versions.len()
    }

    fn enter(&self, call: &str, key: Option<&str>) -> Result<MutexGuard<'_, Inner>> {
        let mut inner = self.inner();
        inner.calls.push(call.to_string());
        if inner.panics.iter().any(|p| p == call) {
            drop(inner);
            panic!("injected panic in {call}");
        }
        if let Some(err) = inner.failures.get(call) {
            return Err(err.clone());
        }
        if let Some(key) = key {
            if let Some(err) = inner.failures.get(&format!("{call}:{key}")) {
                return Err(err.clone());
            }
        }
        Ok(inner)
    }
}

fn bucket_mut<'a>(inner: &'a mut Inner, bucket: &str) -> Result<&'a mut MemoryBucket> {
    inner
        .buckets
        .get_mut(bucket)
        .ok_or_else(|| not_found("NoSuchBucket", "The specified bucket does not exist"))
}

fn page_start(token: Option<String>) -> usize {
    token.and_then(|t| t.parse().ok()).unwrap_or(0)
}

#[async_trait]
impl S3Backend for MemoryS3 {
    async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        let hold = self.enter("list_buckets", None)?.hold.take();
        if let Some(hold) = hold {
            let _ = hold.recv_timeout(Duration::from_secs(10));
        }
        let inner = self.inner();
        Ok(inner
            .buckets
            .keys()
            .map(|name| BucketSummary {
                name: name.clone(),
                created_at: Some(Utc::now()),
            })
            .collect())
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
        max_keys: Option<i32>,
    ) -> Result<ObjectPage> {
        let mut inner = self.enter("list_objects", None)?;
        let bucket = bucket_mut(&mut inner, bucket)?;
        let start = page_start(continuation_token);
        let size = max_keys
            .map(|m| m.max(1) as usize)
            .unwrap_or(PAGE_SIZE)
            .min(PAGE_SIZE);
        let objects: Vec<ObjectSummary> = bucket
            .objects
            .iter()
            .skip(start)
            .take(size)
            .map(|(key, body)| ObjectSummary {
                key: key.clone(),
                size: body.len() as u64,
                last_modified: Some(Utc::now()),
            })
            .collect();
        let next = start + objects.len();
        Ok(ObjectPage {
            next_token: (next < bucket.objects.len()).then(|| next.to_string()),
            objects,
        })
    }

    async fn download_object(&self, bucket: &str, key: &str, destination: &Path) -> Result<u64> {
        let mut inner = self.enter("get_object", Some(key))?;
        let body = bucket_mut(&mut inner, bucket)?
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| not_found("NoSuchKey", "The specified key does not exist."))?;
        std::fs::write(destination, &body).map_err(|err| ManagerError::local_io(destination, err))?;
        Ok(body.len() as u64)
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        let mut inner = self.enter("put_object", Some(key))?;
        let bucket = bucket_mut(&mut inner, bucket)?;
        bucket.objects.insert(key.to_string(), body);
        if bucket.versioning.keeps_versions() {
            bucket.versions.push(ObjectVersionRef {
                key: key.to_string(),
                version_id: Some(Uuid::new_v4().to_string()),
            });
        }
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let mut inner = self.enter("delete_object", Some(key))?;
        let bucket = bucket_mut(&mut inner, bucket)?;
        if bucket.objects.remove(key).is_some() && bucket.versioning.keeps_versions() {
            bucket.versions.push(ObjectVersionRef {
                key: key.to_string(),
                version_id: Some(Uuid::new_v4().to_string()),
            });
        }
        Ok(())
    }

    async fn delete_object_batch(&self, bucket: &str, entries: &[ObjectVersionRef]) -> Result<()> {
        let mut inner = self.enter("delete_objects", None)?;
        let bucket = bucket_mut(&mut inner, bucket)?;
        for entry in entries {
            match &entry.version_id {
                Some(_) => {
                    bucket.versions.retain(|v| v != entry);
                    if !bucket.versions.iter().any(|v| v.key == entry.key) {
                        bucket.objects.remove(&entry.key);
                    }
                }
                None => {
                    bucket.objects.remove(&entry.key);
                }
            }
        }
        Ok(())
    }

    async fn list_object_versions_page(
        &self,
        bucket: &str,
        key_marker: Option<String>,
        version_marker: Option<String>,
    ) -> Result<VersionPage> {
        let mut inner = self.enter("list_object_versions", None)?;
        let bucket = bucket_mut(&mut inner, bucket)?;
        let start = page_start(version_marker);
        let entries: Vec<ObjectVersionRef> =
            bucket.versions.iter().skip(start).take(PAGE_SIZE).cloned().collect();
        let next = start + entries.len();
        let truncated = next < bucket.versions.len();
        let _ = key_marker;
        Ok(VersionPage {
            next_key_marker: truncated.then(|| entries.last().map(|e| e.key.clone()).unwrap_or_default()),
            next_version_marker: truncated.then(|| next.to_string()),
            entries,
        })
    }

    async fn bucket_location(&self, bucket: &str) -> Result<String> {
        let mut inner = self.enter("get_bucket_location", None)?;
        Ok(bucket_mut(&mut inner, bucket)?.region.clone())
    }

    async fn bucket_versioning(&self, bucket: &str) -> Result<VersioningStatus> {
        let mut inner = self.enter("get_bucket_versioning", None)?;
        Ok(bucket_mut(&mut inner, bucket)?.versioning)
    }

    async fn get_bucket_encryption(&self, bucket: &str) -> Result<()> {
        let mut inner = self.enter("get_bucket_encryption", None)?;
        if bucket_mut(&mut inner, bucket)?.encrypted {
            Ok(())
        } else {
            Err(not_found(
                "ServerSideEncryptionConfigurationNotFoundError",
                "The server side encryption configuration was not found",
            ))
        }
    }

    async fn get_bucket_acl(&self, bucket: &str) -> Result<()> {
        let mut inner = self.enter("get_bucket_acl", None)?;
        bucket_mut(&mut inner, bucket).map(|_| ())
    }

    async fn cors_rule_count(&self, bucket: &str) -> Result<usize> {
        let mut inner = self.enter("get_bucket_cors", None)?;
        bucket_mut(&mut inner, bucket)?
            .cors_rules
            .ok_or_else(|| not_found("NoSuchCORSConfiguration", "The CORS configuration does not exist"))
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()> {
        let mut inner = self.enter("create_bucket", None)?;
        if inner.buckets.contains_key(bucket) {
            return Err(ManagerError::client(
                "BucketAlreadyOwnedByYou",
                "Your previous request to create the named bucket succeeded and you already own it.",
            ));
        }
        if inner.taken_names.iter().any(|name| name == bucket) {
            return Err(ManagerError::client(
                "BucketAlreadyExists",
                "The requested bucket name is not available.",
            ));
        }
        inner.buckets.insert(
            bucket.to_string(),
            MemoryBucket {
                region: region.to_string(),
                versioning: VersioningStatus::Disabled,
                objects: BTreeMap::new(),
                versions: Vec::new(),
                encrypted: false,
                cors_rules: None,
            },
        );
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let mut inner = self.enter("head_bucket", None)?;
        if inner.invisible_checks > 0 {
            inner.invisible_checks -= 1;
            return Ok(false);
        }
        Ok(inner.buckets.contains_key(bucket))
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let mut inner = self.enter("delete_bucket", None)?;
        let target = bucket_mut(&mut inner, bucket)?;
        if !target.objects.is_empty() || !target.versions.is_empty() {
            return Err(ManagerError::client(
                "BucketNotEmpty",
                "The bucket you tried to delete is not empty",
            ));
        }
        inner.buckets.remove(bucket);
        Ok(())
    }
}

/// Hands out the shared in-memory backend and records every configuration.
pub struct MemoryFactory {
    pub backend: Arc<MemoryS3>,
    configs: Mutex<Vec<ClientConfig>>,
}

impl MemoryFactory {
    pub fn new(backend: Arc<MemoryS3>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            configs: Mutex::new(Vec::new()),
        })
    }

    pub fn regions(&self) -> Vec<String> {
        self.configs
            .lock()
            .unwrap()
            .iter()
            .map(|config| config.region.clone())
            .collect()
    }
}

impl ClientFactory for MemoryFactory {
    fn connect(&self, config: &ClientConfig) -> Result<Arc<dyn S3Backend>> {
        match &config.credentials {
            Some(credentials) if credentials.is_complete() => {}
            _ => return Err(ManagerError::NoCredentials),
        }
        self.configs.lock().unwrap().push(config.clone());
        Ok(Arc::clone(&self.backend) as Arc<dyn S3Backend>)
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        credentials: Some(Credentials::new("AKIATESTKEY000001", "test-secret")),
        region: "us-east-1".to_string(),
        endpoint: None,
    }
}

pub fn start_worker(backend: &Arc<MemoryS3>) -> (Worker, Receiver<WorkerEvent>, Arc<MemoryFactory>) {
    let factory = MemoryFactory::new(Arc::clone(backend));
    let (worker, events) = Worker::spawn(
        Arc::clone(&factory) as Arc<dyn ClientFactory>,
        WorkerOptions {
            wait: WaitPolicy::immediate(5),
        },
    )
    .unwrap();
    worker.set_client_config(test_config());
    (worker, events, factory)
}

/// Collects events up to and including the terminal one of `id`.
pub fn events_until_terminal(events: &Receiver<WorkerEvent>, id: Uuid) -> Vec<WorkerEvent> {
    let mut collected = Vec::new();
    loop {
        let event = events
            .recv_timeout(Duration::from_secs(10))
            .expect("worker produced no terminal event");
        assert_eq!(event.operation_id, id, "events from another operation interleaved");
        let terminal = event.is_terminal();
        collected.push(event);
        if terminal {
            return collected;
        }
    }
}
