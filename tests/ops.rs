mod common;

use common::MemoryS3;
use s3manager_lib::error::{ErrorKind, ManagerError};
use s3manager_lib::s3::ops::{self, Reporter, SilentReporter};
use s3manager_lib::s3::{CreateOutcome, VersioningStatus};
use s3manager_lib::settings::WaitPolicy;
use s3manager_lib::worker::LogLevel;

#[derive(Default)]
struct Recorder {
    progress: Vec<(u8, String)>,
    logs: Vec<(LogLevel, String)>,
}

impl Reporter for Recorder {
    fn progress(&mut self, percent: u8, message: String) {
        self.progress.push((percent, message));
    }

    fn log(&mut self, level: LogLevel, message: String) {
        self.logs.push((level, message));
    }
}

#[tokio::test]
async fn suspended_versioning_still_removes_old_versions() {
    let backend = MemoryS3::new();
    backend.add_bucket("legacy", "us-east-1");
    backend.set_versioning("legacy", VersioningStatus::Enabled);
    backend.put("legacy", "report.csv", b"v1");
    backend.put("legacy", "report.csv", b"v2");
    backend.set_versioning("legacy", VersioningStatus::Suspended);

    let mut recorder = Recorder::default();
    let stats = ops::delete_bucket(backend.as_ref(), "legacy", &mut recorder)
        .await
        .unwrap();
    assert!(stats.versioned);
    assert_eq!(stats.removed, 2);
    assert!(!backend.has_bucket("legacy"));
    assert!(recorder
        .logs
        .iter()
        .any(|(_, message)| message.contains("Versioning is Suspended")));
}

#[tokio::test]
async fn bucket_that_never_appears_times_out() {
    let backend = MemoryS3::new();
    backend.hide_new_buckets_for(10);

    let err = ops::create_bucket(
        backend.as_ref(),
        "slow-bucket",
        "us-east-1",
        WaitPolicy::immediate(3),
        &mut SilentReporter,
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unexpected);
    assert_eq!(backend.count_calls("head_bucket"), 3);
}

#[tokio::test]
async fn already_owned_bucket_skips_the_wait() {
    let backend = MemoryS3::new();
    backend.add_bucket("mine", "us-east-1");

    let outcome = ops::create_bucket(
        backend.as_ref(),
        "mine",
        "us-east-1",
        WaitPolicy::immediate(3),
        &mut SilentReporter,
    )
    .await
    .unwrap();
    assert_eq!(
        outcome,
        CreateOutcome::AlreadyOwned {
            region: "us-east-1".into()
        }
    );
    assert_eq!(backend.count_calls("head_bucket"), 0);
}

#[tokio::test]
async fn invalid_names_never_reach_the_provider() {
    let backend = MemoryS3::new();
    let err = ops::create_bucket(
        backend.as_ref(),
        "xy",
        "us-east-1",
        WaitPolicy::immediate(1),
        &mut SilentReporter,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ManagerError::InvalidBucketName { .. }));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn download_refuses_keys_that_escape_the_destination() {
    let backend = MemoryS3::new();
    backend.add_bucket("media", "us-east-1");
    backend.put("media", "ok.txt", b"fine");
    backend.put("media", "../escape.txt", b"nope");
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("out");

    let mut recorder = Recorder::default();
    let err = ops::download_objects(
        backend.as_ref(),
        "media",
        &["ok.txt".to_string(), "../escape.txt".to_string()],
        &destination,
        &mut recorder,
    )
    .await
    .unwrap_err();

    match err {
        ManagerError::BatchItem {
            position,
            total,
            source,
            ..
        } => {
            assert_eq!((position, total), (2, 2));
            assert_eq!(source.kind(), ErrorKind::InvalidInput);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(destination.join("ok.txt").exists());
    assert!(!dir.path().join("escape.txt").exists());
    assert_eq!(
        recorder.progress.iter().map(|(p, _)| *p).collect::<Vec<_>>(),
        vec![0, 50]
    );
}

#[tokio::test]
async fn listing_follows_continuation_tokens() {
    let backend = MemoryS3::new();
    backend.add_bucket("many", "us-east-1");
    for index in 0..7 {
        backend.put("many", &format!("file-{index}"), b"x");
    }
    let objects = ops::list_objects(backend.as_ref(), "many").await.unwrap();
    assert_eq!(objects.len(), 7);
    assert_eq!(objects[0].key, "file-0");
    assert_eq!(backend.count_calls("list_objects"), 4);
}
