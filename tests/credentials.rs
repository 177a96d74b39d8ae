use std::fs;
use std::path::Path;
use std::sync::Arc;

use s3manager_lib::credentials::keychain::{MemoryStore, SecretStore};
use s3manager_lib::credentials::{CredentialSource, CredentialStore, Credentials};

fn store(dir: &Path, secrets: Option<Arc<dyn SecretStore>>) -> CredentialStore {
    CredentialStore::new(secrets, dir.join(".aws").join("credentials")).without_env_sync()
}

#[test]
fn credentials_round_trip_through_keychain_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let secrets: Arc<dyn SecretStore> = Arc::new(MemoryStore::default());
    let store = store(dir.path(), Some(Arc::clone(&secrets)));
    assert!(!store.has_credentials());

    let saved = Credentials::new("AKIAROUNDTRIP0001", "round/trip+secret");
    let report = store.save(&saved).unwrap();
    assert!(report.keychain_saved);
    assert_eq!(report.keychain_error, None);

    let (loaded, source) = store.load().unwrap();
    assert_eq!(source, CredentialSource::Keychain);
    assert_eq!(loaded.access_key, saved.access_key);
    assert_eq!(loaded.secret_key, saved.secret_key);

    let file_only = CredentialStore::new(None, store.file_path()).without_env_sync();
    let (from_file, source) = file_only.load().unwrap();
    assert_eq!(source, CredentialSource::File);
    assert_eq!(from_file.secret_key, "round/trip+secret");

    store.delete().unwrap();
    assert!(store.load().is_none());
    assert!(!store.has_credentials());
    assert!(!store.file_path().exists());
    assert_eq!(secrets.get("AWS_ACCESS_KEY_ID").unwrap(), None);
}

#[test]
fn keychain_failure_is_reported_but_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), Some(Arc::new(MemoryStore::failing())));

    let report = store
        .save(&Credentials::new("AKIAFALLBACK00001", "fallback-secret"))
        .unwrap();
    assert!(!report.keychain_saved);
    assert!(report.keychain_error.is_some());

    let (loaded, source) = store.load().unwrap();
    assert_eq!(source, CredentialSource::File);
    assert_eq!(loaded.access_key, "AKIAFALLBACK00001");
}

#[test]
fn saving_and_deleting_keeps_other_profiles() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path(), None);
    fs::create_dir_all(store.file_path().parent().unwrap()).unwrap();
    fs::write(
        store.file_path(),
        "[work]\naws_access_key_id = AKIAWORK\naws_secret_access_key = work-secret\n\n\
         [default]\naws_access_key_id = AKIAOLD\naws_secret_access_key = old-secret\nregion = eu-west-1\n",
    )
    .unwrap();

    store
        .save(&Credentials::new("AKIANEW", "new-secret"))
        .unwrap();
    let content = fs::read_to_string(store.file_path()).unwrap();
    assert!(content.contains("[work]\naws_access_key_id = AKIAWORK"));
    assert!(content.contains("aws_access_key_id = AKIANEW"));
    assert!(!content.contains("AKIAOLD"));
    assert!(content.contains("region = eu-west-1"));

    let (loaded, _) = store.load().unwrap();
    assert_eq!(loaded.region.as_deref(), Some("eu-west-1"));

    store.delete().unwrap();
    let content = fs::read_to_string(store.file_path()).unwrap();
    assert!(content.contains("AKIAWORK"));
    assert!(!content.contains("AKIANEW"));
    assert!(content.contains("region = eu-west-1"));
    assert!(store.load().is_none());
}
