mod ini;
pub mod keychain;

use std::{fmt, fs, path::Path, path::PathBuf, sync::Arc};

use tracing::{debug, info, warn};

use crate::config_paths::aws_credentials_path;
use crate::error::{ManagerError, Result};
use keychain::{KeyringStore, SecretStore, ACCESS_KEY_ACCOUNT, SECRET_KEY_ACCOUNT};

const DEFAULT_PROFILE: &str = "default";
const FILE_ACCESS_KEY: &str = "aws_access_key_id";
const FILE_SECRET_KEY: &str = "aws_secret_access_key";
pub const ENV_ACCESS_KEY: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_SECRET_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_REGION: &str = "AWS_DEFAULT_REGION";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn is_complete(&self) -> bool {
        !self.access_key.trim().is_empty() && !self.secret_key.trim().is_empty()
    }

    pub fn masked_access_key(&self) -> String {
        let visible: String = self.access_key.chars().take(8).collect();
        format!("{visible}...")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.masked_access_key())
            .field("secret_key", &"********")
            .field("region", &self.region)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialSource {
    Keychain,
    File,
    Environment,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CredentialSource::Keychain => "OS keychain",
            CredentialSource::File => "credentials file",
            CredentialSource::Environment => "environment",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveReport {
    pub keychain_saved: bool,
    pub keychain_error: Option<String>,
}

pub struct CredentialStore {
    secrets: Option<Arc<dyn SecretStore>>,
    file_path: PathBuf,
    sync_env: bool,
}

impl CredentialStore {
    pub fn new(secrets: Option<Arc<dyn SecretStore>>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            secrets,
            file_path: file_path.into(),
            sync_env: true,
        }
    }

    pub fn system(use_keychain: bool) -> Result<Self> {
        let secrets: Option<Arc<dyn SecretStore>> = if use_keychain {
            Some(Arc::new(KeyringStore::default()))
        } else {
            None
        };
        Ok(Self::new(secrets, aws_credentials_path()?))
    }

    /// Leaves the process environment untouched; used where several stores
    /// share one process.
    pub fn without_env_sync(mut self) -> Self {
        self.sync_env = false;
        self
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn load(&self) -> Option<(Credentials, CredentialSource)> {
        if let Some(found) = self.load_from_keychain() {
            self.export_env(&found);
            return Some((found, CredentialSource::Keychain));
        }

        match self.load_from_file() {
            Ok(Some(found)) => {
                self.export_env(&found);
                return Some((found, CredentialSource::File));
            }
            Ok(None) => {}
            Err(err) => warn!("Failed to read {}: {err}", self.file_path.display()),
        }

        if self.sync_env {
            let access_key = std::env::var(ENV_ACCESS_KEY).unwrap_or_default();
            let secret_key = std::env::var(ENV_SECRET_KEY).unwrap_or_default();
            let mut found = Credentials::new(access_key, secret_key);
            found.region = std::env::var(ENV_REGION).ok().filter(|r| !r.trim().is_empty());
            if found.is_complete() {
                return Some((found, CredentialSource::Environment));
            }
        }

        None
    }

    pub fn has_credentials(&self) -> bool {
        self.load().is_some()
    }

    pub fn save(&self, credentials: &Credentials) -> Result<SaveReport> {
        if !credentials.is_complete() {
            return Err(ManagerError::InvalidInput(
                "Both the access key and the secret key are required".into(),
            ));
        }

        let mut report = SaveReport {
            keychain_saved: false,
            keychain_error: None,
        };
        if let Some(secrets) = &self.secrets {
            let stored = secrets
                .set(ACCESS_KEY_ACCOUNT, &credentials.access_key)
                .and_then(|()| secrets.set(SECRET_KEY_ACCOUNT, &credentials.secret_key));
            match stored {
                Ok(()) => report.keychain_saved = true,
                Err(err) => {
                    warn!("{err}");
                    report.keychain_error = Some(err);
                }
            }
        }

        self.export_env(credentials);
        self.write_file(credentials)?;
        info!(
            "Saved credentials for {} to {}",
            credentials.masked_access_key(),
            self.file_path.display()
        );
        Ok(report)
    }

    pub fn delete(&self) -> Result<()> {
        if let Some(secrets) = &self.secrets {
            for account in [ACCESS_KEY_ACCOUNT, SECRET_KEY_ACCOUNT] {
                match secrets.delete(account) {
                    Ok(existed) => debug!("Keychain entry {account} removed: {existed}"),
                    Err(err) => warn!("{err}"),
                }
            }
        }

        if self.sync_env {
            std::env::remove_var(ENV_ACCESS_KEY);
            std::env::remove_var(ENV_SECRET_KEY);
            std::env::remove_var(ENV_REGION);
        }

        if self.file_path.exists() {
            let content = fs::read_to_string(&self.file_path)
                .map_err(|err| ManagerError::local_io(&self.file_path, err))?;
            let remaining = ini::remove_keys(
                &content,
                DEFAULT_PROFILE,
                &[FILE_ACCESS_KEY, FILE_SECRET_KEY],
            );
            if ini::has_entries(&remaining) {
                write_private_file(&self.file_path, &remaining)?;
            } else {
                fs::remove_file(&self.file_path)
                    .map_err(|err| ManagerError::local_io(&self.file_path, err))?;
            }
        }
        info!("Deleted stored credentials");
        Ok(())
    }

    fn load_from_keychain(&self) -> Option<Credentials> {
        let secrets = self.secrets.as_ref()?;
        let read = secrets
            .get(ACCESS_KEY_ACCOUNT)
            .and_then(|access| Ok((access, secrets.get(SECRET_KEY_ACCOUNT)?)));
        match read {
            Ok((Some(access_key), Some(secret_key))) => {
                let found = Credentials::new(access_key, secret_key);
                found.is_complete().then_some(found)
            }
            Ok(_) => None,
            Err(err) => {
                debug!("Ignoring keychain error: {err}");
                None
            }
        }
    }

    fn load_from_file(&self) -> Result<Option<Credentials>> {
        if !self.file_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.file_path)
            .map_err(|err| ManagerError::local_io(&self.file_path, err))?;
        let section = ini::read_section(&content, DEFAULT_PROFILE);
        let found = Credentials {
            access_key: section.get(FILE_ACCESS_KEY).cloned().unwrap_or_default(),
            secret_key: section.get(FILE_SECRET_KEY).cloned().unwrap_or_default(),
            region: section.get("region").cloned(),
        };
        Ok(found.is_complete().then_some(found))
    }

    fn write_file(&self, credentials: &Credentials) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            create_private_dir(parent)?;
        }
        let existing = if self.file_path.exists() {
            fs::read_to_string(&self.file_path)
                .map_err(|err| ManagerError::local_io(&self.file_path, err))?
        } else {
            String::new()
        };
        let updated = ini::upsert_section(
            &existing,
            DEFAULT_PROFILE,
            &[
                (FILE_ACCESS_KEY, credentials.access_key.as_str()),
                (FILE_SECRET_KEY, credentials.secret_key.as_str()),
            ],
        );
        write_private_file(&self.file_path, &updated)
    }

    fn export_env(&self, credentials: &Credentials) {
        if !self.sync_env {
            return;
        }
        std::env::set_var(ENV_ACCESS_KEY, &credentials.access_key);
        std::env::set_var(ENV_SECRET_KEY, &credentials.secret_key);
        if let Some(region) = &credentials.region {
            std::env::set_var(ENV_REGION, region);
        }
    }
}

fn create_private_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|err| ManagerError::local_io(dir, err))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(|err| ManagerError::local_io(dir, err))?;
    }
    Ok(())
}

fn write_private_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|err| ManagerError::local_io(path, err))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|err| ManagerError::local_io(path, err))?;
    }
    Ok(())
}
