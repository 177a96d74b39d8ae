use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::Args;
use crate::config_paths::settings_path;
use crate::credentials::{CredentialSource, CredentialStore, Credentials};
use crate::s3::aws::AwsClientFactory;
use crate::s3::{ClientConfig, ClientFactory};
use crate::settings::{env_var_non_empty, validate_endpoint, AppSettings};
use crate::worker::{Worker, WorkerEvent, WorkerOptions};

/// Settings after every layer: defaults, `settings.json`, environment, flags.
pub fn layered_settings(
    args: &Args,
    persisted: AppSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> crate::error::Result<AppSettings> {
    let mut settings = persisted;
    settings.apply_env(lookup)?;
    if let Some(region) = args.region.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        settings.default_region = region.to_string();
    }
    if let Some(endpoint) = &args.endpoint {
        settings.endpoint = Some(validate_endpoint(endpoint)?);
    }
    if args.no_keychain {
        settings.use_keychain = false;
    }
    Ok(settings)
}

/// The region stored next to the credentials applies unless `--region` or the
/// launch environment already picked one.
pub fn client_config(
    settings: &AppSettings,
    credentials: Option<Credentials>,
    region_pinned: bool,
) -> ClientConfig {
    let mut config = ClientConfig::from_settings(settings, credentials);
    if !region_pinned {
        let stored = config
            .credentials
            .as_ref()
            .and_then(|c| c.region.as_deref())
            .map(str::trim)
            .filter(|region| !region.is_empty())
            .map(str::to_string);
        if let Some(region) = stored {
            config.region = region;
        }
    }
    config
}

pub struct Session {
    pub settings: AppSettings,
    pub settings_path: PathBuf,
    pub store: CredentialStore,
    pub worker: Arc<Worker>,
    region_pinned: bool,
}

impl Session {
    pub fn start(args: &Args) -> Result<(Self, Receiver<WorkerEvent>)> {
        Self::start_with(args, Arc::new(AwsClientFactory))
    }

    pub fn start_with(
        args: &Args,
        factory: Arc<dyn ClientFactory>,
    ) -> Result<(Self, Receiver<WorkerEvent>)> {
        // Read before any credential load exports a region into the environment.
        let region_pinned =
            args.region.is_some() || env_var_non_empty("AWS_DEFAULT_REGION").is_some();
        let settings_path = settings_path()?;
        let persisted = AppSettings::load_from(&settings_path)?;
        let settings = layered_settings(args, persisted, env_var_non_empty)?;
        let store = CredentialStore::system(settings.use_keychain)?;

        let (worker, events) = Worker::spawn(
            factory,
            WorkerOptions {
                wait: settings.wait_policy(),
            },
        )
        .context("starting the background worker")?;

        let session = Self {
            settings,
            settings_path,
            store,
            worker: Arc::new(worker),
            region_pinned,
        };
        session.refresh_client_config();
        Ok((session, events))
    }

    pub fn credentials(&self) -> Option<(Credentials, CredentialSource)> {
        self.store.load()
    }

    /// Reloads credentials and hands the worker a fresh client configuration.
    pub fn refresh_client_config(&self) -> Option<CredentialSource> {
        let loaded = self.credentials();
        let source = loaded.as_ref().map(|(_, source)| *source);
        match &source {
            Some(source) => info!("Using credentials from {source}"),
            None => warn!("No AWS credentials configured"),
        }
        let config = client_config(
            &self.settings,
            loaded.map(|(credentials, _)| credentials),
            self.region_pinned,
        );
        self.worker.set_client_config(config);
        source
    }

    pub fn save_credentials(&mut self, credentials: &Credentials) -> Result<Vec<String>> {
        let mut notes = Vec::new();
        let report = self.store.save(credentials)?;
        if let Some(err) = report.keychain_error {
            notes.push(format!("Warning: could not store credentials in the keychain: {err}"));
        } else if report.keychain_saved {
            notes.push("Credentials stored in the OS keychain".to_string());
        }
        notes.push(format!(
            "Credentials written to {}",
            self.store.file_path().display()
        ));

        if let Some(region) = &credentials.region {
            self.settings.default_region = region.clone();
            self.settings
                .save_to(&self.settings_path)
                .context("saving settings")?;
        }
        self.refresh_client_config();
        Ok(notes)
    }

    pub fn forget_credentials(&self) -> Result<()> {
        self.store.delete()?;
        self.refresh_client_config();
        Ok(())
    }
}
