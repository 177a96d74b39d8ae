use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line flags layered over `settings.json` and the environment.
#[derive(Parser, Debug)]
#[command(author, version, about = "Manage S3 buckets from the terminal")]
pub struct Args {
    /// Region used for new clients (overrides AWS_DEFAULT_REGION)
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Custom S3-compatible endpoint (overrides S3MANAGER_ENDPOINT)
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Never read or write the OS secret store
    #[arg(long, global = true)]
    pub no_keychain: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List every bucket the credentials can see
    Buckets,
    /// List the objects of a bucket
    Files { bucket: String },
    /// Download objects into a local directory
    Download {
        bucket: String,
        #[arg(required = true)]
        keys: Vec<String>,
        /// Destination directory (defaults to ~/Downloads)
        #[arg(long, short = 'o')]
        to: Option<PathBuf>,
    },
    /// Delete objects from a bucket
    Delete {
        bucket: String,
        #[arg(required = true)]
        keys: Vec<String>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Probe list/read/write/delete access and report bucket settings
    Permissions { bucket: String },
    /// Create a bucket, waiting until it is visible
    CreateBucket {
        bucket: String,
        /// Bucket region (defaults to the configured region)
        #[arg(long = "in")]
        bucket_region: Option<String>,
    },
    /// Empty and delete a bucket
    DeleteBucket {
        bucket: String,
        /// Skip retyping the bucket name
        #[arg(long)]
        yes: bool,
    },
    /// Store AWS credentials
    Configure {
        #[arg(long)]
        access_key: Option<String>,
        #[arg(long)]
        secret_key: Option<String>,
        #[arg(long)]
        default_region: Option<String>,
    },
    /// Remove stored AWS credentials
    Forget,
    /// Interactive shell (the default)
    Shell,
}
