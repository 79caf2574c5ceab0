//! CLI interface for ftp-blob-sync: argument parsing, configuration layering and
//! the `sync` command.
//!
//! All reconciliation logic lives in the [`ftp_blob_sync_core`] crate. This module
//! wires the FTP source, the Azure sink and terminal progress together.
//!
//! ## How To Use
//! - From the shell: `ftp-blob-sync sync --help`.
//! - Programmatically / in tests: build a [`Cli`] and call [`run`].
//!
//! Every `sync` flag can also be given as an environment variable (a `.env` file
//! is honoured) or through a YAML file passed with `--config`.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use ftp_blob_sync_core::ftp::FtpSource;
use ftp_blob_sync_core::report::SyncReport;
use ftp_blob_sync_core::synchronise::synchronise;

use crate::azure::AzureBlobSink;
use crate::load_config::{load_config, resolve_config};
use crate::progress::ProgressObserver;

/// Mirror an FTP directory into an Azure Blob Storage container.
#[derive(Parser)]
#[clap(
    name = "ftp-blob-sync",
    version,
    about = "Download data from an FTP server into an Azure Blob Storage container, uploading only new or changed files"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download data from FTP server to storage account
    Sync(SyncArgs),
}

#[derive(Debug, Default, Args)]
pub struct SyncArgs {
    /// storage account name [default: storageaccountname]
    #[arg(short = 'n', long = "storageaccountname", env = "STORAGE_ACCOUNT_NAME")]
    pub storage_account_name: Option<String>,

    /// storage account key [default: storageaccountkey]
    #[arg(
        short = 'k',
        long = "storageaccountkey",
        env = "STORAGE_ACCESS_KEY",
        hide_env_values = true
    )]
    pub storage_account_key: Option<String>,

    /// storage account container [default: storagecontainer]
    #[arg(short = 'c', long = "storagecontainer", env = "STORAGE_CONTAINER")]
    pub storage_container: Option<String>,

    /// blob service endpoint, for emulators [default: https://<account>.blob.core.windows.net]
    #[arg(long = "storageendpoint", env = "STORAGE_ENDPOINT")]
    pub storage_endpoint: Option<String>,

    /// anonymous access level for a newly created container: blob or container [default: private]
    #[arg(long = "publicaccess", env = "STORAGE_PUBLIC_ACCESS")]
    pub public_access: Option<String>,

    /// ftp server [default: ftpserver]
    #[arg(short = 's', long = "ftpserver", env = "FTPSERVER")]
    pub ftp_server: Option<String>,

    /// port of the ftp server, with or without a leading ':' [default: 21]
    #[arg(short = 't', long = "ftpport", env = "FTPPORT")]
    pub ftp_port: Option<String>,

    /// ftp username [default: ftpusername]
    #[arg(short = 'u', long = "ftpusername", env = "FTPUSERNAME")]
    pub ftp_username: Option<String>,

    /// ftp password [default: ftppassword]
    #[arg(
        short = 'p',
        long = "ftppassword",
        env = "FTPPASSWORD",
        hide_env_values = true
    )]
    pub ftp_password: Option<String>,

    /// ftp path [default: /]
    #[arg(short = 'a', long = "ftppath", env = "FTPPATH")]
    pub ftp_path: Option<String>,

    /// seconds to wait for the ftp server [default: 5]
    #[arg(long = "timeout", env = "FTPTIMEOUT")]
    pub timeout_secs: Option<u64>,

    /// YAML file with defaults for any of the settings above
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync(args) => {
            tracing::info!(command = "sync", triggered_at = %Utc::now().to_rfc3339(), "Function triggered");
            let file = match &args.config {
                Some(path) => Some(load_config(path)?),
                None => None,
            };
            let config = resolve_config(&args, file)?;
            config.trace_loaded();

            let sink = AzureBlobSink::new(&config.sink)
                .context("Error generating key to storage account")?;

            let cancel = CancellationToken::new();
            let ctrl_c = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("Interrupt received, finishing current item");
                        cancel.cancel();
                    }
                })
            };

            let mut observer = ProgressObserver::new();
            let result = synchronise(&config, &FtpSource::new(), &sink, &mut observer, &cancel).await;
            ctrl_c.abort();
            observer.finish();

            match result {
                Ok(report) => {
                    tracing::info!(command = "sync", %report, "Synchronisation complete");
                    print_summary(&report);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    Err(anyhow::Error::new(e).context("Synchronisation could not start"))
                }
            }
        }
    }
}

/// Render the final report on stdout.
pub fn print_summary(report: &SyncReport) {
    println!("{}", summary_lines(report).join("\n"));
}

pub fn summary_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![
        format!("Received {} files.", report.files_processed()),
        report.to_string(),
    ];
    lines.extend(
        report
            .failures()
            .map(|failure| format!("  {}: {}", failure.name, failure.outcome)),
    );
    lines
}
