//! `load_config` module: loads the optional YAML config file and layers it with
//! command-line flags / environment variables into the core `SyncConfig`.
//!
//! # Precedence
//! For every setting: flag or environment variable, then the YAML file, then the
//! placeholder default.
//!
//! # Errors
//! All errors use `anyhow::Error` with context and surface at the CLI boundary.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};

use ftp_blob_sync_core::config::{
    PublicAccess, RemoteConfig, SinkConfig, SyncConfig, DEFAULT_CONNECT_TIMEOUT_SECS,
    DEFAULT_FTP_PORT, DEFAULT_REMOTE_PATH,
};

use crate::cli::SyncArgs;

pub const DEFAULT_STORAGE_ACCOUNT_NAME: &str = "storageaccountname";
pub const DEFAULT_STORAGE_ACCOUNT_KEY: &str = "storageaccountkey";
pub const DEFAULT_STORAGE_CONTAINER: &str = "storagecontainer";
pub const DEFAULT_FTP_SERVER: &str = "ftpserver";
pub const DEFAULT_FTP_USERNAME: &str = "ftpusername";
pub const DEFAULT_FTP_PASSWORD: &str = "ftppassword";

/// YAML schema. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub ftp: FtpSection,
    #[serde(default)]
    pub storage: StorageSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FtpSection {
    pub server: Option<String>,
    pub port: Option<PortValue>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub path: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub container: Option<String>,
    pub endpoint: Option<String>,
    pub public_access: Option<PublicAccess>,
}

/// A port may be written as a number or as a string such as `":2121"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u16),
    Text(String),
}

impl PortValue {
    fn resolve(&self) -> Result<u16> {
        match self {
            PortValue::Number(port) => Ok(*port),
            PortValue::Text(text) => parse_port(text),
        }
    }
}

/// Parse a port, tolerating a leading `:`.
pub fn parse_port(raw: &str) -> Result<u16> {
    let trimmed = raw.trim().trim_start_matches(':');
    trimmed
        .parse::<u16>()
        .with_context(|| format!("invalid FTP port {raw:?}"))
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    match serde_yaml::from_str::<FileConfig>(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

fn pick(flag: &Option<String>, file: &Option<String>, default: &str) -> String {
    flag.clone()
        .or_else(|| file.clone())
        .unwrap_or_else(|| default.to_string())
}

/// Merge flags, file and defaults into the immutable run configuration.
pub fn resolve_config(args: &SyncArgs, file: Option<FileConfig>) -> Result<SyncConfig> {
    let file = file.unwrap_or_default();
    let ftp = file.ftp;
    let storage = file.storage;

    let port = match (&args.ftp_port, &ftp.port) {
        (Some(flag), _) => parse_port(flag)?,
        (None, Some(port)) => port.resolve()?,
        (None, None) => DEFAULT_FTP_PORT,
    };

    let public_access = match &args.public_access {
        Some(raw) => Some(raw.parse::<PublicAccess>()?),
        None => storage.public_access,
    };

    let config = SyncConfig {
        remote: RemoteConfig {
            host: pick(&args.ftp_server, &ftp.server, DEFAULT_FTP_SERVER),
            port,
            username: pick(&args.ftp_username, &ftp.username, DEFAULT_FTP_USERNAME),
            password: pick(&args.ftp_password, &ftp.password, DEFAULT_FTP_PASSWORD),
            path: pick(&args.ftp_path, &ftp.path, DEFAULT_REMOTE_PATH),
            connect_timeout_secs: args
                .timeout_secs
                .or(ftp.timeout_secs)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        },
        sink: SinkConfig {
            account_name: pick(
                &args.storage_account_name,
                &storage.account_name,
                DEFAULT_STORAGE_ACCOUNT_NAME,
            ),
            account_key: pick(
                &args.storage_account_key,
                &storage.account_key,
                DEFAULT_STORAGE_ACCOUNT_KEY,
            ),
            container: pick(
                &args.storage_container,
                &storage.container,
                DEFAULT_STORAGE_CONTAINER,
            ),
            endpoint: args.storage_endpoint.clone().or(storage.endpoint),
            public_access,
        },
    };
    config
        .validate()
        .context("Configuration is not usable")?;
    Ok(config)
}
