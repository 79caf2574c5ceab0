use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SyncError;

pub const DEFAULT_FTP_PORT: u16 = 21;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_REMOTE_PATH: &str = "/";

/// Everything a run needs. Built once by the caller and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub remote: RemoteConfig,
    pub sink: SinkConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Directory to synchronise. Only its direct children are considered.
    pub path: String,
    pub connect_timeout_secs: u64,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub account_name: String,
    pub account_key: String,
    pub container: String,
    /// Overrides the default `https://<account>.blob.core.windows.net` endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Anonymous access level requested when the container is created.
    #[serde(default)]
    pub public_access: Option<PublicAccess>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicAccess {
    Blob,
    Container,
}

impl PublicAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicAccess::Blob => "blob",
            PublicAccess::Container => "container",
        }
    }
}

impl FromStr for PublicAccess {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blob" => Ok(PublicAccess::Blob),
            "container" => Ok(PublicAccess::Container),
            other => Err(SyncError::Config(format!(
                "unknown public access level {other:?} (expected \"blob\" or \"container\")"
            ))),
        }
    }
}

impl RemoteConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl SyncConfig {
    /// Reject configurations that cannot possibly work before any I/O happens.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.remote.host.trim().is_empty() {
            return Err(SyncError::Config("remote host is empty".into()));
        }
        if self.remote.port == 0 {
            return Err(SyncError::Config("remote port must be non-zero".into()));
        }
        if self.remote.connect_timeout_secs == 0 {
            return Err(SyncError::Config(
                "connect timeout must be at least one second".into(),
            ));
        }
        if self.sink.account_name.trim().is_empty() {
            return Err(SyncError::Config("storage account name is empty".into()));
        }
        validate_container_name(&self.sink.container)
    }

    pub fn trace_loaded(&self) {
        info!(
            remote_host = %self.remote.host,
            remote_port = self.remote.port,
            remote_path = %self.remote.path,
            account = %self.sink.account_name,
            container = %self.sink.container,
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug, secrets redacted)");
    }
}

/// Container names: 3-63 characters of lower-case letters, digits and single
/// hyphens, starting and ending with a letter or digit.
pub fn validate_container_name(name: &str) -> Result<(), SyncError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid = (3..=63).contains(&name.len())
        && valid_chars
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--");
    if valid {
        Ok(())
    } else {
        Err(SyncError::Config(format!(
            "invalid container name {name:?}: use 3-63 lower-case letters, digits or single hyphens"
        )))
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("path", &self.path)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkConfig")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("container", &self.container)
            .field("endpoint", &self.endpoint)
            .field("public_access", &self.public_access)
            .finish()
    }
}
