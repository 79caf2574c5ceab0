//! FTP remote source backed by OpenDAL.
//!
//! [`FtpSource::connect`] only checks that the server is reachable within the
//! timeout; credentials are verified by [`RemoteSession::authenticate`], which
//! builds the operator used for every later call on that session.
//!
//! Item names handed to `open_stream` are resolved against the directory that
//! was last listed, so a failed `change_directory` cannot redirect reads to the
//! server root.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opendal::layers::TimeoutLayer;
use opendal::services::Ftp;
use opendal::{Entry, EntryMode, ErrorKind, Operator};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::contract::{ByteStream, RemoteItem, RemoteSession, RemoteSource};
use crate::error::SourceError;

#[derive(Debug, Default, Clone, Copy)]
pub struct FtpSource;

impl FtpSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemoteSource for FtpSource {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, SourceError> {
        let address = socket_address(host, port);
        info!(%address, "[FTP] Connecting to ftp server");

        match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
            Ok(Ok(probe)) => drop(probe),
            Ok(Err(e)) => {
                return Err(SourceError::Connect {
                    address,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(SourceError::Connect {
                    address,
                    reason: format!("timed out after {}s", timeout.as_secs()),
                })
            }
        }

        Ok(Box::new(FtpSession {
            endpoint: format!("ftp://{address}"),
            timeout,
            operator: None,
            base: String::new(),
        }))
    }
}

pub struct FtpSession {
    endpoint: String,
    timeout: Duration,
    operator: Option<Operator>,
    /// Directory prefix item names are resolved against (relative to the server
    /// root, `/`-terminated, empty for the root).
    base: String,
}

impl FtpSession {
    fn operator(&self) -> Result<&Operator, SourceError> {
        self.operator.as_ref().ok_or(SourceError::NotAuthenticated)
    }
}

#[async_trait]
impl RemoteSession for FtpSession {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), SourceError> {
        let builder = Ftp::default()
            .endpoint(&self.endpoint)
            .root("/")
            .user(username)
            .password(password);
        let operator = Operator::new(builder)
            .map_err(|e| SourceError::Auth(e.to_string()))?
            .finish()
            .layer(
                TimeoutLayer::new()
                    .with_timeout(self.timeout)
                    .with_io_timeout(self.timeout),
            );

        operator.check().await.map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => SourceError::Auth(e.to_string()),
            _ => SourceError::Auth(format!("login check failed: {e}")),
        })?;
        debug!(endpoint = %self.endpoint, username, "[FTP] Logged in");
        self.operator = Some(operator);
        Ok(())
    }

    async fn list(&mut self, path: &str) -> Result<Vec<RemoteItem>, SourceError> {
        let dir = directory_path(path);
        let entries = self
            .operator()?
            .list(&dir)
            .await
            .map_err(|e| SourceError::List {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        self.base = base_prefix(&dir);
        Ok(entries
            .iter()
            .filter(|entry| !is_self_entry(&dir, entry.path()))
            .map(to_remote_item)
            .collect())
    }

    async fn change_directory(&mut self, path: &str) -> Result<(), SourceError> {
        let dir = directory_path(path);
        if dir != "/" {
            let metadata = self.operator()?.stat(&dir).await.map_err(|e| {
                SourceError::ChangeDirectory {
                    path: path.to_string(),
                    reason: e.to_string(),
                }
            })?;
            if !metadata.mode().is_dir() {
                return Err(SourceError::ChangeDirectory {
                    path: path.to_string(),
                    reason: "not a directory".into(),
                });
            }
        }
        self.base = base_prefix(&dir);
        Ok(())
    }

    async fn open_stream(&mut self, name: &str) -> Result<ByteStream, SourceError> {
        let path = object_path(&self.base, name);
        let buffer = self
            .operator()?
            .read(&path)
            .await
            .map_err(|e| SourceError::Fetch {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Box::pin(futures::io::Cursor::new(buffer.to_vec())))
    }

    async fn quit(&mut self) -> Result<(), SourceError> {
        if self.operator.take().is_some() {
            debug!(endpoint = %self.endpoint, "[FTP] Session closed");
        }
        Ok(())
    }
}

/// Normalise a user-supplied directory into an operator path: `/` for the root,
/// otherwise relative and `/`-terminated.
fn directory_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// `host:port`, with IPv6 literals bracketed.
fn socket_address(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

fn base_prefix(dir: &str) -> String {
    if dir == "/" {
        String::new()
    } else {
        dir.to_string()
    }
}

fn object_path(base: &str, name: &str) -> String {
    format!("{base}{name}")
}

/// Last path segment, without the trailing `/` directories carry.
fn entry_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

/// The listed directory reports itself among its children.
fn is_self_entry(dir: &str, path: &str) -> bool {
    path == dir || entry_name(path).is_empty()
}

fn remote_item(
    path: &str,
    mode: EntryMode,
    content_length: u64,
    modified_at: Option<DateTime<Utc>>,
) -> RemoteItem {
    let name = entry_name(path);
    let item = if mode.is_dir() {
        RemoteItem::directory(name)
    } else {
        RemoteItem::file(name, content_length)
    };
    match modified_at {
        Some(ts) => item.with_modified_at(ts),
        None => item,
    }
}

fn to_remote_item(entry: &Entry) -> RemoteItem {
    let metadata = entry.metadata();
    let modified_at = metadata
        .last_modified()
        .and_then(|ts| ts.to_string().parse::<DateTime<Utc>>().ok());
    remote_item(
        entry.path(),
        metadata.mode(),
        metadata.content_length(),
        modified_at,
    )
}
