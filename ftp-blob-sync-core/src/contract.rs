//! # contract: collaborator interfaces for the sync engine
//!
//! The engine talks to exactly two external systems:
//!
//! - a [`RemoteSource`], which hands out a stateful [`RemoteSession`] able to list a
//!   directory and stream individual files, and
//! - an [`ObjectSink`], a name-addressed object store that reports a stored content
//!   fingerprint and accepts unconditional overwrites.
//!
//! ## Mocking & Testing
//! - All traits are annotated for `mockall` (behind `test-export-mocks`) so consumers
//!   can generate deterministic mocks.
//! - [`crate::memory`] provides in-memory implementations for scenario tests.
//!
//! ## Adding New Backends
//! - Implement [`RemoteSource`] + [`RemoteSession`] for a new listing source, or
//!   [`ObjectSink`] for a new store.
//! - Map "not found" on metadata lookups to `Ok(None)`; every other failure is an error.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::io::AsyncRead;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{SinkError, SourceError};

/// Owned byte stream for a single remote file. Dropping it releases the
/// underlying transfer.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Kind of a listed remote entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Directory,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub name: String,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub kind: ItemKind,
}

impl RemoteItem {
    pub fn file(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            modified_at: None,
            kind: ItemKind::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_bytes: 0,
            modified_at: None,
            kind: ItemKind::Directory,
        }
    }

    pub fn with_modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }

    pub fn is_directory(&self) -> bool {
        self.kind == ItemKind::Directory
    }
}

/// A file's bytes, fully read into memory.
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    pub item: RemoteItem,
    pub bytes: Vec<u8>,
}

/// Metadata the sink reports for an existing object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Stored content MD5 exactly as the store reports it (hex or base64), if any.
    pub content_md5: Option<String>,
    pub content_length: Option<u64>,
}

/// Result of an idempotent container provisioning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    AlreadyExists,
}

/// Factory for remote sessions (e.g. an FTP server).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Open an unauthenticated session to `host:port`, giving up after `timeout`.
    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, SourceError>;
}

/// A single stateful connection to the remote source.
///
/// Every method takes `&mut self`: only one operation, and in particular only one
/// open transfer, can be in flight on a session at a time.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteSession: Send {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), SourceError>;

    /// List one level of `path` in the order the server returns it.
    async fn list(&mut self, path: &str) -> Result<Vec<RemoteItem>, SourceError>;

    /// Make `path` the directory item names are resolved against.
    async fn change_directory(&mut self, path: &str) -> Result<(), SourceError>;

    async fn open_stream(&mut self, name: &str) -> Result<ByteStream, SourceError>;

    /// Release the session. Called once at the end of every run.
    async fn quit(&mut self) -> Result<(), SourceError>;
}

/// Name-addressed object store.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectSink: Send + Sync {
    /// Create `container` if missing. An existing container is a success.
    async fn ensure_container(&self, container: &str) -> Result<ContainerStatus, SinkError>;

    /// Look up an object. `Ok(None)` means the object does not exist.
    async fn get_object_metadata(
        &self,
        container: &str,
        object: &str,
    ) -> Result<Option<ObjectMetadata>, SinkError>;

    /// Create or overwrite `object` with `bytes`.
    async fn put_object(
        &self,
        container: &str,
        object: &str,
        bytes: Vec<u8>,
    ) -> Result<(), SinkError>;
}
