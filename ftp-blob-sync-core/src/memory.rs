//! In-memory remote source and object sink for tests.
//!
//! Both record every call so tests can assert on what the engine did, not only on
//! the report it returned. The sink stores fingerprints base64-encoded, the way
//! Azure reports `Content-MD5`.

use std::collections::{HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::io::AsyncRead;

use crate::contract::{
    ByteStream, ContainerStatus, ObjectMetadata, ObjectSink, RemoteItem, RemoteSession,
    RemoteSource,
};
use crate::error::{SinkError, SourceError};
use crate::fingerprint::ContentFingerprint;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Calls a [`MemorySource`] session received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    Connect,
    Authenticate(String),
    List(String),
    ChangeDirectory(String),
    OpenStream(String),
    Quit,
}

#[derive(Debug, Default)]
struct SourceState {
    entries: Vec<RemoteItem>,
    contents: HashMap<String, Vec<u8>>,
    failing_fetches: HashSet<String>,
    truncated_reads: HashSet<String>,
    password: Option<String>,
    unreachable: bool,
    list_error: Option<String>,
    calls: Vec<SourceCall>,
}

/// A directory listing served from memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    state: Arc<Mutex<SourceState>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, name: &str, bytes: &[u8]) -> Self {
        {
            let mut state = lock(&self.state);
            state
                .entries
                .push(RemoteItem::file(name, bytes.len() as u64));
            state.contents.insert(name.to_string(), bytes.to_vec());
        }
        self
    }

    pub fn with_directory(self, name: &str) -> Self {
        lock(&self.state).entries.push(RemoteItem::directory(name));
        self
    }

    /// `open_stream` for `name` fails.
    pub fn with_fetch_failure(self, name: &str) -> Self {
        lock(&self.state).failing_fetches.insert(name.to_string());
        self
    }

    /// The stream for `name` yields the first half of its content, then a
    /// connection reset.
    pub fn with_truncated_read(self, name: &str) -> Self {
        lock(&self.state).truncated_reads.insert(name.to_string());
        self
    }

    /// Only this password is accepted by `authenticate`.
    pub fn with_password(self, password: &str) -> Self {
        lock(&self.state).password = Some(password.to_string());
        self
    }

    pub fn unreachable(self) -> Self {
        lock(&self.state).unreachable = true;
        self
    }

    pub fn with_list_error(self, reason: &str) -> Self {
        lock(&self.state).list_error = Some(reason.to_string());
        self
    }

    /// Replace the content of an existing file.
    pub fn set_content(&self, name: &str, bytes: &[u8]) {
        let mut state = lock(&self.state);
        state.contents.insert(name.to_string(), bytes.to_vec());
        if let Some(item) = state.entries.iter_mut().find(|item| item.name == name) {
            item.size_bytes = bytes.len() as u64;
        }
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        lock(&self.state).calls.clone()
    }

    pub fn opened_streams(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SourceCall::OpenStream(name) => Some(name),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RemoteSource for MemorySource {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        _timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, SourceError> {
        let mut state = lock(&self.state);
        state.calls.push(SourceCall::Connect);
        if state.unreachable {
            return Err(SourceError::Connect {
                address: format!("{host}:{port}"),
                reason: "connection refused".into(),
            });
        }
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<SourceState>>,
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), SourceError> {
        let mut state = lock(&self.state);
        state
            .calls
            .push(SourceCall::Authenticate(username.to_string()));
        match &state.password {
            Some(expected) if expected != password => {
                Err(SourceError::Auth("530 Login incorrect".into()))
            }
            _ => Ok(()),
        }
    }

    async fn list(&mut self, path: &str) -> Result<Vec<RemoteItem>, SourceError> {
        let mut state = lock(&self.state);
        state.calls.push(SourceCall::List(path.to_string()));
        if let Some(reason) = &state.list_error {
            return Err(SourceError::List {
                path: path.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(state.entries.clone())
    }

    async fn change_directory(&mut self, path: &str) -> Result<(), SourceError> {
        lock(&self.state)
            .calls
            .push(SourceCall::ChangeDirectory(path.to_string()));
        Ok(())
    }

    async fn open_stream(&mut self, name: &str) -> Result<ByteStream, SourceError> {
        let mut state = lock(&self.state);
        state.calls.push(SourceCall::OpenStream(name.to_string()));
        if state.failing_fetches.contains(name) {
            return Err(SourceError::Fetch {
                name: name.to_string(),
                reason: "550 Failed to open file".into(),
            });
        }
        let bytes = state
            .contents
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::Fetch {
                name: name.to_string(),
                reason: "550 No such file".into(),
            })?;
        if state.truncated_reads.contains(name) {
            let half = bytes.len() / 2;
            return Ok(Box::pin(TruncatedStream {
                pending: bytes[..half].to_vec(),
            }));
        }
        Ok(Box::pin(futures::io::Cursor::new(bytes)))
    }

    async fn quit(&mut self) -> Result<(), SourceError> {
        lock(&self.state).calls.push(SourceCall::Quit);
        Ok(())
    }
}

/// Hands out `pending`, then fails the way an aborted data connection does.
struct TruncatedStream {
    pending: Vec<u8>,
}

impl AsyncRead for TruncatedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        if self.pending.is_empty() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "426 transfer aborted",
            )));
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Poll::Ready(Ok(n))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_md5: Option<String>,
}

#[derive(Debug, Default)]
struct SinkState {
    containers: HashSet<String>,
    objects: HashMap<(String, String), StoredObject>,
    failing_lookups: HashSet<String>,
    failing_writes: HashSet<String>,
    container_error: Option<u16>,
    puts: Vec<String>,
    lookups: Vec<String>,
}

/// An object store held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<SinkState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` with their correct fingerprint.
    pub fn with_object(self, container: &str, name: &str, bytes: &[u8]) -> Self {
        let md5 = ContentFingerprint::of(bytes).to_base64();
        self.with_raw_object(container, name, bytes, Some(&md5))
    }

    /// Store `bytes` with an arbitrary (or absent) reported fingerprint.
    pub fn with_raw_object(
        self,
        container: &str,
        name: &str,
        bytes: &[u8],
        content_md5: Option<&str>,
    ) -> Self {
        {
            let mut state = lock(&self.state);
            state.containers.insert(container.to_string());
            state.objects.insert(
                (container.to_string(), name.to_string()),
                StoredObject {
                    bytes: bytes.to_vec(),
                    content_md5: content_md5.map(str::to_string),
                },
            );
        }
        self
    }

    pub fn with_lookup_failure(self, name: &str) -> Self {
        lock(&self.state).failing_lookups.insert(name.to_string());
        self
    }

    pub fn with_write_failure(self, name: &str) -> Self {
        lock(&self.state).failing_writes.insert(name.to_string());
        self
    }

    /// `ensure_container` fails with this HTTP status.
    pub fn with_container_error(self, status: u16) -> Self {
        lock(&self.state).container_error = Some(status);
        self
    }

    pub fn object(&self, container: &str, name: &str) -> Option<StoredObject> {
        lock(&self.state)
            .objects
            .get(&(container.to_string(), name.to_string()))
            .cloned()
    }

    pub fn has_container(&self, container: &str) -> bool {
        lock(&self.state).containers.contains(container)
    }

    /// Object names written, in order.
    pub fn puts(&self) -> Vec<String> {
        lock(&self.state).puts.clone()
    }

    /// Object names looked up, in order.
    pub fn lookups(&self) -> Vec<String> {
        lock(&self.state).lookups.clone()
    }
}

#[async_trait]
impl ObjectSink for MemorySink {
    async fn ensure_container(&self, container: &str) -> Result<ContainerStatus, SinkError> {
        let mut state = lock(&self.state);
        if let Some(status) = state.container_error {
            return Err(SinkError::Status {
                status,
                code: Some("AuthenticationFailed".into()),
            });
        }
        if state.containers.insert(container.to_string()) {
            Ok(ContainerStatus::Created)
        } else {
            Ok(ContainerStatus::AlreadyExists)
        }
    }

    async fn get_object_metadata(
        &self,
        container: &str,
        object: &str,
    ) -> Result<Option<ObjectMetadata>, SinkError> {
        let mut state = lock(&self.state);
        state.lookups.push(object.to_string());
        if state.failing_lookups.contains(object) {
            return Err(SinkError::Status {
                status: 500,
                code: Some("InternalError".into()),
            });
        }
        Ok(state
            .objects
            .get(&(container.to_string(), object.to_string()))
            .map(|stored| ObjectMetadata {
                content_md5: stored.content_md5.clone(),
                content_length: Some(stored.bytes.len() as u64),
            }))
    }

    async fn put_object(
        &self,
        container: &str,
        object: &str,
        bytes: Vec<u8>,
    ) -> Result<(), SinkError> {
        let mut state = lock(&self.state);
        state.puts.push(object.to_string());
        if state.failing_writes.contains(object) {
            return Err(SinkError::Transport("connection reset by peer".into()));
        }
        let content_md5 = Some(ContentFingerprint::of(&bytes).to_base64());
        state.objects.insert(
            (container.to_string(), object.to_string()),
            StoredObject { bytes, content_md5 },
        );
        Ok(())
    }
}
