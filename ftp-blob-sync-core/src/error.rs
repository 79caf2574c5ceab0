//! Error types shared by the engine and its collaborators.
//!
//! [`SyncError`] is reserved for failures that stop a run before any item is
//! processed. Per-item failures never surface as `SyncError`; they are recorded
//! as [`crate::report::ItemOutcome::Failed`] in the run report.

use thiserror::Error;

/// Failures reported by a [`crate::contract::RemoteSource`] or its session.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("session is not authenticated")]
    NotAuthenticated,

    #[error("cannot list {path}: {reason}")]
    List { path: String, reason: String },

    #[error("cannot change directory to {path}: {reason}")]
    ChangeDirectory { path: String, reason: String },

    #[error("cannot retrieve {name:?}: {reason}")]
    Fetch { name: String, reason: String },

    #[error("reading {name:?} failed: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures reported by a [`crate::contract::ObjectSink`].
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("invalid storage credentials: {0}")]
    Credentials(String),

    #[error("invalid storage endpoint: {0}")]
    Endpoint(String),

    #[error("storage request failed with status {status} ({})", .code.as_deref().unwrap_or("no error code"))]
    Status { status: u16, code: Option<String> },

    #[error("storage transport error: {0}")]
    Transport(String),
}

/// Precondition failures: the run could not start.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot connect to remote source: {0}")]
    Connect(#[source] SourceError),

    #[error("cannot authenticate to remote source: {0}")]
    Authenticate(#[source] SourceError),

    #[error("cannot list remote path {path}: {source}")]
    List {
        path: String,
        #[source]
        source: SourceError,
    },

    #[error("cannot ensure container {container}: {source}")]
    Container {
        container: String,
        #[source]
        source: SinkError,
    },
}
