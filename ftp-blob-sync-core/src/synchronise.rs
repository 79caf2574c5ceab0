//! High-level pipeline: list → fetch → fingerprint → lookup → decide → write.
//!
//! This module owns the reconciliation logic that moves every file of one remote
//! directory into an object store container, uploading only what is new or changed.
//!
//! # Major Types
//! - [`SinkObjectState`] and [`Decision`]: the input and output of [`decide`]
//! - [`crate::report::SyncReport`]: the run summary returned by [`synchronise`]
//!
//! # Responsibilities
//! - Open one remote session per run and release it on every exit path
//! - Treat connection, authentication, listing and container failures as fatal
//!   preconditions ([`SyncError`]), never as an empty listing
//! - Isolate per-item failures: a failed fetch, lookup or write is recorded in the
//!   report and the run moves on to the next item
//! - Process items strictly one at a time, in listing order, checking for
//!   cancellation between items
//!
//! # Consistency
//! Nothing is locked between the lookup and the write of an item. A concurrent
//! writer to the same object in that window is overwritten (last writer wins).
//!
//! # Navigation
//! - Main entrypoint: [`synchronise`]
//! - Per-item pipeline: [`sync_item`], built from [`fetch`], [`lookup`], [`decide`]

use futures::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{RemoteConfig, SyncConfig};
use crate::contract::{
    ContainerStatus, FetchedPayload, ObjectSink, RemoteItem, RemoteSession, RemoteSource,
};
use crate::error::{SinkError, SourceError, SyncError};
use crate::fingerprint::ContentFingerprint;
use crate::listing::{Classified, Listing};
use crate::report::{FailureStage, ItemOutcome, Progress, SkipReason, SyncObserver, SyncReport};

/// Upper bound for the read buffer pre-allocation taken from a listed size.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// What the sink currently holds under an item's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkObjectState {
    pub exists: bool,
    /// `None` when the object is missing or the store reported no usable fingerprint.
    pub stored_fingerprint: Option<ContentFingerprint>,
}

impl SinkObjectState {
    pub fn missing() -> Self {
        Self {
            exists: false,
            stored_fingerprint: None,
        }
    }

    pub fn present(stored_fingerprint: Option<ContentFingerprint>) -> Self {
        Self {
            exists: true,
            stored_fingerprint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Create,
    Replace,
    Skip(SkipReason),
}

/// The reconciliation table.
///
/// An existing object without a usable stored fingerprint is treated as stale and
/// replaced.
pub fn decide(state: &SinkObjectState, computed: &ContentFingerprint) -> Decision {
    if !state.exists {
        return Decision::Create;
    }
    match state.stored_fingerprint {
        Some(stored) if stored == *computed => Decision::Skip(SkipReason::Unchanged),
        Some(_) | None => Decision::Replace,
    }
}

/// Run one synchronisation of `config.remote.path` into `config.sink.container`.
///
/// Returns `Err` only when the run could not start. A run that started always
/// returns `Ok`, with per-item failures listed in the report.
pub async fn synchronise<S, K, O>(
    config: &SyncConfig,
    source: &S,
    sink: &K,
    observer: &mut O,
    cancel: &CancellationToken,
) -> Result<SyncReport, SyncError>
where
    S: RemoteSource + ?Sized,
    K: ObjectSink + ?Sized,
    O: SyncObserver + ?Sized,
{
    info!(
        host = %config.remote.host,
        path = %config.remote.path,
        container = %config.sink.container,
        "[SYNC] Starting synchronisation run"
    );
    config.validate()?;

    let mut session = open_session(&config.remote, source).await?;
    let result = run_session(config, session.as_mut(), sink, observer, cancel).await;
    release_session(session.as_mut()).await;

    match &result {
        Ok(report) => {
            info!(
                entries_seen = report.entries_seen,
                created = report.created,
                replaced = report.replaced,
                skipped = report.skipped,
                failed = report.failed,
                cancelled = report.cancelled,
                "[SYNC] Synchronisation finished"
            );
            match serde_json::to_string(report) {
                Ok(json) => debug!(report = %json, "[SYNC][DEBUG] Report as JSON"),
                Err(e) => debug!(error = ?e, "[SYNC][DEBUG] Failed to serialise report"),
            }
        }
        Err(e) => error!(error = %e, "[SYNC][ERROR] Synchronisation could not start"),
    }
    result
}

async fn open_session<S>(
    remote: &RemoteConfig,
    source: &S,
) -> Result<Box<dyn RemoteSession>, SyncError>
where
    S: RemoteSource + ?Sized,
{
    info!(host = %remote.host, port = remote.port, "[SYNC] Connecting to remote source");
    let mut session = source
        .connect(&remote.host, remote.port, remote.connect_timeout())
        .await
        .map_err(SyncError::Connect)?;

    if let Err(e) = session
        .authenticate(&remote.username, &remote.password)
        .await
    {
        release_session(session.as_mut()).await;
        return Err(SyncError::Authenticate(e));
    }
    info!(username = %remote.username, "[SYNC] Authenticated to remote source");
    Ok(session)
}

async fn release_session(session: &mut dyn RemoteSession) {
    match session.quit().await {
        Ok(()) => debug!("[SYNC] Remote session released"),
        Err(e) => warn!(error = %e, "[SYNC] Releasing remote session failed"),
    }
}

async fn run_session<K, O>(
    config: &SyncConfig,
    session: &mut dyn RemoteSession,
    sink: &K,
    observer: &mut O,
    cancel: &CancellationToken,
) -> Result<SyncReport, SyncError>
where
    K: ObjectSink + ?Sized,
    O: SyncObserver + ?Sized,
{
    let path = &config.remote.path;
    let items = session
        .list(path)
        .await
        .map_err(|source| SyncError::List {
            path: path.clone(),
            source,
        })?;
    info!(path = %path, entries = items.len(), "[SYNC] Listed remote directory");

    if let Err(e) = session.change_directory(path).await {
        warn!(path = %path, error = %e, "[SYNC] Could not change remote directory, continuing");
    }

    let container = &config.sink.container;
    match sink.ensure_container(container).await {
        Ok(ContainerStatus::Created) => {
            info!(container = %container, "[SYNC] Successfully created container")
        }
        Ok(ContainerStatus::AlreadyExists) => {
            info!(container = %container, "[SYNC] Container already exists")
        }
        Err(source) => {
            return Err(SyncError::Container {
                container: container.clone(),
                source,
            })
        }
    }

    let listing = Listing::new(items);
    info!(
        files = listing.files().count(),
        directories = listing.directories().count(),
        "[SYNC] Classified listing"
    );
    Ok(sync_listing(&listing, session, sink, container, observer, cancel).await)
}

/// Process every entry of `listing` in order. Never fails: per-item errors end up
/// in the report.
pub async fn sync_listing<K, O>(
    listing: &Listing,
    session: &mut dyn RemoteSession,
    sink: &K,
    container: &str,
    observer: &mut O,
    cancel: &CancellationToken,
) -> SyncReport
where
    K: ObjectSink + ?Sized,
    O: SyncObserver + ?Sized,
{
    let total = listing.len();
    observer.listing_received(total);
    let mut report = SyncReport::default();

    for (position, entry) in listing.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(
                processed = report.entries_seen,
                total, "[SYNC] Cancellation requested, stopping before next item"
            );
            report.cancelled = true;
            break;
        }
        let index = position + 1;

        let item = match entry {
            Classified::Directory(dir) => {
                info!(name = %dir.name, "[SYNC] Item is a folder, not descending");
                report.record_directory();
                observer.directory_skipped(index, dir);
                continue;
            }
            Classified::File(item) => item,
        };

        let outcome = sync_item(session, sink, container, item).await;
        log_outcome(item, &outcome);
        observer.item_finished(&Progress {
            index,
            total,
            item,
            outcome: &outcome,
        });
        report.record(item.name.clone(), outcome);
    }

    report
}

fn log_outcome(item: &RemoteItem, outcome: &ItemOutcome) {
    match outcome {
        ItemOutcome::Created => info!(name = %item.name, "[SYNC][WRITE] Uploaded new file"),
        ItemOutcome::Replaced => {
            info!(name = %item.name, "[SYNC][WRITE] File changed, replaced stored object")
        }
        ItemOutcome::Skipped { .. } => {
            info!(name = %item.name, "[SYNC] File already in storage, unchanged")
        }
        ItemOutcome::Failed { stage, cause } => {
            error!(name = %item.name, %stage, cause = %cause, "[SYNC][ERROR] Item failed")
        }
    }
}

/// Fetch, fingerprint, look up, decide and (if needed) write one file item.
pub async fn sync_item<K>(
    session: &mut dyn RemoteSession,
    sink: &K,
    container: &str,
    item: &RemoteItem,
) -> ItemOutcome
where
    K: ObjectSink + ?Sized,
{
    let payload = match fetch(session, item).await {
        Ok(payload) => payload,
        Err(e) => return ItemOutcome::failed(FailureStage::Fetch, e),
    };
    let fingerprint = ContentFingerprint::of(&payload.bytes);
    debug!(name = %item.name, bytes = payload.bytes.len(), %fingerprint, "[SYNC][FETCH] Fetched file");

    let state = match lookup(sink, container, &item.name).await {
        Ok(state) => state,
        Err(e) => return ItemOutcome::failed(FailureStage::Lookup, e),
    };

    let decision = decide(&state, &fingerprint);
    debug!(name = %item.name, ?state, ?decision, "[SYNC] Decided");
    match decision {
        Decision::Skip(reason) => ItemOutcome::Skipped { reason },
        Decision::Create | Decision::Replace => {
            match sink.put_object(container, &item.name, payload.bytes).await {
                Ok(()) if decision == Decision::Create => ItemOutcome::Created,
                Ok(()) => ItemOutcome::Replaced,
                Err(e) => ItemOutcome::failed(FailureStage::Write, e),
            }
        }
    }
}

/// Read one file fully into memory. The stream is dropped before returning,
/// whether the read completed or not.
pub async fn fetch(
    session: &mut dyn RemoteSession,
    item: &RemoteItem,
) -> Result<FetchedPayload, SourceError> {
    if item.name.is_empty() {
        return Err(SourceError::Fetch {
            name: String::new(),
            reason: "item name is empty".into(),
        });
    }

    let mut stream = session.open_stream(&item.name).await?;
    let mut bytes = Vec::with_capacity(item.size_bytes.min(MAX_PREALLOCATION) as usize);
    let read = stream.read_to_end(&mut bytes).await;
    drop(stream);

    read.map_err(|source| SourceError::Read {
        name: item.name.clone(),
        source,
    })?;
    Ok(FetchedPayload {
        item: item.clone(),
        bytes,
    })
}

/// Query the sink for `name`. Not found is a state, not an error.
pub async fn lookup<K>(sink: &K, container: &str, name: &str) -> Result<SinkObjectState, SinkError>
where
    K: ObjectSink + ?Sized,
{
    let Some(metadata) = sink.get_object_metadata(container, name).await? else {
        return Ok(SinkObjectState::missing());
    };
    let stored = metadata
        .content_md5
        .as_deref()
        .and_then(ContentFingerprint::parse);
    if stored.is_none() {
        warn!(
            name = %name,
            reported = ?metadata.content_md5,
            "[SYNC][LOOKUP] Stored object has no usable fingerprint"
        );
    }
    Ok(SinkObjectState::present(stored))
}
