#![doc = "ftp-blob-sync-core: core reconciliation logic for ftp-blob-sync."]

//! This crate contains the data model, collaborator contracts and the sync engine
//! that moves files from a listing-capable remote source into an object store.
//! Transport-specific sink clients live in the CLI crate; the FTP source adapter
//! lives here in [`ftp`].
//!
//! # Usage
//! Build a [`config::SyncConfig`], pick a [`contract::RemoteSource`] and a
//! [`contract::ObjectSink`], then call [`synchronise::synchronise`].

pub mod config;
pub mod contract;
pub mod error;
pub mod fingerprint;
pub mod ftp;
pub mod listing;
#[cfg(any(test, feature = "test-export-mocks"))]
pub mod memory;
pub mod report;
pub mod synchronise;
