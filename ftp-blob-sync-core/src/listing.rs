//! Listing filter: splits a raw remote listing into files to sync and directories
//! to skip. Traversal is a single level; directories are reported, never entered.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::contract::RemoteItem;

/// A remote listing in source order.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    entries: Vec<RemoteItem>,
}

/// How the engine treats a listed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classified<'a> {
    File(&'a RemoteItem),
    Directory(&'a RemoteItem),
}

impl Listing {
    /// Wrap a raw listing. `.` and `..` pseudo-entries are dropped; duplicate file
    /// names are kept but logged, since later occurrences overwrite earlier ones in
    /// the sink.
    pub fn new(items: Vec<RemoteItem>) -> Self {
        let entries: Vec<RemoteItem> = items
            .into_iter()
            .filter(|item| item.name != "." && item.name != "..")
            .collect();

        let mut seen = HashSet::new();
        for item in entries.iter().filter(|item| !item.is_directory()) {
            if !seen.insert(item.name.as_str()) {
                warn!(name = %item.name, "[SYNC][LISTING] Duplicate file name in listing");
            }
        }
        debug!(entries = entries.len(), "[SYNC][LISTING] Listing received");
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in source order, classified.
    pub fn iter(&self) -> impl Iterator<Item = Classified<'_>> {
        self.entries.iter().map(classify)
    }

    pub fn files(&self) -> impl Iterator<Item = &RemoteItem> {
        self.entries.iter().filter(|item| !item.is_directory())
    }

    pub fn directories(&self) -> impl Iterator<Item = &RemoteItem> {
        self.entries.iter().filter(|item| item.is_directory())
    }
}

pub fn classify(item: &RemoteItem) -> Classified<'_> {
    if item.is_directory() {
        Classified::Directory(item)
    } else {
        Classified::File(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names<'a>(items: impl Iterator<Item = &'a RemoteItem>) -> Vec<&'a str> {
        items.map(|item| item.name.as_str()).collect()
    }

    #[test]
    fn partitions_in_source_order() {
        let listing = Listing::new(vec![
            RemoteItem::file("z.csv", 10),
            RemoteItem::directory("archive"),
            RemoteItem::file("a.csv", 3),
            RemoteItem::directory("tmp"),
        ]);

        assert_eq!(listing.len(), 4);
        assert_eq!(names(listing.files()), vec!["z.csv", "a.csv"]);
        assert_eq!(names(listing.directories()), vec!["archive", "tmp"]);

        let kinds: Vec<bool> = listing
            .iter()
            .map(|c| matches!(c, Classified::Directory(_)))
            .collect();
        assert_eq!(kinds, vec![false, true, false, true]);
    }

    #[test]
    fn drops_dot_entries() {
        let listing = Listing::new(vec![
            RemoteItem::directory("."),
            RemoteItem::directory(".."),
            RemoteItem::file("report.txt", 1),
        ]);
        assert_eq!(listing.len(), 1);
        assert_eq!(names(listing.files()), vec!["report.txt"]);
    }

    #[test]
    fn empty_listing_is_empty() {
        let listing = Listing::new(Vec::new());
        assert!(listing.is_empty());
        assert_eq!(listing.iter().count(), 0);
    }
}
