//! Terminal progress for the `sync` command.
//!
//! When stdout is not a terminal indicatif hides the bar, so the same lines are
//! printed plainly instead.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use ftp_blob_sync_core::contract::RemoteItem;
use ftp_blob_sync_core::report::{Progress, SyncObserver};

const TEMPLATE: &str = "Downloading file {pos}/{len} {wide_msg}";

/// Draws `Downloading file i/n` on stdout while a run is in progress.
pub struct ProgressObserver {
    bar: Option<ProgressBar>,
    draw_to_stdout: bool,
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self {
            bar: None,
            draw_to_stdout: true,
        }
    }
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// An observer whose bar never draws; every line goes through `println!`.
    pub fn hidden() -> Self {
        Self {
            bar: None,
            draw_to_stdout: false,
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    fn draws(&self) -> bool {
        self.bar.as_ref().is_some_and(|bar| !bar.is_hidden())
    }
}

pub fn folder_line(item: &RemoteItem) -> String {
    format!("Item is a folder: {}", item.name)
}

pub fn item_line(progress: &Progress<'_>) -> String {
    format!(
        "Downloading file {}/{} {} ({})",
        progress.index, progress.total, progress.item.name, progress.outcome
    )
}

impl SyncObserver for ProgressObserver {
    fn listing_received(&mut self, total: usize) {
        let target = if self.draw_to_stdout {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(total as u64), target);
        let style = ProgressStyle::with_template(TEMPLATE).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Invalid progress template, using default bar");
            ProgressStyle::default_bar()
        });
        bar.set_style(style);
        self.bar = Some(bar);
    }

    fn directory_skipped(&mut self, index: usize, item: &RemoteItem) {
        let line = folder_line(item);
        match &self.bar {
            Some(bar) if !bar.is_hidden() => bar.println(line),
            _ => println!("{line}"),
        }
        if let Some(bar) = &self.bar {
            bar.set_position(index as u64);
        }
    }

    fn item_finished(&mut self, progress: &Progress<'_>) {
        if !self.draws() {
            println!("{}", item_line(progress));
        }
        if let Some(bar) = &self.bar {
            bar.set_position(progress.index as u64);
            bar.set_message(format!("{} ({})", progress.item.name, progress.outcome));
        }
    }
}
