use tracing::{info, warn};

use crate::errors::Error;

/// What happened to one dispatched upload task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// The file was transferred; payload is its size in bytes.
    Uploaded(u64),
    /// The file already existed at the exact target path.
    Skipped,
}

/// Aggregated outcome of an upload run. Each task reports a typed result;
/// the walker folds them here instead of logging and forgetting, so the
/// final report can distinguish "all succeeded" from "some failed".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferSummary {
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Subtrees abandoned because their remote folder could not be created
    /// or their local directory could not be read.
    pub dirs_skipped: usize,
    pub bytes: u64,
}

impl TransferSummary {
    pub fn record(&mut self, outcome: &Result<UploadStatus, Error>) {
        match outcome {
            Ok(UploadStatus::Uploaded(size)) => {
                self.uploaded += 1;
                self.bytes += size;
            }
            Ok(UploadStatus::Skipped) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }

    /// Merge a child directory's summary into this one.
    pub fn absorb(&mut self, other: TransferSummary) {
        self.uploaded += other.uploaded;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.dirs_skipped += other.dirs_skipped;
        self.bytes += other.bytes;
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.dirs_skipped == 0
    }

    pub fn report(&self) {
        info!(
            "Upload finished: {} uploaded ({}), {} skipped, {} failed",
            self.uploaded,
            format_bytes(self.bytes),
            self.skipped,
            self.failed
        );
        if !self.is_clean() {
            warn!(
                "{} file(s) and {} folder subtree(s) were not transferred",
                self.failed, self.dirs_skipped
            );
        }
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.1} TiB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GiB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MiB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KiB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
