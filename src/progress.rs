use std::sync::Arc;

/// Events emitted while walking the catalog and transferring files
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A section or playlist has been resolved
    TraversalStarting { source: String },

    /// A transfer is starting
    TransferStarting {
        title: String,
        file_name: String,
        /// Bytes already present in the working file
        resume_offset: u64,
        /// Expected final size in bytes, if known
        total_bytes: Option<u64>,
    },

    /// Transfer progress update
    TransferProgress {
        title: String,
        bytes_transferred: u64,
        total_bytes: Option<u64>,
    },

    /// A transfer was committed to its final name
    TransferCompleted {
        title: String,
        file_name: String,
        bytes_transferred: u64,
    },

    /// A transfer failed
    TransferFailed {
        title: String,
        file_name: String,
        error: String,
    },

    /// An item was skipped by the download decision
    ItemSkipped { title: String, reason: String },

    /// Traversal completed
    SyncCompleted {
        downloaded_count: usize,
        assets_only_count: usize,
        skipped_count: usize,
        failed_count: usize,
    },
}

/// Trait for reporting progress events during synchronization.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or when progress display is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
