pub mod catalog;
pub mod decision;
pub mod error;
pub mod fetch;
pub mod http;
pub mod progress;
pub mod sync;
pub mod throttle;
pub mod transfer;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use catalog::{
    Catalog, MediaItem, MediaKind, MediaPart, PlexCatalog, Playlist, Section, SubtitleStream,
};
pub use decision::{Decision, DecisionFlags};
pub use error::{CatalogError, SyncError, TransferError, TransportError};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use sync::{Selection, SyncOptions, SyncResult, sync_catalog};
pub use throttle::{SharedThrottle, Throttle};
pub use transfer::{TransferEngine, TransferOutcome, TransferTarget};
