mod model;
mod plex;

use async_trait::async_trait;

use crate::error::CatalogError;

pub use model::{MediaItem, MediaKind, MediaPart, Playlist, Section, SubtitleStream};
pub use plex::PlexCatalog;

/// A remote media library the traversal reads from
///
/// Implementations hold their own connection and credentials. Lookups of
/// named things fail with [`CatalogError::NotFound`].
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve a library section by its exact name
    async fn section(&self, name: &str) -> Result<Section, CatalogError>;

    /// All top-level items of a section in catalog order
    async fn section_items(&self, section: &Section) -> Result<Vec<MediaItem>, CatalogError>;

    /// Resolve a top-level item of a section by its exact title
    async fn section_item(
        &self,
        section: &Section,
        title: &str,
    ) -> Result<MediaItem, CatalogError> {
        self.section_items(section)
            .await?
            .into_iter()
            .find(|item| item.title == title)
            .ok_or_else(|| CatalogError::NotFound {
                kind: "item",
                name: title.to_string(),
            })
    }

    /// Resolve a playlist by its exact name
    async fn playlist(&self, name: &str) -> Result<Playlist, CatalogError>;

    /// Items of a playlist in stored order
    async fn playlist_items(&self, playlist: &Playlist) -> Result<Vec<MediaItem>, CatalogError>;

    /// Episodes of a show in catalog order
    async fn episodes(&self, show: &MediaItem) -> Result<Vec<MediaItem>, CatalogError>;

    /// Fetch the current state of a leaf right before it is decided on,
    /// keeping its playlist entry
    async fn reload(&self, item: &MediaItem) -> Result<MediaItem, CatalogError>;

    /// Remove an item that was listed from `playlist`
    async fn remove_from_playlist(
        &self,
        playlist: &Playlist,
        item: &MediaItem,
    ) -> Result<(), CatalogError>;

    /// Record the item as watched on the server
    async fn mark_watched(&self, item: &MediaItem) -> Result<(), CatalogError>;
}
