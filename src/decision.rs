/// User flags that influence whether an item is fetched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionFlags {
    /// Fetch media even if it was already watched
    pub force: bool,
    /// Fetch subtitles and artwork together with the media
    pub assets: bool,
    /// Fetch subtitles and artwork for watched items without the media
    pub refresh_assets: bool,
}

/// What to do with a single leaf item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Fetch the media parts, and assets when `with_assets` is set
    FetchAll { with_assets: bool },
    /// Only fetch subtitles and artwork
    AssetsOnly,
    /// Nothing to do, the item was already seen
    Skip,
}

impl Decision {
    /// Decide based on the watch count observed when the item was listed
    ///
    /// A watched item is never fetched again unless forced, so running the
    /// same traversal twice downloads nothing the second time.
    pub fn for_item(watch_count: u32, flags: DecisionFlags) -> Self {
        if watch_count == 0 || flags.force {
            Self::FetchAll {
                with_assets: flags.assets,
            }
        } else if flags.refresh_assets {
            Self::AssetsOnly
        } else {
            Self::Skip
        }
    }

    /// Whether the media parts themselves are transferred
    pub fn fetches_media(&self) -> bool {
        matches!(self, Self::FetchAll { .. })
    }

    /// Whether subtitles and artwork are transferred
    pub fn fetches_assets(&self) -> bool {
        matches!(
            self,
            Self::FetchAll { with_assets: true } | Self::AssetsOnly
        )
    }
}
