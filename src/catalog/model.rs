/// A named top-level library grouping, e.g. "TV Shows"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub key: String,
    pub title: String,
}

/// A named, ordered collection of items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub key: String,
    pub title: String,
}

/// A subtitle track of a media part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleStream {
    pub language_code: String,
    pub codec: String,
    /// Download URL of a sidecar file; `None` for subtitles embedded in the container
    pub url: Option<String>,
}

impl SubtitleStream {
    pub fn is_embedded(&self) -> bool {
        self.url.is_none()
    }
}

/// One physical media file of an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPart {
    pub id: u64,
    /// File path as known to the server, mirrored below the destination root
    pub remote_file: String,
    /// Direct download of the original file
    pub download_url: String,
    /// Server-side transcode of this part, used when the direct download is refused
    pub stream_url: Option<String>,
    pub subtitles: Vec<SubtitleStream>,
}

/// What an item is; shows are containers, everything else carries parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Show,
    Episode { parts: Vec<MediaPart> },
    Movie { parts: Vec<MediaPart> },
    Other { parts: Vec<MediaPart> },
}

/// A catalog entry as seen by the traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub key: String,
    pub title: String,
    pub watch_count: u32,
    pub kind: MediaKind,
    pub art_url: Option<String>,
    pub thumb_url: Option<String>,
    /// Position of this item inside the playlist it was listed from
    pub playlist_item_id: Option<u64>,
}

impl MediaItem {
    /// Media parts of a leaf item; empty for shows
    pub fn parts(&self) -> &[MediaPart] {
        match &self.kind {
            MediaKind::Show => &[],
            MediaKind::Episode { parts }
            | MediaKind::Movie { parts }
            | MediaKind::Other { parts } => parts,
        }
    }

    pub fn is_show(&self) -> bool {
        matches!(self.kind, MediaKind::Show)
    }
}
