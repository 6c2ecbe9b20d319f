//! Shared test doubles for the HTTP and catalog seams.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::catalog::{Catalog, MediaItem, MediaKind, MediaPart, Playlist, Section, SubtitleStream};
use crate::error::{CatalogError, TransportError};
use crate::http::{ByteStream, HttpClient, HttpResponse};

/// How the mock server answers for one URL
#[derive(Clone)]
pub enum Resource {
    /// Serve `data`, honoring byte ranges when `ranges` is set
    Content { data: Vec<u8>, ranges: bool },
    /// Reply with a bare status code
    Status(u16),
    /// Send the headers, then never deliver a byte
    Stall,
    /// Deliver `after` bytes, then drop the connection
    Reset { data: Vec<u8>, after: usize },
    /// Serve `data` with a pause before every chunk
    Slow { data: Vec<u8>, delay: Duration },
}

/// In-memory HTTP server recording every request
#[derive(Default)]
pub struct MockServer {
    resources: HashMap<String, Resource>,
    chunk_size: usize,
    requests: Mutex<Vec<(String, u64)>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self {
            chunk_size: 4096,
            ..Default::default()
        }
    }

    pub fn with(mut self, url: &str, resource: Resource) -> Self {
        self.resources.insert(url.to_string(), resource);
        self
    }

    pub fn serve(self, url: &str, data: &[u8]) -> Self {
        self.with(
            url,
            Resource::Content {
                data: data.to_vec(),
                ranges: true,
            },
        )
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Every request as `(url, range start)`, in order
    pub fn requests(&self) -> Vec<(String, u64)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, url: &str) -> Vec<u64> {
        self.requests()
            .into_iter()
            .filter(|(u, _)| u == url)
            .map(|(_, offset)| offset)
            .collect()
    }

    fn chunked(&self, data: &[u8]) -> ByteStream {
        let chunks: Vec<Result<Bytes, TransportError>> = data
            .chunks(self.chunk_size.max(1))
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Box::pin(futures::stream::iter(chunks))
    }
}

fn response(status: u16, content_length: Option<u64>, body: ByteStream) -> HttpResponse {
    HttpResponse {
        status,
        content_length,
        body,
    }
}

fn empty() -> ByteStream {
    Box::pin(futures::stream::empty())
}

#[async_trait]
impl HttpClient for MockServer {
    async fn get_stream(&self, url: &str, offset: u64) -> Result<HttpResponse, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), offset));

        let Some(resource) = self.resources.get(url).cloned() else {
            return Ok(response(404, Some(0), empty()));
        };

        Ok(match resource {
            Resource::Content { data, ranges } => {
                let start = offset as usize;
                if ranges && offset > 0 && start >= data.len() {
                    response(416, Some(0), empty())
                } else if ranges && offset > 0 {
                    let rest = &data[start..];
                    response(206, Some(rest.len() as u64), self.chunked(rest))
                } else {
                    response(200, Some(data.len() as u64), self.chunked(&data))
                }
            }
            Resource::Status(status) => response(status, Some(0), empty()),
            Resource::Stall => response(200, None, Box::pin(futures::stream::pending())),
            Resource::Reset { data, after } => {
                let mut items: Vec<Result<Bytes, TransportError>> =
                    vec![Ok(Bytes::copy_from_slice(&data[..after]))];
                items.push(Err(TransportError::Interrupted(
                    "connection reset by peer".to_string(),
                )));
                let body = Box::pin(futures::stream::iter(items));
                response(200, Some(data.len() as u64), body)
            }
            Resource::Slow { data, delay } => {
                let len = data.len() as u64;
                let body = self.chunked(&data).then(move |chunk| async move {
                    tokio::time::sleep(delay).await;
                    chunk
                });
                response(200, Some(len), Box::pin(body))
            }
        })
    }
}

/// In-memory catalog tracking watch state, playlist removals and marks
#[derive(Default)]
pub struct MemoryCatalog {
    sections: HashMap<String, Vec<MediaItem>>,
    episodes: HashMap<String, Vec<MediaItem>>,
    playlists: HashMap<String, Vec<MediaItem>>,
    unreachable: HashSet<String>,
    watched: Mutex<HashSet<String>>,
    marked: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(mut self, name: &str, items: Vec<MediaItem>) -> Self {
        self.sections.insert(name.to_string(), items);
        self
    }

    pub fn show(mut self, show_key: &str, episodes: Vec<MediaItem>) -> Self {
        self.episodes.insert(show_key.to_string(), episodes);
        self
    }

    pub fn playlist(mut self, name: &str, items: Vec<MediaItem>) -> Self {
        self.playlists.insert(name.to_string(), items);
        self
    }

    /// Make reloading `key` fail
    pub fn unreachable(mut self, key: &str) -> Self {
        self.unreachable.insert(key.to_string());
        self
    }

    /// Keys passed to `mark_watched`, in order
    pub fn marked(&self) -> Vec<String> {
        self.marked.lock().unwrap().clone()
    }

    /// Keys removed from playlists, in order
    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    fn current(&self, items: &[MediaItem]) -> Vec<MediaItem> {
        let watched = self.watched.lock().unwrap();
        items
            .iter()
            .cloned()
            .map(|mut item| {
                if watched.contains(&item.key) {
                    item.watch_count += 1;
                }
                item
            })
            .collect()
    }
}

fn not_found(kind: &'static str, name: &str) -> CatalogError {
    CatalogError::NotFound {
        kind,
        name: name.to_string(),
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn section(&self, name: &str) -> Result<Section, CatalogError> {
        self.sections
            .contains_key(name)
            .then(|| Section {
                key: name.to_string(),
                title: name.to_string(),
            })
            .ok_or_else(|| not_found("section", name))
    }

    async fn section_items(&self, section: &Section) -> Result<Vec<MediaItem>, CatalogError> {
        let items = self
            .sections
            .get(&section.key)
            .ok_or_else(|| not_found("section", &section.key))?;
        Ok(self.current(items))
    }

    async fn playlist(&self, name: &str) -> Result<Playlist, CatalogError> {
        self.playlists
            .contains_key(name)
            .then(|| Playlist {
                key: name.to_string(),
                title: name.to_string(),
            })
            .ok_or_else(|| not_found("playlist", name))
    }

    async fn playlist_items(&self, playlist: &Playlist) -> Result<Vec<MediaItem>, CatalogError> {
        let items = self
            .playlists
            .get(&playlist.key)
            .ok_or_else(|| not_found("playlist", &playlist.key))?;
        Ok(self.current(items))
    }

    async fn episodes(&self, show: &MediaItem) -> Result<Vec<MediaItem>, CatalogError> {
        let items = self
            .episodes
            .get(&show.key)
            .ok_or_else(|| not_found("show", &show.title))?;
        Ok(self.current(items))
    }

    async fn reload(&self, item: &MediaItem) -> Result<MediaItem, CatalogError> {
        if self.unreachable.contains(&item.key) {
            return Err(CatalogError::HttpStatus {
                url: format!("http://plex/library/metadata/{}", item.key),
                status: 500,
            });
        }

        let mut fresh = item.clone();
        if self.watched.lock().unwrap().contains(&item.key) {
            fresh.watch_count = fresh.watch_count.max(1);
        }
        Ok(fresh)
    }

    async fn remove_from_playlist(
        &self,
        _playlist: &Playlist,
        item: &MediaItem,
    ) -> Result<(), CatalogError> {
        self.removed.lock().unwrap().push(item.key.clone());
        Ok(())
    }

    async fn mark_watched(&self, item: &MediaItem) -> Result<(), CatalogError> {
        self.watched.lock().unwrap().insert(item.key.clone());
        self.marked.lock().unwrap().push(item.key.clone());
        Ok(())
    }
}

/// A leaf item with one part whose URLs derive from `key`
///
/// Download: `http://plex/parts/{key}`, stream: `http://plex/stream/{key}`,
/// subtitle: `http://plex/subs/{key}`, art/thumb: `http://plex/art/{key}`
/// and `http://plex/thumb/{key}`.
pub fn leaf(
    kind: &str,
    key: &str,
    title: &str,
    watch_count: u32,
    remote_file: &str,
) -> MediaItem {
    let parts = vec![MediaPart {
        id: key.parse().unwrap_or(0),
        remote_file: remote_file.to_string(),
        download_url: format!("http://plex/parts/{key}"),
        stream_url: Some(format!("http://plex/stream/{key}")),
        subtitles: vec![SubtitleStream {
            language_code: "eng".to_string(),
            codec: "srt".to_string(),
            url: Some(format!("http://plex/subs/{key}")),
        }],
    }];

    let kind = match kind {
        "episode" => MediaKind::Episode { parts },
        "movie" => MediaKind::Movie { parts },
        _ => MediaKind::Other { parts },
    };

    MediaItem {
        key: key.to_string(),
        title: title.to_string(),
        watch_count,
        kind,
        art_url: Some(format!("http://plex/art/{key}")),
        thumb_url: Some(format!("http://plex/thumb/{key}")),
        playlist_item_id: None,
    }
}

pub fn show(key: &str, title: &str) -> MediaItem {
    MediaItem {
        key: key.to_string(),
        title: title.to_string(),
        watch_count: 0,
        kind: MediaKind::Show,
        art_url: None,
        thumb_url: None,
        playlist_item_id: None,
    }
}
