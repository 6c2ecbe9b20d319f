// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::CatalogError;

use super::Catalog;
use super::model::{MediaItem, MediaKind, MediaPart, Playlist, Section, SubtitleStream};

const TOKEN_PARAM: &str = "X-Plex-Token";
const LIBRARY_IDENTIFIER: &str = "com.plexapp.plugins.library";
const SUBTITLE_STREAM_TYPE: u8 = 3;
const UNKNOWN_LANGUAGE: &str = "und";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "MediaContainer")]
    container: Container,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Container {
    #[serde(rename = "Directory")]
    directories: Vec<DirectoryEntry>,
    #[serde(rename = "Metadata")]
    metadata: Vec<MetadataEntry>,
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    key: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct MetadataEntry {
    #[serde(rename = "ratingKey")]
    rating_key: String,
    #[serde(rename = "type")]
    kind: String,
    title: String,
    #[serde(rename = "viewCount", default)]
    view_count: u32,
    art: Option<String>,
    thumb: Option<String>,
    #[serde(rename = "playlistItemID")]
    playlist_item_id: Option<u64>,
    #[serde(rename = "Media", default)]
    media: Vec<MediaEntry>,
}

#[derive(Debug, Deserialize)]
struct MediaEntry {
    #[serde(rename = "Part", default)]
    parts: Vec<PartEntry>,
}

#[derive(Debug, Deserialize)]
struct PartEntry {
    id: u64,
    key: String,
    #[serde(default)]
    file: String,
    #[serde(rename = "Stream", default)]
    streams: Vec<StreamEntry>,
}

#[derive(Debug, Deserialize)]
struct StreamEntry {
    #[serde(rename = "streamType")]
    stream_type: u8,
    #[serde(rename = "languageCode")]
    language_code: Option<String>,
    codec: Option<String>,
    key: Option<String>,
}

fn decode_container(bytes: &[u8], url: &str) -> Result<Container, CatalogError> {
    serde_json::from_slice::<Envelope>(bytes)
        .map(|envelope| envelope.container)
        .map_err(|e| CatalogError::DecodeFailed {
            url: url.to_string(),
            source: e,
        })
}

/// Address and credentials of one server, turning catalog entries into
/// fetchable URLs
#[derive(Debug, Clone)]
struct Server {
    base: Url,
    token: String,
}

impl Server {
    fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        Ok(self.base.join(path)?)
    }

    /// URL that can be fetched without extra headers
    fn media_url(&self, path: &str, params: &[(&str, &str)]) -> Result<String, CatalogError> {
        let mut url = self.endpoint(path)?;
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in params {
                query.append_pair(name, value);
            }
            query.append_pair(TOKEN_PARAM, &self.token);
        }
        Ok(url.into())
    }

    fn transcode_url(
        &self,
        rating_key: &str,
        media_index: usize,
        part_index: usize,
    ) -> Result<String, CatalogError> {
        let path = format!("/library/metadata/{rating_key}");
        let media_index = media_index.to_string();
        let part_index = part_index.to_string();
        self.media_url(
            "/video/:/transcode/universal/start",
            &[
                ("path", path.as_str()),
                ("mediaIndex", media_index.as_str()),
                ("partIndex", part_index.as_str()),
                ("protocol", "http"),
                ("directPlay", "0"),
                ("directStream", "1"),
            ],
        )
    }

    fn subtitle(&self, stream: &StreamEntry) -> Result<SubtitleStream, CatalogError> {
        let url = match &stream.key {
            Some(key) => Some(self.media_url(key, &[])?),
            None => None,
        };
        Ok(SubtitleStream {
            language_code: stream
                .language_code
                .clone()
                .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string()),
            codec: stream.codec.clone().unwrap_or_else(|| "srt".to_string()),
            url,
        })
    }

    fn parts(&self, entry: &MetadataEntry) -> Result<Vec<MediaPart>, CatalogError> {
        let mut parts = Vec::new();

        for (media_index, media) in entry.media.iter().enumerate() {
            for (part_index, part) in media.parts.iter().enumerate() {
                let subtitles = part
                    .streams
                    .iter()
                    .filter(|stream| stream.stream_type == SUBTITLE_STREAM_TYPE)
                    .map(|stream| self.subtitle(stream))
                    .collect::<Result<Vec<_>, _>>()?;

                parts.push(MediaPart {
                    id: part.id,
                    remote_file: part.file.clone(),
                    download_url: self.media_url(&part.key, &[("download", "1")])?,
                    stream_url: Some(self.transcode_url(
                        &entry.rating_key,
                        media_index,
                        part_index,
                    )?),
                    subtitles,
                });
            }
        }

        Ok(parts)
    }

    fn item(&self, entry: &MetadataEntry) -> Result<MediaItem, CatalogError> {
        let kind = match entry.kind.as_str() {
            "show" => MediaKind::Show,
            "episode" => MediaKind::Episode {
                parts: self.parts(entry)?,
            },
            "movie" => MediaKind::Movie {
                parts: self.parts(entry)?,
            },
            _ => MediaKind::Other {
                parts: self.parts(entry)?,
            },
        };

        let image = |path: &Option<String>| match path {
            Some(path) => self.media_url(path, &[]).map(Some),
            None => Ok(None),
        };

        Ok(MediaItem {
            key: entry.rating_key.clone(),
            title: entry.title.clone(),
            watch_count: entry.view_count,
            kind,
            art_url: image(&entry.art)?,
            thumb_url: image(&entry.thumb)?,
            playlist_item_id: entry.playlist_item_id,
        })
    }
}

/// Catalog backed by the JSON API of a Plex Media Server
pub struct PlexCatalog {
    client: reqwest::Client,
    server: Server,
}

impl PlexCatalog {
    /// Connect to the server at `base` using an already obtained access token
    pub fn new(client: reqwest::Client, base: Url, token: impl Into<String>) -> Self {
        Self {
            client,
            server: Server {
                base,
                token: token.into(),
            },
        }
    }

    async fn send(&self, method: Method, url: Url) -> Result<Bytes, CatalogError> {
        debug!("{} {}", method, url.path());

        let response = self
            .client
            .request(method, url.clone())
            .header(ACCEPT, "application/json")
            .header(TOKEN_PARAM, self.server.token.as_str())
            .send()
            .await
            .map_err(|e| CatalogError::RequestFailed {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| CatalogError::RequestFailed {
                url: url.to_string(),
                source: e,
            })
    }

    async fn container(&self, url: Url) -> Result<Container, CatalogError> {
        let bytes = self.send(Method::GET, url.clone()).await?;
        decode_container(&bytes, url.as_str())
    }

    async fn container_at(&self, path: &str) -> Result<Container, CatalogError> {
        self.container(self.server.endpoint(path)?).await
    }

    fn items(&self, entries: &[MetadataEntry]) -> Result<Vec<MediaItem>, CatalogError> {
        entries.iter().map(|entry| self.server.item(entry)).collect()
    }
}

#[async_trait]
impl Catalog for PlexCatalog {
    async fn section(&self, name: &str) -> Result<Section, CatalogError> {
        self.container_at("/library/sections")
            .await?
            .directories
            .into_iter()
            .find(|dir| dir.title == name)
            .map(|dir| Section {
                key: dir.key,
                title: dir.title,
            })
            .ok_or_else(|| CatalogError::NotFound {
                kind: "section",
                name: name.to_string(),
            })
    }

    async fn section_items(&self, section: &Section) -> Result<Vec<MediaItem>, CatalogError> {
        let container = self
            .container_at(&format!("/library/sections/{}/all", section.key))
            .await?;
        self.items(&container.metadata)
    }

    async fn section_item(
        &self,
        section: &Section,
        title: &str,
    ) -> Result<MediaItem, CatalogError> {
        let mut url = self
            .server
            .endpoint(&format!("/library/sections/{}/all", section.key))?;
        url.query_pairs_mut().append_pair("title", title);

        // The server filter matches substrings
        let container = self.container(url).await?;
        let entry = container
            .metadata
            .iter()
            .find(|entry| entry.title == title)
            .ok_or_else(|| CatalogError::NotFound {
                kind: "item",
                name: title.to_string(),
            })?;

        self.server.item(entry)
    }

    async fn playlist(&self, name: &str) -> Result<Playlist, CatalogError> {
        self.container_at("/playlists")
            .await?
            .metadata
            .into_iter()
            .find(|entry| entry.title == name)
            .map(|entry| Playlist {
                key: entry.rating_key,
                title: entry.title,
            })
            .ok_or_else(|| CatalogError::NotFound {
                kind: "playlist",
                name: name.to_string(),
            })
    }

    async fn playlist_items(&self, playlist: &Playlist) -> Result<Vec<MediaItem>, CatalogError> {
        let container = self
            .container_at(&format!("/playlists/{}/items", playlist.key))
            .await?;
        self.items(&container.metadata)
    }

    async fn episodes(&self, show: &MediaItem) -> Result<Vec<MediaItem>, CatalogError> {
        let container = self
            .container_at(&format!("/library/metadata/{}/allLeaves", show.key))
            .await?;
        self.items(&container.metadata)
    }

    /// Fetch the full metadata of a leaf; list responses leave out stream
    /// details and may carry a stale view count
    async fn reload(&self, item: &MediaItem) -> Result<MediaItem, CatalogError> {
        let container = self
            .container_at(&format!("/library/metadata/{}", item.key))
            .await?;
        let full = container
            .metadata
            .first()
            .ok_or_else(|| CatalogError::NotFound {
                kind: "item",
                name: item.title.clone(),
            })?;

        let mut fresh = self.server.item(full)?;
        fresh.playlist_item_id = item.playlist_item_id;
        Ok(fresh)
    }

    async fn remove_from_playlist(
        &self,
        playlist: &Playlist,
        item: &MediaItem,
    ) -> Result<(), CatalogError> {
        let entry = item
            .playlist_item_id
            .ok_or_else(|| CatalogError::NotFound {
                kind: "playlist entry",
                name: item.title.clone(),
            })?;

        let url = self
            .server
            .endpoint(&format!("/playlists/{}/items/{}", playlist.key, entry))?;
        self.send(Method::DELETE, url).await?;
        Ok(())
    }

    async fn mark_watched(&self, item: &MediaItem) -> Result<(), CatalogError> {
        let mut url = self.server.endpoint("/:/scrobble")?;
        url.query_pairs_mut()
            .append_pair("key", &item.key)
            .append_pair("identifier", LIBRARY_IDENTIFIER);
        self.send(Method::GET, url).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> Server {
        Server {
            base: Url::parse("http://plex.local:32400").unwrap(),
            token: "secret".to_string(),
        }
    }

    const SECTIONS: &str = r#"{
      "MediaContainer": {
        "size": 2,
        "Directory": [
          {"key": "1", "title": "Movies", "type": "movie"},
          {"key": "2", "title": "TV Shows", "type": "show"}
        ]
      }
    }"#;

    const EPISODE: &str = r#"{
      "MediaContainer": {
        "size": 1,
        "Metadata": [{
          "ratingKey": "4711",
          "type": "episode",
          "title": "Pilot",
          "viewCount": 2,
          "thumb": "/library/metadata/4711/thumb/1700000000",
          "art": "/library/metadata/4700/art/1700000000",
          "Media": [{
            "id": 1,
            "Part": [{
              "id": 9001,
              "key": "/library/parts/9001/1700000000/file.mkv",
              "file": "/data/tv/Show/Season 01/Show - s01e01.mkv",
              "Stream": [
                {"streamType": 1, "codec": "h264"},
                {"streamType": 3, "languageCode": "eng", "codec": "srt", "key": "/library/streams/77"},
                {"streamType": 3, "languageCode": "ger", "codec": "subrip"}
              ]
            }]
          }]
        }]
      }
    }"#;

    #[test]
    fn decodes_section_directories() {
        let container = decode_container(SECTIONS.as_bytes(), "sections").unwrap();

        assert_eq!(container.directories.len(), 2);
        assert_eq!(container.directories[1].key, "2");
        assert_eq!(container.directories[1].title, "TV Shows");
        assert!(container.metadata.is_empty());
    }

    #[test]
    fn rejects_malformed_responses() {
        let result = decode_container(b"<MediaContainer/>", "sections");
        assert!(matches!(result, Err(CatalogError::DecodeFailed { .. })));
    }

    #[test]
    fn converts_episode_with_parts_and_subtitles() {
        let container = decode_container(EPISODE.as_bytes(), "episode").unwrap();
        let item = server().item(&container.metadata[0]).unwrap();

        assert_eq!(item.key, "4711");
        assert_eq!(item.title, "Pilot");
        assert_eq!(item.watch_count, 2);
        assert!(matches!(item.kind, MediaKind::Episode { .. }));

        let parts = item.parts();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].id, 9001);
        assert_eq!(parts[0].remote_file, "/data/tv/Show/Season 01/Show - s01e01.mkv");
        assert_eq!(
            parts[0].download_url,
            "http://plex.local:32400/library/parts/9001/1700000000/file.mkv?download=1&X-Plex-Token=secret"
        );

        let subtitles = &parts[0].subtitles;
        assert_eq!(subtitles.len(), 2);
        assert_eq!(subtitles[0].language_code, "eng");
        assert_eq!(
            subtitles[0].url.as_deref(),
            Some("http://plex.local:32400/library/streams/77?X-Plex-Token=secret")
        );
        assert!(subtitles[1].is_embedded());

        assert_eq!(
            item.thumb_url.as_deref(),
            Some("http://plex.local:32400/library/metadata/4711/thumb/1700000000?X-Plex-Token=secret")
        );
        assert!(item.art_url.is_some());
    }

    #[test]
    fn transcode_url_addresses_the_part() {
        let url = server().transcode_url("4711", 0, 2).unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(parsed.path(), "/video/:/transcode/universal/start");
        assert!(pairs.contains(&("path".to_string(), "/library/metadata/4711".to_string())));
        assert!(pairs.contains(&("partIndex".to_string(), "2".to_string())));
        assert!(pairs.contains(&(TOKEN_PARAM.to_string(), "secret".to_string())));
    }

    #[test]
    fn shows_and_unknown_types_map_to_kinds() {
        let json = r#"{"MediaContainer": {"Metadata": [
            {"ratingKey": "1", "type": "show", "title": "Show"},
            {"ratingKey": "2", "type": "clip", "title": "Clip", "playlistItemID": 55}
        ]}}"#;
        let container = decode_container(json.as_bytes(), "list").unwrap();

        let show = server().item(&container.metadata[0]).unwrap();
        assert!(show.is_show());
        assert_eq!(show.watch_count, 0);

        let clip = server().item(&container.metadata[1]).unwrap();
        assert!(matches!(clip.kind, MediaKind::Other { .. }));
        assert_eq!(clip.playlist_item_id, Some(55));
    }
}
