// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, MediaItem};
use crate::decision::{Decision, DecisionFlags};
use crate::error::SyncError;
use crate::fetch::Fetcher;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::throttle::Throttle;
use crate::transfer::TransferEngine;

/// What part of the catalog to walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// One item of a section by exact title, or the whole section
    Section {
        section: String,
        name: Option<String>,
    },
    /// Every item of a playlist, in playlist order
    Playlist { name: String },
}

impl Selection {
    fn describe(&self) -> String {
        match self {
            Self::Section {
                section,
                name: Some(name),
            } => format!("{name} in section {section}"),
            Self::Section { section, name: None } => format!("section {section}"),
            Self::Playlist { name } => format!("playlist {name}"),
        }
    }
}

/// Options for a sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Destination root; remote paths are mirrored below it
    pub destination: PathBuf,
    /// Bandwidth cap in bytes per second shared by all transfers
    pub bandwidth_limit: Option<u32>,
    /// Deadline for a single transfer
    pub timeout: Option<Duration>,
    /// Force, assets and refresh-assets switches
    pub flags: DecisionFlags,
    /// Fall back to a transcoded stream when the download is refused
    pub allow_transcode: bool,
    /// Remove playlist entries once they were fetched
    pub remove_from_playlist: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            destination: PathBuf::from("."),
            bandwidth_limit: None,
            timeout: None,
            flags: DecisionFlags::default(),
            allow_transcode: true,
            remove_from_playlist: false,
        }
    }
}

/// Result of a sync run
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    /// Items whose media was fetched and marked watched
    pub downloaded: usize,
    /// Watched items whose assets were refreshed
    pub assets_only: usize,
    /// Items skipped because they were already seen
    pub skipped: usize,
    /// Items with at least one media part that could not be fetched
    pub failed: usize,
    /// Subtitle and artwork transfers that failed
    pub failed_assets: usize,
    /// Details of failed items (title, error message)
    pub failed_items: Vec<(String, String)>,
}

impl SyncResult {
    fn fail(&mut self, title: &str, reason: impl Into<String>) {
        self.failed += 1;
        self.failed_items.push((title.to_string(), reason.into()));
    }
}

/// How a single leaf item ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafStatus {
    Fetched,
    AssetsOnly,
    Skipped,
    Failed,
}

/// Walk the selected part of the catalog and fetch what the download
/// decision asks for
///
/// Items are processed one at a time in catalog order. Only an unresolvable
/// selection or an unusable destination ends the run early; every other
/// failure is logged and counted in the result.
pub async fn sync_catalog<K: Catalog, C: HttpClient>(
    catalog: &K,
    client: C,
    selection: &Selection,
    options: &SyncOptions,
    reporter: SharedProgressReporter,
) -> Result<SyncResult, SyncError> {
    let engine = TransferEngine::new(client, reporter.clone())
        .with_throttle(Throttle::shared(options.bandwidth_limit))
        .with_timeout(options.timeout);

    let mut traversal = Traversal {
        catalog,
        fetcher: Fetcher::new(&engine, &options.destination, options.allow_transcode),
        flags: options.flags,
        reporter: &reporter,
        result: SyncResult::default(),
    };

    match selection {
        Selection::Section { section, name } => {
            info!("selecting section {}", section);
            let section = catalog.section(section).await?;

            let items = match name {
                Some(name) => {
                    debug!("searching for {}", name);
                    vec![catalog.section_item(&section, name).await?]
                }
                None => catalog.section_items(&section).await?,
            };

            reporter.report(ProgressEvent::TraversalStarting {
                source: selection.describe(),
            });
            for item in &items {
                traversal.top_level(item).await?;
            }
        }
        Selection::Playlist { name } => {
            info!("selecting playlist {}", name);
            let playlist = catalog.playlist(name).await?;
            let items = catalog.playlist_items(&playlist).await?;

            reporter.report(ProgressEvent::TraversalStarting {
                source: selection.describe(),
            });
            for item in &items {
                debug!("{} from playlist {}", item.title, playlist.title);
                let fetched = traversal.top_level(item).await?;

                if fetched && options.remove_from_playlist {
                    info!("deleting {} from playlist", item.title);
                    if let Err(e) = catalog.remove_from_playlist(&playlist, item).await {
                        error!("could not remove {} from playlist: {}", item.title, e);
                    }
                }
            }
        }
    }

    let result = traversal.result;
    reporter.report(ProgressEvent::SyncCompleted {
        downloaded_count: result.downloaded,
        assets_only_count: result.assets_only,
        skipped_count: result.skipped,
        failed_count: result.failed,
    });

    Ok(result)
}

struct Traversal<'a, K, C> {
    catalog: &'a K,
    fetcher: Fetcher<'a, C>,
    flags: DecisionFlags,
    reporter: &'a SharedProgressReporter,
    result: SyncResult,
}

impl<K: Catalog, C: HttpClient> Traversal<'_, K, C> {
    /// Process a listed item, returning whether its media was fetched
    /// without any failure
    async fn top_level(&mut self, item: &MediaItem) -> Result<bool, SyncError> {
        if !item.is_show() {
            return Ok(self.leaf(item).await? == LeafStatus::Fetched);
        }

        debug!("found show {}", item.title);
        let episodes = match self.catalog.episodes(item).await {
            Ok(episodes) => episodes,
            Err(e) => {
                error!("could not list episodes of {}: {}", item.title, e);
                self.result.fail(&item.title, e.to_string());
                return Ok(false);
            }
        };

        let mut fetched = false;
        let mut failed = false;
        for episode in &episodes {
            match self.leaf(episode).await? {
                LeafStatus::Fetched => fetched = true,
                LeafStatus::Failed => failed = true,
                LeafStatus::AssetsOnly | LeafStatus::Skipped => {}
            }
        }

        Ok(fetched && !failed)
    }

    async fn leaf(&mut self, listed: &MediaItem) -> Result<LeafStatus, SyncError> {
        let item = match self.catalog.reload(listed).await {
            Ok(item) => item,
            Err(e) => {
                error!("could not reload {}: {}", listed.title, e);
                self.result.fail(&listed.title, e.to_string());
                return Ok(LeafStatus::Failed);
            }
        };
        let item = &item;
        debug!("{}: watch count {}", item.title, item.watch_count);

        let with_assets = match Decision::for_item(item.watch_count, self.flags) {
            Decision::Skip => {
                info!("{} already seen", item.title);
                self.reporter.report(ProgressEvent::ItemSkipped {
                    title: item.title.clone(),
                    reason: "already seen".to_string(),
                });
                self.result.skipped += 1;
                return Ok(LeafStatus::Skipped);
            }
            Decision::AssetsOnly => {
                info!("refreshing assets of {}", item.title);
                for part in item.parts() {
                    self.result.failed_assets += self
                        .fetcher
                        .subtitles(item, part)
                        .await
                        .map_err(SyncError::Destination)?;
                }
                self.result.failed_assets += self
                    .fetcher
                    .artwork(item)
                    .await
                    .map_err(SyncError::Destination)?;
                self.result.assets_only += 1;
                return Ok(LeafStatus::AssetsOnly);
            }
            Decision::FetchAll { with_assets } => with_assets,
        };

        if item.parts().is_empty() {
            warn!("{} has no media parts", item.title);
            self.result.fail(&item.title, "no media parts");
            return Ok(LeafStatus::Failed);
        }

        let mut fetched_parts = 0;
        for part in item.parts() {
            debug!("part {}: {}", part.id, part.remote_file);

            let fetched = self
                .fetcher
                .media(item, part)
                .await
                .map_err(SyncError::Destination)?;
            if !fetched {
                continue;
            }
            fetched_parts += 1;

            if with_assets {
                self.result.failed_assets += self
                    .fetcher
                    .subtitles(item, part)
                    .await
                    .map_err(SyncError::Destination)?;
            }
        }

        if with_assets && fetched_parts > 0 {
            self.result.failed_assets += self
                .fetcher
                .artwork(item)
                .await
                .map_err(SyncError::Destination)?;
        }

        if fetched_parts < item.parts().len() {
            self.result.fail(&item.title, "media transfer failed");
            return Ok(LeafStatus::Failed);
        }

        info!("marking {} as watched", item.title);
        if let Err(e) = self.catalog.mark_watched(item).await {
            error!("could not mark {} as watched: {}", item.title, e);
        }
        self.result.downloaded += 1;

        Ok(LeafStatus::Fetched)
    }
}
