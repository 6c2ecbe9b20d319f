use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::catalog::{MediaItem, MediaPart};
use crate::error::TransferError;
use crate::http::HttpClient;
use crate::transfer::{
    TransferEngine, TransferTarget, fanart_file_name, local_path, split_path, subtitle_file_name,
    thumb_file_name,
};

/// Fetches the media and auxiliary files of catalog items
///
/// Every method returns `Err` only for failures that must end the run;
/// everything else is logged and reported through the return value.
pub struct Fetcher<'a, C> {
    engine: &'a TransferEngine<C>,
    root: &'a Path,
    allow_transcode: bool,
}

impl<'a, C: HttpClient> Fetcher<'a, C> {
    pub fn new(engine: &'a TransferEngine<C>, root: &'a Path, allow_transcode: bool) -> Self {
        Self {
            engine,
            root,
            allow_transcode,
        }
    }

    /// Where a part ends up locally, if its remote path names a file
    pub fn part_path(&self, part: &MediaPart) -> Option<PathBuf> {
        local_path(self.root, &part.remote_file)
    }

    /// Fetch the media file of `part`, returning whether it is now complete
    ///
    /// A refused direct download falls back to the transcoded stream when
    /// allowed. Transcoded streams are never resumed.
    pub async fn media(&self, item: &MediaItem, part: &MediaPart) -> Result<bool, TransferError> {
        let Some(path) = self.part_path(part) else {
            error!(
                "{}: part {} has no usable file path '{}', skipping",
                item.title, part.id, part.remote_file
            );
            return Ok(false);
        };
        info!("downloading {} to {}", item.title, path.display());

        let target = TransferTarget::new(&part.download_url, &path, &item.title, true);
        match self.engine.run(&target).await {
            Ok(outcome) => {
                debug!("{}: {} bytes on disk", target.file_name, outcome.bytes());
                Ok(true)
            }
            Err(e @ TransferError::PermissionDenied { .. }) if !self.allow_transcode => {
                error!("{}: {}, transcoding disabled, skipping", item.title, e);
                Ok(false)
            }
            Err(TransferError::PermissionDenied { .. }) => self.transcoded(item, part, &path).await,
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!("{}: {}, skipping", item.title, e);
                Ok(false)
            }
        }
    }

    async fn transcoded(
        &self,
        item: &MediaItem,
        part: &MediaPart,
        path: &Path,
    ) -> Result<bool, TransferError> {
        let Some(url) = &part.stream_url else {
            error!("{}: download refused and no stream available, skipping", item.title);
            return Ok(false);
        };

        warn!("{}: download refused, requesting a transcoded stream", item.title);
        let target = TransferTarget::new(url, path, &item.title, false);
        match self.engine.run(&target).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!("{}: transcoded stream failed: {}, skipping", item.title, e);
                Ok(false)
            }
        }
    }

    /// Fetch the sidecar subtitles of `part`, returning the number of failures
    pub async fn subtitles(
        &self,
        item: &MediaItem,
        part: &MediaPart,
    ) -> Result<usize, TransferError> {
        let sidecars = part.subtitles.iter().filter(|s| !s.is_embedded()).count();
        let Some(path) = self.part_path(part) else {
            if sidecars > 0 {
                error!("{}: no usable file path for subtitles", item.title);
            }
            return Ok(sidecars);
        };
        let (directory, primary) = split_path(&path);
        let mut failures = 0;

        for subtitle in &part.subtitles {
            let Some(url) = &subtitle.url else {
                debug!("{}: {} subtitle is embedded", primary, subtitle.language_code);
                continue;
            };

            let name = subtitle_file_name(&primary, &subtitle.language_code, &subtitle.codec);
            if !self.asset(item, url, &directory.join(name)).await? {
                failures += 1;
            }
        }

        Ok(failures)
    }

    /// Fetch fanart and thumbnail next to the item's first part, returning
    /// the number of failures
    pub async fn artwork(&self, item: &MediaItem) -> Result<usize, TransferError> {
        let wanted = [&item.art_url, &item.thumb_url]
            .into_iter()
            .filter(|url| url.is_some())
            .count();
        let Some(path) = item.parts().first().and_then(|part| self.part_path(part)) else {
            if wanted > 0 {
                error!("{}: no usable file path for artwork", item.title);
            }
            return Ok(wanted);
        };
        let (directory, primary) = split_path(&path);

        let images = [
            (&item.art_url, fanart_file_name(&primary)),
            (&item.thumb_url, thumb_file_name(&primary)),
        ];

        let mut failures = 0;
        for (url, name) in images {
            if let Some(url) = url
                && !self.asset(item, url, &directory.join(name)).await?
            {
                failures += 1;
            }
        }

        Ok(failures)
    }

    async fn asset(&self, item: &MediaItem, url: &str, path: &Path) -> Result<bool, TransferError> {
        let target = TransferTarget::new(url, path, &item.title, false);
        info!("downloading {}", target.file_name);

        match self.engine.run(&target).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!("{}: asset {} failed: {}", item.title, target.file_name, e);
                Ok(false)
            }
        }
    }
}
