use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{TransferError, TransportError};
use crate::http::{HttpClient, redact_url};
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::throttle::SharedThrottle;

use super::layout::{split_path, working_name};

/// A resumed request answered with the full body is retried once from scratch
const MAX_ATTEMPTS: usize = 2;

/// One file to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    pub url: String,
    pub directory: PathBuf,
    pub file_name: String,
    /// Human readable name used in logs and progress output
    pub title: String,
    /// Continue from an existing working file instead of starting over
    pub resumable: bool,
}

impl TransferTarget {
    pub fn new(
        url: impl Into<String>,
        path: &Path,
        title: impl Into<String>,
        resumable: bool,
    ) -> Self {
        let (directory, file_name) = split_path(path);
        Self {
            url: url.into(),
            directory,
            file_name,
            title: title.into(),
            resumable,
        }
    }

    /// Path of the in-progress file
    pub fn working_path(&self) -> PathBuf {
        self.directory.join(working_name(&self.file_name))
    }

    /// Path of the completed file
    pub fn final_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// Successful end states of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The body was streamed and committed; `bytes` is the final file size
    Completed { bytes: u64 },
    /// The server reported the requested range as unsatisfiable, so the
    /// working file already held everything
    AlreadyComplete { bytes: u64 },
}

impl TransferOutcome {
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Completed { bytes } | Self::AlreadyComplete { bytes } => *bytes,
        }
    }
}

/// Streams HTTP responses into files with resume support
///
/// The byte length of the working file `.name` is the only resume
/// checkpoint. A completed file only ever appears by renaming the working
/// file once the whole body has been written.
pub struct TransferEngine<C> {
    client: C,
    throttle: Option<SharedThrottle>,
    timeout: Option<Duration>,
    reporter: SharedProgressReporter,
}

impl<C: HttpClient> TransferEngine<C> {
    pub fn new(client: C, reporter: SharedProgressReporter) -> Self {
        Self {
            client,
            throttle: None,
            timeout: None,
            reporter,
        }
    }

    /// Share a bandwidth limit with every transfer of this engine
    pub fn with_throttle(mut self, throttle: Option<SharedThrottle>) -> Self {
        self.throttle = throttle;
        self
    }

    /// Give up on a transfer once the server has sent nothing for `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetch `target`, resuming from its working file when allowed
    ///
    /// Fails with [`TransferError::CreateDirectory`] when the destination
    /// directory cannot be created; callers must treat that as fatal.
    pub async fn run(&self, target: &TransferTarget) -> Result<TransferOutcome, TransferError> {
        ensure_directory(&target.directory).await?;

        let mut resumable = target.resumable;
        let mut attempt = 0;

        let result = loop {
            attempt += 1;
            match self.stream_to_file(target, resumable).await {
                Err(e) if e.is_resume_unsupported() && attempt < MAX_ATTEMPTS => {
                    warn!(
                        "{}: server does not support resuming, starting over",
                        target.file_name
                    );
                    resumable = false;
                }
                other => break other,
            }
        };

        match &result {
            Ok(outcome) => self.reporter.report(ProgressEvent::TransferCompleted {
                title: target.title.clone(),
                file_name: target.file_name.clone(),
                bytes_transferred: outcome.bytes(),
            }),
            Err(e) => self.reporter.report(ProgressEvent::TransferFailed {
                title: target.title.clone(),
                file_name: target.file_name.clone(),
                error: e.to_string(),
            }),
        }

        result
    }

    /// Await `future`, giving up once the idle timeout passes
    async fn within<F: Future>(&self, future: F) -> Option<F::Output> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, future).await.ok(),
            None => Some(future.await),
        }
    }

    async fn stream_to_file(
        &self,
        target: &TransferTarget,
        resumable: bool,
    ) -> Result<TransferOutcome, TransferError> {
        let url = redact_url(&target.url);
        let transport = |source: TransportError| TransferError::Transport {
            url: url.clone(),
            source,
        };

        let working = target.working_path();
        let (mut file, offset) = open_working_file(&working, resumable).await?;

        if offset > 0 {
            info!("resuming {} at byte {}", target.file_name, offset);
        }
        debug!("downloading {} to {}", url, working.display());

        let response = self
            .within(self.client.get_stream(&target.url, offset))
            .await
            .unwrap_or(Err(TransportError::TimedOut))
            .map_err(transport)?;

        match response.status {
            200 if offset > 0 => {
                return Err(transport(TransportError::RangeNotSupported { offset }));
            }
            200 | 206 => {}
            416 => {
                debug!("{} already fully present", target.file_name);
                drop(file);
                commit(&working, &target.final_path()).await?;
                return Ok(TransferOutcome::AlreadyComplete { bytes: offset });
            }
            403 => {
                drop(file);
                discard(&working).await;
                return Err(TransferError::PermissionDenied { url });
            }
            status => {
                drop(file);
                discard(&working).await;
                return Err(TransferError::HttpStatus { url, status });
            }
        }

        let total_bytes = response.content_length.map(|len| len + offset);
        self.reporter.report(ProgressEvent::TransferStarting {
            title: target.title.clone(),
            file_name: target.file_name.clone(),
            resume_offset: offset,
            total_bytes,
        });

        let mut bytes_transferred = offset;
        let mut stream = response.body;

        loop {
            let next = self
                .within(stream.next())
                .await
                .unwrap_or(Some(Err(TransportError::TimedOut)));

            let chunk = match next {
                None => break,
                Some(Ok(chunk)) => chunk,
                Some(Err(source)) => {
                    // Leave everything received so far on disk for the next resume
                    let _ = file.flush().await;
                    return Err(transport(source));
                }
            };

            // keep-alive
            if chunk.is_empty() {
                continue;
            }

            if let Some(throttle) = &self.throttle {
                throttle.consume(chunk.len()).await;
            }

            file.write_all(&chunk)
                .await
                .map_err(|e| TransferError::FileWriteFailed {
                    path: working.clone(),
                    source: e,
                })?;

            bytes_transferred += chunk.len() as u64;

            self.reporter.report(ProgressEvent::TransferProgress {
                title: target.title.clone(),
                bytes_transferred,
                total_bytes,
            });
        }

        file.flush()
            .await
            .map_err(|e| TransferError::FileWriteFailed {
                path: working.clone(),
                source: e,
            })?;
        file.sync_all()
            .await
            .map_err(|e| TransferError::FileWriteFailed {
                path: working.clone(),
                source: e,
            })?;
        drop(file);

        commit(&working, &target.final_path()).await?;

        Ok(TransferOutcome::Completed {
            bytes: bytes_transferred,
        })
    }
}

/// Create `directory` and its parents; an existing directory is fine
async fn ensure_directory(directory: &Path) -> Result<(), TransferError> {
    if directory.as_os_str().is_empty() {
        return Ok(());
    }

    debug!("mkdir: {}", directory.display());
    tokio::fs::create_dir_all(directory)
        .await
        .map_err(|e| TransferError::CreateDirectory {
            path: directory.to_path_buf(),
            source: e,
        })
}

/// Open the working file, returning it together with the resume offset
async fn open_working_file(path: &Path, resumable: bool) -> Result<(File, u64), TransferError> {
    if resumable
        && let Ok(metadata) = tokio::fs::metadata(path).await
        && metadata.is_file()
    {
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .await
            .map_err(|e| TransferError::FileOpenFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
        return Ok((file, metadata.len()));
    }

    // Truncates a stale working file left by an earlier run
    let file = File::create(path)
        .await
        .map_err(|e| TransferError::FileOpenFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok((file, 0))
}

async fn commit(working: &Path, final_path: &Path) -> Result<(), TransferError> {
    debug!("renaming {} to {}", working.display(), final_path.display());
    tokio::fs::rename(working, final_path)
        .await
        .map_err(|e| TransferError::RenameFailed {
            from: working.to_path_buf(),
            to: final_path.to_path_buf(),
            source: e,
        })
}

async fn discard(working: &Path) {
    if let Err(e) = tokio::fs::remove_file(working).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("could not remove {}: {}", working.display(), e);
    }
}
