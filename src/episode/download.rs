use std::path::{Path, PathBuf};

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::DownloadError;
use crate::feed::Episode;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::store::{DownloadRecord, ManifestStore};

use super::filename::episode_filename;

/// Outcome of a download request
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    /// The episode was fetched and registered in the manifest
    Downloaded { path: PathBuf },
    /// A record for this URL already exists and its file is on disk.
    /// Benign: callers report it as a skip, not a failure.
    AlreadyPresent,
}

/// Deterministic content identifier for an episode URL.
///
/// A pure function of the URL string; no case normalization.
pub fn episode_id(url: &str) -> String {
    format!("{:x}", Sha256::digest(url.as_bytes()))
}

/// Download an episode into the target directory, registering it in the
/// manifest on success.
///
/// The body streams to `<dest>.partial` and is renamed into place only
/// after the last byte is flushed, so an interrupted download never
/// leaves a truncated file that looks complete. Nothing is registered
/// unless the rename succeeds.
pub async fn download_episode<C: HttpClient>(
    client: &C,
    manifest: &ManifestStore,
    podcast: &str,
    directory: &Path,
    episode: &Episode,
    reporter: &SharedProgressReporter,
) -> Result<DownloadOutcome, DownloadError> {
    let url = episode.enclosure.url.as_str();
    let id = episode_id(url);

    // Self-healing dedup: a stale record (file gone) is purged by the
    // store before this answers.
    if manifest.is_downloaded(&id)? {
        return Ok(DownloadOutcome::AlreadyPresent);
    }

    tokio::fs::create_dir_all(directory)
        .await
        .map_err(|e| DownloadError::CreateDirectoryFailed {
            path: directory.to_path_buf(),
            source: e,
        })?;

    let dest = directory.join(episode_filename(episode));
    let partial = partial_path(&dest);

    let bytes_downloaded = match stream_to_file(client, episode, url, &partial, reporter).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };

    reporter.report(ProgressEvent::Finalizing {
        episode_title: episode.title.clone(),
    });

    if let Err(e) = tokio::fs::rename(&partial, &dest).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(DownloadError::FinalizeFailed {
            path: dest,
            source: e,
        });
    }

    manifest.add(&DownloadRecord::new(
        id,
        podcast,
        episode.title.clone(),
        url,
        dest.clone(),
    ))?;

    reporter.report(ProgressEvent::DownloadCompleted {
        episode_title: episode.title.clone(),
        bytes_downloaded,
    });

    Ok(DownloadOutcome::Downloaded { path: dest })
}

async fn stream_to_file<C: HttpClient>(
    client: &C,
    episode: &Episode,
    url: &str,
    path: &Path,
    reporter: &SharedProgressReporter,
) -> Result<u64, DownloadError> {
    let response = client
        .get_stream(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    reporter.report(ProgressEvent::DownloadStarting {
        episode_title: episode.title.clone(),
        content_length: response.content_length,
    });

    let mut file = File::create(path)
        .await
        .map_err(|e| DownloadError::FileCreateFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::DownloadProgress {
            bytes_downloaded,
            total_bytes: response.content_length,
        });
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(bytes_downloaded)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut path = dest.as_os_str().to_owned();
    path.push(".partial");
    PathBuf::from(path)
}
