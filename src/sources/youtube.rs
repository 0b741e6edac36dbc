use async_process::Command;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{validate_query, MediaResolver};
use crate::{
    audio::track::{AudioData, TrackMetadata},
    error::{MusicError, MusicResult},
};

const METADATA_TIMEOUT: Duration = Duration::from_secs(60);

/// Resolver backed by the yt-dlp executable plus a direct HTTP download.
pub struct YtDlpResolver {
    binary: String,
    http: reqwest::Client,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    webpage_url: String,
    duration: Option<f64>,
    thumbnail: Option<String>,
    /// Location of the format picked by `-f`.
    url: Option<String>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
    /// Audio bitrate in kbit/s.
    abr: Option<f64>,
    is_live: Option<bool>,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>) -> MusicResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(failed)?;

        Ok(Self {
            binary: binary.into(),
            http,
        })
    }

    /// Reports the installed yt-dlp version, used by the health check.
    pub async fn version(&self) -> MusicResult<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map_err(|e| MusicError::DownloadFailed(format!("could not run {}: {e}", self.binary)))?;

        if !output.status.success() {
            return Err(MusicError::DownloadFailed(stderr_summary(&output.stderr)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn metadata(&self, url: &str) -> MusicResult<TrackMetadata> {
        validate_query(url)?;
        debug!("📊 Obteniendo info de: {}", url);

        let run = Command::new(&self.binary)
            .args([
                "--no-playlist",
                "--dump-json",
                "-f",
                "bestaudio/best",
                "--no-warnings",
                url,
            ])
            .output();

        let output = tokio::time::timeout(METADATA_TIMEOUT, run)
            .await
            .map_err(|_| MusicError::DownloadFailed("yt-dlp timed out".into()))?
            .map_err(|e| MusicError::DownloadFailed(format!("could not run {}: {e}", self.binary)))?;

        if !output.status.success() {
            let error = stderr_summary(&output.stderr);
            warn!("yt-dlp error: {}", error);
            return Err(MusicError::DownloadFailed(error));
        }

        parse_info(&output.stdout)
    }

    async fn download(&self, metadata: &TrackMetadata, max_bytes: u64) -> MusicResult<AudioData> {
        let stream_url = metadata
            .stream_url
            .as_deref()
            .ok_or_else(|| MusicError::DownloadFailed("no audio stream available".into()))?;

        let response = self
            .http
            .get(stream_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(failed)?;

        if let Some(size) = response.content_length() {
            if size > max_bytes {
                return Err(MusicError::TrackTooLarge {
                    size,
                    limit: max_bytes,
                });
            }
        }

        let capacity = response.content_length().unwrap_or(metadata.estimated_size);
        let mut body = BytesMut::with_capacity(capacity.min(max_bytes) as usize);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(failed)?;
            let size = (body.len() + chunk.len()) as u64;
            if size > max_bytes {
                return Err(MusicError::TrackTooLarge {
                    size,
                    limit: max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        info!("⬇️ Descargados {} bytes de {}", body.len(), metadata.title);
        Ok(AudioData::new(body.freeze()))
    }
}

fn failed(e: impl std::fmt::Display) -> MusicError {
    MusicError::DownloadFailed(e.to_string())
}

/// Last non-empty stderr line, which is where yt-dlp puts its ERROR message.
fn stderr_summary(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("yt-dlp failed")
        .to_string()
}

/// Convierte la salida JSON de yt-dlp a TrackMetadata
fn parse_info(stdout: &[u8]) -> MusicResult<TrackMetadata> {
    let info: YtDlpInfo = serde_json::from_slice(stdout)
        .map_err(|e| MusicError::DownloadFailed(format!("unreadable yt-dlp output: {e}")))?;

    if info.is_live.unwrap_or(false) {
        return Err(MusicError::DownloadFailed(
            "live streams cannot be downloaded".into(),
        ));
    }

    let duration = info.duration.unwrap_or(0.0).max(0.0);
    let estimated_size = info
        .filesize
        .or(info.filesize_approx)
        .or_else(|| info.abr.map(|kbps| (kbps * 1000.0 / 8.0 * duration) as u64))
        .unwrap_or(0);

    Ok(TrackMetadata {
        title: info.title,
        url: info.webpage_url,
        duration_secs: duration.round() as u64,
        thumbnail: info.thumbnail,
        estimated_size,
        stream_url: info.url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_info_with_filesize() {
        let json = br#"{
            "id": "abc",
            "title": "X",
            "webpage_url": "https://www.youtube.com/watch?v=abc",
            "duration": 120.4,
            "thumbnail": "https://i.ytimg.com/vi/abc/hqdefault.jpg",
            "url": "https://rr1.googlevideo.com/videoplayback?id=abc",
            "filesize": 1000000,
            "filesize_approx": 999,
            "abr": 129.5
        }"#;

        let metadata = parse_info(json).unwrap();

        assert_eq!(
            metadata,
            TrackMetadata {
                title: "X".into(),
                url: "https://www.youtube.com/watch?v=abc".into(),
                duration_secs: 120,
                thumbnail: Some("https://i.ytimg.com/vi/abc/hqdefault.jpg".into()),
                estimated_size: 1_000_000,
                stream_url: Some("https://rr1.googlevideo.com/videoplayback?id=abc".into()),
            }
        );
    }

    #[test]
    fn test_parse_info_estimates_from_bitrate() {
        let json = br#"{"title": "Y", "webpage_url": "https://www.youtube.com/watch?v=y", "duration": 100, "abr": 160}"#;
        let metadata = parse_info(json).unwrap();
        assert_eq!(metadata.estimated_size, 2_000_000);
        assert_eq!(metadata.thumbnail, None);
    }

    #[test]
    fn test_parse_info_rejects_live_and_garbage() {
        let live = br#"{"title": "Z", "webpage_url": "https://www.youtube.com/watch?v=z", "is_live": true}"#;
        assert!(matches!(parse_info(live), Err(MusicError::DownloadFailed(_))));
        assert!(matches!(parse_info(b"ERROR"), Err(MusicError::DownloadFailed(_))));
    }

    #[test]
    fn test_stderr_summary_takes_last_line() {
        let stderr = b"WARNING: something\nERROR: [youtube] abc: Video unavailable\n\n";
        assert_eq!(stderr_summary(stderr), "ERROR: [youtube] abc: Video unavailable");
        assert_eq!(stderr_summary(b""), "yt-dlp failed");
    }
}
