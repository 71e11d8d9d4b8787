//! Release feed: latest-release metadata and installer download.

use super::UpdateError;
use super::version::normalize_tag;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// GitHub "latest release" endpoint for this application.
pub const UPDATE_API_URL: &str = "https://api.github.com/repos/okurawave/pdfmaker/releases/latest";

/// Sent with every request; GitHub rejects requests without one.
pub const USER_AGENT: &str = "pdfmaker";

const CHECK_TIMEOUT: Duration = Duration::from_secs(6);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Prefix of downloaded installer files in the temp directory.
pub const DOWNLOAD_PREFIX: &str = "pdfmaker_update_";

/// One downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,

    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

/// Release metadata as returned by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub tag_name: String,

    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseInfo {
    /// Tag with any leading `v` removed.
    pub fn version(&self) -> &str {
        normalize_tag(&self.tag_name)
    }

    /// Asset whose name matches `name` exactly.
    pub fn find_asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

/// Source of release metadata and assets.
#[async_trait]
pub trait ReleaseFeed: Send + Sync {
    /// Fetch metadata for the latest release.
    async fn latest_release(&self) -> Result<ReleaseInfo, UpdateError>;

    /// Download `asset` to a uniquely named temporary file and return its path.
    ///
    /// Nothing is left behind when the download fails part way.
    async fn download_asset(&self, asset: &ReleaseAsset) -> Result<Utf8PathBuf, UpdateError>;
}

/// [`ReleaseFeed`] backed by the GitHub releases API.
///
/// Construction never fails. If the HTTP client cannot be built, every check
/// and download reports that error instead, so the rest of the application
/// still runs with updates unavailable.
#[derive(Debug, Clone)]
pub struct GitHubReleaseFeed {
    client: Result<reqwest::Client, String>,
    api_url: String,
}

impl GitHubReleaseFeed {
    pub fn new() -> Self {
        Self::with_api_url(UPDATE_API_URL)
    }

    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                tracing::warn!("HTTP client unavailable, update checks disabled: {}", e);
                e.to_string()
            });

        Self {
            client,
            api_url: api_url.into(),
        }
    }

    /// False when the HTTP client could not be built.
    pub fn is_available(&self) -> bool {
        self.client.is_ok()
    }

    fn client(&self) -> Result<&reqwest::Client, String> {
        self.client
            .as_ref()
            .map_err(|e| format!("HTTP client unavailable: {e}"))
    }
}

impl Default for GitHubReleaseFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReleaseFeed for GitHubReleaseFeed {
    async fn latest_release(&self) -> Result<ReleaseInfo, UpdateError> {
        let check = |e: reqwest::Error| UpdateError::Check(e.to_string());

        let client = self.client().map_err(UpdateError::Check)?;

        tracing::debug!("Fetching release metadata from {}", self.api_url);
        let release = client
            .get(&self.api_url)
            .timeout(CHECK_TIMEOUT)
            .send()
            .await
            .map_err(check)?
            .error_for_status()
            .map_err(check)?
            .json::<ReleaseInfo>()
            .await
            .map_err(check)?;

        tracing::info!(
            "Latest release is {} with {} asset(s)",
            release.tag_name,
            release.assets.len()
        );
        Ok(release)
    }

    async fn download_asset(&self, asset: &ReleaseAsset) -> Result<Utf8PathBuf, UpdateError> {
        let client = self.client().map_err(UpdateError::Download)?;
        let suffix = Utf8Path::new(&asset.name)
            .extension()
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        // Removed on drop until `keep` succeeds.
        let temp = tempfile::Builder::new()
            .prefix(DOWNLOAD_PREFIX)
            .suffix(&suffix)
            .tempfile()
            .map_err(download_error)?;

        tracing::info!("Downloading {} from {}", asset.name, asset.download_url);
        let mut response = client
            .get(&asset.download_url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(download_error)?
            .error_for_status()
            .map_err(download_error)?;

        let mut file = tokio::fs::File::from_std(temp.reopen().map_err(download_error)?);
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(download_error)? {
            file.write_all(&chunk).await.map_err(download_error)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(download_error)?;
        drop(file);

        let (_, path) = temp.keep().map_err(download_error)?;
        let path = Utf8PathBuf::from_path_buf(path)
            .map_err(|p| UpdateError::Download(format!("non UTF-8 temp path: {}", p.display())))?;

        tracing::info!("Downloaded {} bytes to {}", written, path);
        Ok(path)
    }
}

fn download_error(e: impl std::fmt::Display) -> UpdateError {
    UpdateError::Download(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Feed whose client ignores proxy settings, so loopback requests stay local.
    fn local_feed() -> GitHubReleaseFeed {
        GitHubReleaseFeed {
            client: Ok(reqwest::Client::builder().no_proxy().build().unwrap()),
            api_url: "http://127.0.0.1:9/unused".into(),
        }
    }

    /// Answer a single HTTP request with `response`, then close the connection.
    async fn serve_once(response: Vec<u8>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(&response).await.unwrap();
            let _ = socket.shutdown().await;
        });

        addr
    }

    fn asset(addr: SocketAddr, name: &str) -> ReleaseAsset {
        ReleaseAsset {
            name: name.into(),
            download_url: format!("http://{addr}/{name}"),
        }
    }

    /// Downloads in the temp directory that end with `suffix`.
    fn leftover_downloads(suffix: &str) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(std::env::temp_dir())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(DOWNLOAD_PREFIX) && name.ends_with(suffix))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_download_writes_full_body() {
        let body = b"installer payload 0123456789";
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);
        let addr = serve_once(response).await;

        let path = local_feed()
            .download_asset(&asset(addr, "setup.fullbody"))
            .await
            .unwrap();

        assert!(path.file_name().unwrap().starts_with(DOWNLOAD_PREFIX));
        assert!(path.as_str().ends_with(".fullbody"));
        assert_eq!(std::fs::read(&path).unwrap(), body);
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_server_error_leaves_no_file() {
        let addr = serve_once(
            b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\nConnection: close\r\n\r\noops"
                .to_vec(),
        )
        .await;

        let err = local_feed()
            .download_asset(&asset(addr, "setup.status500"))
            .await
            .unwrap_err();

        assert!(matches!(err, UpdateError::Download(message) if message.contains("500")));
        assert!(leftover_downloads(".status500").is_empty());
    }

    #[tokio::test]
    async fn test_truncated_body_leaves_no_file() {
        let mut response =
            b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\nConnection: close\r\n\r\n".to_vec();
        response.extend_from_slice(&[7u8; 100]);
        let addr = serve_once(response).await;

        let result = local_feed()
            .download_asset(&asset(addr, "setup.truncated"))
            .await;

        assert!(matches!(result, Err(UpdateError::Download(_))));
        assert!(leftover_downloads(".truncated").is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_client_reports_instead_of_panicking() {
        let feed = GitHubReleaseFeed {
            client: Err("no TLS backend".into()),
            api_url: UPDATE_API_URL.into(),
        };
        assert!(!feed.is_available());

        let check = feed.latest_release().await.unwrap_err();
        assert!(matches!(check, UpdateError::Check(message) if message.contains("no TLS backend")));

        let download = feed
            .download_asset(&ReleaseAsset {
                name: "setup.noclient".into(),
                download_url: "http://127.0.0.1:9/setup.noclient".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(download, UpdateError::Download(_)));
        assert!(leftover_downloads(".noclient").is_empty());
    }

    #[test]
    fn test_default_feed_is_available() {
        assert!(GitHubReleaseFeed::new().is_available());
    }

    #[test]
    fn test_release_info_from_feed_json() {
        let json = r#"{
            "tag_name": "v0.2.0",
            "name": "pdfmaker 0.2.0",
            "assets": [
                {"name": "pdfmaker-setup.exe", "browser_download_url": "https://example.invalid/a.exe", "size": 10}
            ]
        }"#;

        let release: ReleaseInfo = serde_json::from_str(json).unwrap();
        assert_eq!(release.version(), "0.2.0");
        assert_eq!(
            release.find_asset("pdfmaker-setup.exe").map(|a| a.download_url.as_str()),
            Some("https://example.invalid/a.exe")
        );
        assert!(release.find_asset("pdfmaker-setup").is_none());
    }

    #[test]
    fn test_missing_fields_default() {
        let release: ReleaseInfo = serde_json::from_str("{}").unwrap();
        assert_eq!(release.version(), "");
        assert!(release.assets.is_empty());
    }
}
