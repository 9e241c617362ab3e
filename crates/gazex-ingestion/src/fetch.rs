//! Payload acquisition.
//!
//! A provider stages one source's payload files into a local directory;
//! the pipeline then discovers and parses whatever landed there. The
//! pre-staged provider covers the common operational path (dumps synced
//! out of band), the HTTP provider pulls configured URLs directly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument};

use gazex_common::{GazetteerSource, GazexError, Result};

const HTTP_TIMEOUT: Duration = Duration::from_secs(300);
const USER_AGENT: &str = concat!("gazex/", env!("CARGO_PKG_VERSION"));

/// Stages a source's payload locally and returns the directory holding
/// its files.
#[async_trait]
pub trait PayloadProvider: Send + Sync {
    async fn fetch(&self, source: GazetteerSource) -> Result<PathBuf>;
}

/// Payloads already on disk under `<data_dir>/<source>/`.
pub struct PreStagedProvider {
    data_dir: PathBuf,
}

impl PreStagedProvider {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

#[async_trait]
impl PayloadProvider for PreStagedProvider {
    async fn fetch(&self, source: GazetteerSource) -> Result<PathBuf> {
        let dir = self.data_dir.join(source.as_str());
        if !dir.is_dir() {
            return Err(GazexError::Fetch(format!(
                "no staged payload for {source}: {} is not a directory",
                dir.display()
            )));
        }
        let populated = std::fs::read_dir(&dir)?.next().is_some();
        if !populated {
            return Err(GazexError::Fetch(format!(
                "staged payload directory for {source} is empty: {}",
                dir.display()
            )));
        }
        Ok(dir)
    }
}

/// Downloads configured URLs into `<data_dir>/<source>/`, one file per
/// URL, named after the URL's last path segment.
pub struct HttpProvider {
    client: reqwest::Client,
    data_dir: PathBuf,
    urls: HashMap<GazetteerSource, Vec<String>>,
}

impl HttpProvider {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        urls: HashMap<GazetteerSource, Vec<String>>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| GazexError::Fetch(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            data_dir: data_dir.into(),
            urls,
        })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| GazexError::Fetch(format!("GET {url} failed: {e}")))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| GazexError::Fetch(format!("reading body of {url} failed: {e}")))?;
        tokio::fs::write(dest, &body).await?;
        info!(url, dest = %dest.display(), bytes = body.len(), "downloaded payload file");
        Ok(())
    }
}

#[async_trait]
impl PayloadProvider for HttpProvider {
    #[instrument(skip(self), fields(source = %source))]
    async fn fetch(&self, source: GazetteerSource) -> Result<PathBuf> {
        let urls = self.urls.get(&source).ok_or_else(|| {
            GazexError::Fetch(format!("no download URLs configured for {source}"))
        })?;
        let dir = self.data_dir.join(source.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        for url in urls {
            let file_name = url
                .rsplit('/')
                .find(|seg| !seg.is_empty())
                .ok_or_else(|| GazexError::Fetch(format!("cannot derive file name from {url}")))?;
            self.download(url, &dir.join(file_name)).await?;
        }
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pre_staged_returns_populated_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("geonames");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("US.txt"), "data").unwrap();

        let provider = PreStagedProvider::new(tmp.path());
        let got = provider.fetch(GazetteerSource::Geonames).await.unwrap();
        assert_eq!(got, dir);
    }

    #[tokio::test]
    async fn test_pre_staged_missing_dir_is_fetch_error() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = PreStagedProvider::new(tmp.path());
        let err = provider.fetch(GazetteerSource::Wof).await.unwrap_err();
        assert!(matches!(err, GazexError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_pre_staged_empty_dir_is_fetch_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("fast")).unwrap();
        let provider = PreStagedProvider::new(tmp.path());
        let err = provider.fetch(GazetteerSource::Fast).await.unwrap_err();
        assert!(matches!(err, GazexError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_http_provider_requires_configured_urls() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = HttpProvider::new(tmp.path(), HashMap::new()).unwrap();
        let err = provider.fetch(GazetteerSource::Btaa).await.unwrap_err();
        assert!(matches!(err, GazexError::Fetch(_)));
    }
}
