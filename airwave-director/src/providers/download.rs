//! HTTP media downloader

use super::MediaDownloader;
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("airwave-director/", env!("CARGO_PKG_VERSION"));

/// Fetches resolved media URLs with a plain GET
///
/// URLs with a scheme other than http(s) go to the fallback downloader, if any.
pub struct HttpDownloader {
    http_client: reqwest::Client,
    fallback: Option<Arc<dyn MediaDownloader>>,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http_client,
            fallback: None,
        })
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn MediaDownloader>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

fn is_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[async_trait]
impl MediaDownloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<Bytes> {
        if !is_http(url) {
            return match &self.fallback {
                Some(fallback) => fallback.download(url).await,
                None => Err(Error::Download(format!("unsupported URL scheme: {}", url))),
            };
        }

        let response = self.http_client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Download(format!("GET {} returned {}", url, status.as_u16())));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(Error::Download(format!("GET {} returned an empty body", url)));
        }

        debug!(bytes = bytes.len(), "Downloaded media");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::offline::OfflineMediaProvider;

    #[tokio::test]
    async fn test_non_http_without_fallback_is_rejected() {
        let downloader = HttpDownloader::new(Duration::from_secs(1)).unwrap();
        let err = downloader.download("offline://x/y?br=1").await.unwrap_err();
        assert!(matches!(err, Error::Download(_)));
    }

    #[tokio::test]
    async fn test_non_http_goes_to_fallback() {
        let downloader = HttpDownloader::new(Duration::from_secs(1))
            .unwrap()
            .with_fallback(Arc::new(OfflineMediaProvider::new()));
        let bytes = downloader.download("offline://x/y?br=1").await.unwrap();
        assert!(!bytes.is_empty());
    }
}
