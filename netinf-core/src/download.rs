//! Open-Internet download, the last fallback of the fetch pipeline.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::context::{Context, Interrupted};

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("{0} is not an http(s) url")]
    NotFetchable(String),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Only http and https urls can be downloaded.
pub fn is_fetchable(url: &str) -> bool {
    reqwest::Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub bytes: Bytes,
    /// MIME type without parameters; `application/octet-stream` when the server sent none.
    pub content_type: String,
}

#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str, ctx: &Context) -> Result<Downloaded, DownloadError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpDownloader {
    http: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, ctx: &Context) -> Result<Downloaded, DownloadError> {
        if !is_fetchable(url) {
            return Err(DownloadError::NotFetchable(url.to_string()));
        }
        let req = self.http.get(url).timeout(ctx.timeout());
        let resp = ctx.run(req.send()).await??;
        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = ctx.run(resp.bytes()).await??;
        debug!(url, len = bytes.len(), %content_type, "downloaded");
        Ok(Downloaded {
            bytes,
            content_type,
        })
    }
}
