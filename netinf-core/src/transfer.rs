//! Transfer dispatch: pick a provider per locator and fetch the bytes.
//!
//! Locators are walked in [`LocatorSet`](crate::locator::LocatorSet) order,
//! i.e. by declared transport preference. A failed fetch is never retried;
//! the next locator is tried instead.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::catalog::CatalogEntry;
use crate::context::{Context, Interrupted};
use crate::events::{self, Event, EventSink};
use crate::identity::ContentIdentifier;
use crate::integrity::{verify_content, Verification};
use crate::locator::{Locator, Transport};

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected http status {0}")]
    Status(u16),
    #[error("peer: {0}")]
    Peer(String),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Fetches bytes for locators of the transports it claims.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    fn name(&self) -> &str;
    fn can_handle(&self, locator: &Locator) -> bool;
    /// `Ok(None)` means the locator did not have the content.
    async fn fetch(
        &self,
        locator: &Locator,
        id: &ContentIdentifier,
        ctx: &Context,
    ) -> Result<Option<Bytes>, TransferError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transferred {
    pub locator: Locator,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("no locator of {0} yielded content")]
    NoSuitableLocator(ContentIdentifier),
    #[error("dispatch cancelled")]
    Cancelled,
}

/// Explicitly constructed provider registry. Pass it to whatever needs it.
pub struct TransferDispatcher {
    providers: Vec<Arc<dyn TransportProvider>>,
    events: Arc<dyn EventSink>,
    verify: bool,
}

impl Default for TransferDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferDispatcher {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            events: events::noop(),
            verify: false,
        }
    }

    /// Providers are consulted in registration order.
    pub fn register(&mut self, provider: Arc<dyn TransportProvider>) {
        self.providers.push(provider);
    }

    pub fn with_provider(mut self, provider: Arc<dyn TransportProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Recompute the hash of fetched bytes and skip locators that return the wrong content.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    fn provider_for(&self, locator: &Locator) -> Option<&Arc<dyn TransportProvider>> {
        self.providers.iter().find(|p| p.can_handle(locator))
    }

    pub async fn dispatch(
        &self,
        entry: &CatalogEntry,
        ctx: &Context,
    ) -> Result<Transferred, DispatchError> {
        let id = &entry.id;
        for locator in &entry.locators {
            if ctx.is_cancelled() {
                return Err(DispatchError::Cancelled);
            }
            let Some(provider) = self.provider_for(locator) else {
                warn!(%id, %locator, "no provider for locator");
                continue;
            };
            self.events.emit(Event::UsingTransport {
                id: id.clone(),
                transport: locator.transport(),
            });
            match provider.fetch(locator, id, ctx).await {
                Ok(Some(bytes)) => {
                    if self.verify && verify_content(&bytes, id) == Verification::Mismatch {
                        warn!(%id, %locator, "content hash mismatch, skipping");
                        continue;
                    }
                    info!(%id, %locator, provider = provider.name(), len = bytes.len(), "transferred");
                    return Ok(Transferred {
                        locator: locator.clone(),
                        bytes,
                    });
                }
                Ok(None) => debug!(%id, %locator, "locator had no content"),
                Err(e) => debug!(%id, %locator, error = %e, "fetch failed"),
            }
        }
        Err(DispatchError::NoSuitableLocator(id.clone()))
    }
}

/// Reads on-device files named by `FilePath` locators.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileProvider;

#[async_trait]
impl TransportProvider for FileProvider {
    fn name(&self) -> &str {
        "file"
    }

    fn can_handle(&self, locator: &Locator) -> bool {
        locator.transport() == Transport::FilePath
    }

    async fn fetch(
        &self,
        locator: &Locator,
        _id: &ContentIdentifier,
        ctx: &Context,
    ) -> Result<Option<Bytes>, TransferError> {
        let path = PathBuf::from(locator.value());
        match ctx.run(tokio::fs::read(&path)).await? {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Plain GET of `Http` locators.
#[derive(Debug, Clone, Default)]
pub struct HttpProvider {
    http: reqwest::Client,
}

impl HttpProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl TransportProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn can_handle(&self, locator: &Locator) -> bool {
        locator.transport() == Transport::Http
    }

    async fn fetch(
        &self,
        locator: &Locator,
        _id: &ContentIdentifier,
        ctx: &Context,
    ) -> Result<Option<Bytes>, TransferError> {
        let req = self.http.get(locator.value()).timeout(ctx.timeout());
        let resp = ctx.run(req.send()).await??;
        match resp.status() {
            s if s.is_success() => Ok(Some(ctx.run(resp.bytes()).await??)),
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            s => Err(TransferError::Status(s.as_u16())),
        }
    }
}
