//! Peer transport: fetch content from, and serve content to, nearby peers.
//!
//! A peer link is any ordered byte stream. TCP is built in; other links
//! (e.g. an RFCOMM socket for Bluetooth locators) plug in through
//! [`PeerConnector`].

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::LocalCache;
use crate::context::Context;
use crate::identity::ContentIdentifier;
use crate::locator::{Locator, Transport};
use crate::metadata::keys;
use crate::protocol::{Message, PROTOCOL_VERSION};
use crate::request::new_message_id;
use crate::transfer::{TransferError, TransportProvider};
use crate::wire::{read_frame, write_frame, FrameError, MAX_BODY_LEN};

pub trait PeerStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> PeerStream for T {}

/// Opens a stream to the peer a locator names.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    fn transport(&self) -> Transport;
    async fn connect(&self, locator: &Locator) -> std::io::Result<Box<dyn PeerStream>>;
}

/// Connects to `host:port` taken from a `Tcp` locator.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl PeerConnector for TcpConnector {
    fn transport(&self) -> Transport {
        Transport::Tcp
    }

    async fn connect(&self, locator: &Locator) -> std::io::Result<Box<dyn PeerStream>> {
        let stream = TcpStream::connect(locator.value()).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

/// Transport provider speaking the peer protocol over a connector's streams.
pub struct PeerProvider {
    connector: Arc<dyn PeerConnector>,
}

impl PeerProvider {
    pub fn new(connector: Arc<dyn PeerConnector>) -> Self {
        Self { connector }
    }

    async fn exchange(
        &self,
        locator: &Locator,
        id: &ContentIdentifier,
    ) -> Result<Option<Bytes>, TransferError> {
        let mut stream = self.connector.connect(locator).await?;
        let msgid = new_message_id();
        write_frame(&mut stream, &Message::get(id, msgid.clone()))
            .await
            .map_err(|e| TransferError::Peer(e.to_string()))?;
        let reply = read_frame(&mut stream)
            .await
            .map_err(|e| TransferError::Peer(e.to_string()))?;
        match reply {
            Some(Message::Content {
                msgid: got, payload, ..
            }) if got == msgid => Ok(Some(Bytes::from(payload))),
            Some(Message::NotFound { msgid: got }) if got == msgid => Ok(None),
            Some(other) => Err(TransferError::Peer(format!(
                "unexpected reply to {msgid}: {other:?}"
            ))),
            None => Err(TransferError::Peer("peer closed without reply".into())),
        }
    }
}

#[async_trait]
impl TransportProvider for PeerProvider {
    fn name(&self) -> &str {
        "peer"
    }

    fn can_handle(&self, locator: &Locator) -> bool {
        locator.transport() == self.connector.transport()
    }

    async fn fetch(
        &self,
        locator: &Locator,
        id: &ContentIdentifier,
        ctx: &Context,
    ) -> Result<Option<Bytes>, TransferError> {
        ctx.run(self.exchange(locator, id)).await?
    }
}

/// Answers peer `Get`s from the local cache's on-device files.
pub struct PeerServer {
    listener: TcpListener,
    cache: LocalCache,
}

impl PeerServer {
    pub async fn bind(addr: SocketAddr, cache: LocalCache) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, cache })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until `shutdown` fires. Each connection is served on its own task.
    pub async fn run(self, shutdown: CancellationToken) -> std::io::Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "peer server listening");
        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted?,
            };
            let cache = self.cache.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    r = serve_connection(stream, cache) => {
                        if let Err(e) = r {
                            debug!(%peer, error = %e, "peer connection ended");
                        }
                    }
                }
            });
        }
        info!("peer server stopped");
        Ok(())
    }
}

async fn serve_connection<S: PeerStream>(
    mut stream: S,
    cache: LocalCache,
) -> Result<(), TransferError> {
    while let Some(msg) = read_frame(&mut stream)
        .await
        .map_err(|e| TransferError::Peer(e.to_string()))?
    {
        let reply = answer(&cache, msg).await;
        let sent = match write_frame(&mut stream, &reply).await {
            Err(FrameError::Oversized(len)) => {
                warn!(msgid = reply.msgid(), len, "reply too large for one frame");
                let not_found = Message::NotFound {
                    msgid: reply.msgid().to_string(),
                };
                write_frame(&mut stream, &not_found).await
            }
            other => other,
        };
        sent.map_err(|e| TransferError::Peer(e.to_string()))?;
    }
    Ok(())
}

async fn answer(cache: &LocalCache, msg: Message) -> Message {
    let (protocol_version, msgid, hash_algorithm, hash) = match msg {
        Message::Get {
            protocol_version,
            msgid,
            hash_algorithm,
            hash,
        } => (protocol_version, msgid, hash_algorithm, hash),
        other => {
            warn!(msgid = other.msgid(), "peer sent a non-request message");
            return Message::NotFound {
                msgid: other.msgid().to_string(),
            };
        }
    };
    if protocol_version != PROTOCOL_VERSION {
        warn!(protocol_version, "unsupported peer protocol version");
        return Message::NotFound { msgid };
    }
    let id = match ContentIdentifier::checked(hash_algorithm, hash) {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "peer asked for a malformed identifier");
            return Message::NotFound { msgid };
        }
    };
    let key = id.clone();
    let entry = match cache.blocking(move |c| c.get(&key)).await {
        Ok(entry) => entry,
        Err(e) => {
            debug!(%id, error = %e, "peer asked for content we do not hold");
            return Message::NotFound { msgid };
        }
    };
    let Some(path) = entry
        .file_path()
        .or_else(|| entry.metadata.get(keys::FILE_PATH))
        .map(str::to_string)
    else {
        return Message::NotFound { msgid };
    };
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.len() > MAX_BODY_LEN as u64 => {
            warn!(%id, %path, len = meta.len(), "cached file too large to serve");
            return Message::NotFound { msgid };
        }
        _ => {}
    }
    match tokio::fs::read(&path).await {
        Ok(payload) => {
            debug!(%id, len = payload.len(), "serving peer");
            Message::Content {
                msgid,
                content_type: entry.content_type,
                payload,
            }
        }
        Err(e) => {
            warn!(%id, %path, error = %e, "cached file unreadable");
            Message::NotFound { msgid }
        }
    }
}
