//! Notifications for whoever drives a UI. Core code only ever sees the trait.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::identity::ContentIdentifier;
use crate::locator::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A local cache `get` answered.
    ServedFromCache { id: ContentIdentifier },
    /// Bytes are being fetched over this transport.
    UsingTransport {
        id: ContentIdentifier,
        transport: Transport,
    },
    /// The naming service returned the bytes inline.
    UsingNamingService { id: ContentIdentifier },
    /// Content is ready to display. Publishing, if any, happens afterwards.
    ContentReady { id: ContentIdentifier, url: String },
    Published { id: ContentIdentifier },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: Event) {}
}

impl EventSink for mpsc::UnboundedSender<Event> {
    fn emit(&self, event: Event) {
        // Receiver gone means nobody is listening.
        let _ = self.send(event);
    }
}

pub fn noop() -> Arc<dyn EventSink> {
    Arc::new(NoopSink)
}
