//! Outbound requests: a closed set of variants, one per naming operation.

use bytes::Bytes;

use crate::catalog::CatalogEntry;
use crate::identity::ContentIdentifier;
use crate::locator::LocatorSet;
use crate::metadata::Metadata;

/// Random per-request message id. Only disambiguates concurrent requests
/// against the same service; not globally unique.
pub fn new_message_id() -> String {
    rand::random::<u32>().to_string()
}

#[derive(Debug, Clone)]
pub enum Request {
    Search { token: String, ext: String },
    Retrieve { id: ContentIdentifier },
    Publish(PublishRequest),
}

impl Request {
    pub fn operation(&self) -> &'static str {
        match self {
            Request::Search { .. } => "search",
            Request::Retrieve { .. } => "get",
            Request::Publish(_) => "publish",
        }
    }
}

/// A sighting to publish: where the content is, what it is, and optionally the bytes.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub id: ContentIdentifier,
    pub locators: LocatorSet,
    pub content_type: Option<String>,
    pub metadata: Metadata,
    /// Pushed inline when present; otherwise only location and type are sent.
    pub content: Option<Bytes>,
}

impl PublishRequest {
    pub fn new(id: ContentIdentifier) -> Self {
        Self {
            id,
            locators: LocatorSet::new(),
            content_type: None,
            metadata: Metadata::new(),
            content: None,
        }
    }

    pub fn from_entry(entry: &CatalogEntry) -> Self {
        Self {
            id: entry.id.clone(),
            locators: entry.locators.clone(),
            content_type: Some(entry.content_type.clone()),
            metadata: entry.metadata.clone(),
            content: None,
        }
    }

    pub fn with_content(mut self, bytes: Bytes) -> Self {
        self.content = Some(bytes);
        self
    }

    /// Catalog view of this sighting.
    pub fn to_entry(&self) -> CatalogEntry {
        CatalogEntry {
            id: self.id.clone(),
            content_type: self.content_type.clone().unwrap_or_default(),
            locators: self.locators.clone(),
            metadata: self.metadata.clone(),
        }
    }
}
