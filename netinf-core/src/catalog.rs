//! Catalog entries: the durable record kept per content identifier.

use crate::identity::ContentIdentifier;
use crate::locator::{Locator, LocatorSet, Transport};
use crate::metadata::Metadata;

/// Content type, locators and metadata known for one identifier.
///
/// Merging keeps exactly one content type (last writer wins) while locators
/// and source URLs only ever grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: ContentIdentifier,
    pub content_type: String,
    pub locators: LocatorSet,
    pub metadata: Metadata,
}

impl CatalogEntry {
    pub fn new(id: ContentIdentifier, content_type: impl Into<String>) -> Self {
        Self {
            id,
            content_type: content_type.into(),
            locators: LocatorSet::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.locators.insert(locator);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn urls(&self) -> Vec<&str> {
        self.metadata.urls()
    }

    /// First on-device path, if any.
    pub fn file_path(&self) -> Option<&str> {
        self.locators
            .iter()
            .find(|l| l.transport() == Transport::FilePath)
            .map(Locator::value)
    }

    /// Fold a later sighting of the same content into this entry.
    pub fn merge(&mut self, later: &CatalogEntry) {
        debug_assert_eq!(self.id, later.id);
        if !later.content_type.is_empty() {
            self.content_type = later.content_type.clone();
        }
        self.locators.extend(later.locators.iter().cloned());
        self.metadata.merge(&later.metadata);
    }
}
