//! NetInf content resolution core.
//! Hash-named content, federated search and resolution, transport dispatch,
//! and the fetch pipeline that falls back to the open Internet.

pub mod cache;
pub mod catalog;
pub mod chain;
pub mod context;
pub mod download;
pub mod events;
pub mod identity;
pub mod integrity;
pub mod locator;
pub mod metadata;
pub mod naming;
pub mod peer;
pub mod pipeline;
pub mod protocol;
pub mod request;
pub mod response;
pub mod search;
pub mod store;
pub mod transfer;
pub mod wire;

#[cfg(test)]
mod test_support;

pub use cache::{CacheError, LocalCache};
pub use catalog::CatalogEntry;
pub use chain::{ChainError, ResolutionBackend, ResolutionChain, Scope};
pub use context::Context;
pub use events::{Event, EventSink};
pub use identity::ContentIdentifier;
pub use locator::{Locator, LocatorSet, Transport};
pub use metadata::Metadata;
pub use naming::{Authority, NamingClient, Preferences, SharedPreferences, WireForm};
pub use pipeline::{FetchError, FetchOutcome, FetchPipeline, PublishOutcome, Source};
pub use protocol::{Message, PROTOCOL_VERSION};
pub use response::{PublishResponse, RetrieveResponse, SearchResponse, Status, StatusError};
pub use search::{SearchBackend, SearchFederation};
pub use transfer::{DispatchError, TransferDispatcher, TransportProvider};
pub use wire::{decode_frame, encode_frame, FrameError};
