//! Response types for Search, Retrieve and Publish.
//!
//! Every response carries a [`Status`]. Payload accessors return
//! [`StatusError`] unless the status is `Ok` and a payload was set, so a caller
//! can never read an absent payload as if it were empty.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogEntry;
use crate::identity::ContentIdentifier;
use crate::metadata::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Status {
    Ok,
    /// Transport or HTTP failure, including timeouts.
    Failed,
    NoContent,
    InvalidContent,
    NoFilePath,
    NoContentType,
    FileDoesNotExist,
    NoSearchResults,
    InvalidSearchResults,
    /// Request built but never sent.
    #[default]
    NotExecuted,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

/// A payload accessor was called on a response that does not carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("response has no payload (status {0:?})")]
pub struct StatusError(pub Status);

fn gate<T>(status: Status, payload: Option<&T>) -> Result<&T, StatusError> {
    match (status, payload) {
        (Status::Ok, Some(p)) => Ok(p),
        (status, _) => Err(StatusError(status)),
    }
}

/// What a successful retrieve produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieved {
    /// Only where the bytes are; a transfer dispatch must follow.
    Locators(CatalogEntry),
    /// Bytes arrived with the answer.
    Content { entry: CatalogEntry, bytes: Bytes },
}

impl Retrieved {
    pub fn entry(&self) -> &CatalogEntry {
        match self {
            Retrieved::Locators(entry) | Retrieved::Content { entry, .. } => entry,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrieveResponse {
    id: ContentIdentifier,
    status: Status,
    retrieved: Option<Retrieved>,
}

impl RetrieveResponse {
    pub fn not_executed(id: ContentIdentifier) -> Self {
        Self {
            id,
            status: Status::NotExecuted,
            retrieved: None,
        }
    }

    pub fn ok(id: ContentIdentifier, retrieved: Retrieved) -> Self {
        Self {
            id,
            status: Status::Ok,
            retrieved: Some(retrieved),
        }
    }

    pub fn failed(id: ContentIdentifier, status: Status) -> Self {
        debug_assert!(!status.is_ok(), "failed() needs a failure status");
        Self {
            id,
            status,
            retrieved: None,
        }
    }

    pub fn id(&self) -> &ContentIdentifier {
        &self.id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn retrieved(&self) -> Result<&Retrieved, StatusError> {
        gate(self.status, self.retrieved.as_ref())
    }

    pub fn into_retrieved(self) -> Result<Retrieved, StatusError> {
        match (self.status, self.retrieved) {
            (Status::Ok, Some(r)) => Ok(r),
            (status, _) => Err(StatusError(status)),
        }
    }

    pub fn content_type(&self) -> Result<&str, StatusError> {
        self.retrieved().map(|r| r.entry().content_type.as_str())
    }

    /// Inline bytes, if the content arrived with the answer.
    pub fn bytes(&self) -> Result<Option<&Bytes>, StatusError> {
        self.retrieved().map(|r| match r {
            Retrieved::Content { bytes, .. } => Some(bytes),
            Retrieved::Locators(_) => None,
        })
    }
}

/// One candidate from a search. There is no ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub id: ContentIdentifier,
    pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub struct SearchResponse {
    token: String,
    status: Status,
    results: Option<Vec<SearchResult>>,
}

impl SearchResponse {
    pub fn not_executed(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            status: Status::NotExecuted,
            results: None,
        }
    }

    /// An empty list is a normal outcome, not an error.
    pub fn ok(token: impl Into<String>, results: Vec<SearchResult>) -> Self {
        Self {
            token: token.into(),
            status: Status::Ok,
            results: Some(results),
        }
    }

    pub fn failed(token: impl Into<String>, status: Status) -> Self {
        debug_assert!(!status.is_ok(), "failed() needs a failure status");
        Self {
            token: token.into(),
            status,
            results: None,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn results(&self) -> Result<&[SearchResult], StatusError> {
        gate(self.status, self.results.as_ref()).map(Vec::as_slice)
    }

    /// Ok with at least one result.
    pub fn has_results(&self) -> bool {
        self.results().map(|r| !r.is_empty()).unwrap_or(false)
    }

    /// The candidate the fetch pipeline resolves next: always index 0.
    pub fn first(&self) -> Result<Option<&SearchResult>, StatusError> {
        self.results().map(|r| r.first())
    }
}

#[derive(Debug, Clone)]
pub struct PublishResponse {
    id: ContentIdentifier,
    status: Status,
}

impl PublishResponse {
    pub fn not_executed(id: ContentIdentifier) -> Self {
        Self {
            id,
            status: Status::NotExecuted,
        }
    }

    pub fn ok(id: ContentIdentifier) -> Self {
        Self {
            id,
            status: Status::Ok,
        }
    }

    pub fn failed(id: ContentIdentifier, status: Status) -> Self {
        debug_assert!(!status.is_ok(), "failed() needs a failure status");
        Self { id, status }
    }

    pub fn id(&self) -> &ContentIdentifier {
        &self.id
    }

    pub fn status(&self) -> Status {
        self.status
    }
}

/// Any of the three responses, as returned by a dispatch on [`crate::request::Request`].
#[derive(Debug, Clone)]
pub enum Response {
    Search(SearchResponse),
    Retrieve(RetrieveResponse),
    Publish(PublishResponse),
}

impl Response {
    pub fn status(&self) -> Status {
        match self {
            Response::Search(r) => r.status(),
            Response::Retrieve(r) => r.status(),
            Response::Publish(r) => r.status(),
        }
    }
}
