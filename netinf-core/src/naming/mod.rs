//! Remote naming backend: get/put/search against a naming service over HTTP.
//!
//! Two wire forms are spoken. [`WireForm::Http`] uses query-string endpoints
//! (`/publish`, `/retrieve`, `/search`); [`WireForm::NetInf`] posts multipart
//! forms to `/netinfproto/{get,publish,search}` and may return content inline.
//!
//! Failures never escape as errors: every call ends in a response with a
//! [`Status`]. Transport errors, timeouts and cancellation all map to
//! `Status::Failed` so callers fall back the same way for each.

pub mod http;
pub mod multipart;
pub mod netinf;

use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::chain::{ResolutionBackend, Scope};
use crate::context::Context;
use crate::events::{self, EventSink};
use crate::identity::ContentIdentifier;
use crate::metadata::Metadata;
use crate::request::{PublishRequest, Request};
use crate::response::{
    PublishResponse, Response, RetrieveResponse, SearchResponse, SearchResult, Status,
};
use crate::search::SearchBackend;

/// Host and port of a naming service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Authority {
    pub host: String,
    pub port: u16,
}

impl Authority {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// User preferences consulted on every call.
pub trait Preferences: Send + Sync {
    /// Overrides the configured naming service when set.
    fn naming_authority(&self) -> Option<Authority>;
}

/// Settable preferences shared between a settings surface and the client.
#[derive(Debug, Default)]
pub struct SharedPreferences {
    authority: RwLock<Option<Authority>>,
}

impl SharedPreferences {
    pub fn set_naming_authority(&self, authority: Option<Authority>) {
        if let Ok(mut a) = self.authority.write() {
            *a = authority;
        }
    }
}

impl Preferences for SharedPreferences {
    fn naming_authority(&self) -> Option<Authority> {
        self.authority.read().ok().and_then(|a| a.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireForm {
    #[default]
    Http,
    NetInf,
}

#[derive(Debug, thiserror::Error)]
pub enum NamingError {
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct NamingClient {
    http: reqwest::Client,
    authority: Authority,
    preferences: Option<Arc<dyn Preferences>>,
    form: WireForm,
    events: Arc<dyn EventSink>,
}

impl NamingClient {
    pub fn new(authority: Authority, form: WireForm) -> Result<Self, NamingError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            authority,
            preferences: None,
            form,
            events: events::noop(),
        })
    }

    pub fn with_preferences(mut self, preferences: Arc<dyn Preferences>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn form(&self) -> WireForm {
        self.form
    }

    /// The authority the next call goes to: the user's override, else the configured one.
    pub fn authority(&self) -> Authority {
        self.preferences
            .as_ref()
            .and_then(|p| p.naming_authority())
            .unwrap_or_else(|| self.authority.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.authority().base_url(), path)
    }

    pub async fn get(&self, id: &ContentIdentifier, ctx: &Context) -> RetrieveResponse {
        match self.form {
            WireForm::Http => http::get(self, id, ctx).await,
            WireForm::NetInf => netinf::get(self, id, ctx).await,
        }
    }

    /// Publish a sighting. With no locators there is nothing to tell peers,
    /// so this reports success without touching the network.
    pub async fn put(&self, request: &PublishRequest, ctx: &Context) -> PublishResponse {
        if request.locators.is_empty() {
            debug!(id = %request.id, "no locators, skipping publish");
            return PublishResponse::ok(request.id.clone());
        }
        match self.form {
            WireForm::Http => http::put(self, request, ctx).await,
            WireForm::NetInf => netinf::put(self, request, ctx).await,
        }
    }

    pub async fn search(&self, token: &str, ext: &str, ctx: &Context) -> SearchResponse {
        match self.form {
            WireForm::Http => http::search(self, token, ext, ctx).await,
            WireForm::NetInf => netinf::search(self, token, ext, ctx).await,
        }
    }

    pub async fn execute(&self, request: &Request, ctx: &Context) -> Response {
        match request {
            Request::Search { token, ext } => Response::Search(self.search(token, ext, ctx).await),
            Request::Retrieve { id } => Response::Retrieve(self.get(id, ctx).await),
            Request::Publish(p) => Response::Publish(self.put(p, ctx).await),
        }
    }

    /// Send under the context's timeout and cancellation. Any failure is `Failed`.
    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        ctx: &Context,
    ) -> Result<reqwest::Response, Status> {
        match ctx.run(builder.timeout(ctx.timeout()).send()).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(e)) => {
                warn!(authority = %self.authority(), error = %e, "naming service request failed");
                Err(Status::Failed)
            }
            Err(e) => {
                warn!(authority = %self.authority(), "naming service request {e}");
                Err(Status::Failed)
            }
        }
    }

    async fn body(&self, resp: reqwest::Response, ctx: &Context) -> Result<Bytes, Status> {
        match ctx.run(resp.bytes()).await {
            Ok(Ok(b)) => Ok(b),
            Ok(Err(e)) => {
                warn!(error = %e, "reading naming service response failed");
                Err(Status::Failed)
            }
            Err(e) => {
                warn!("reading naming service response {e}");
                Err(Status::Failed)
            }
        }
    }
}

/// Parse a JSON body. Empty means no entity; unparseable means invalid content.
fn parse_json(body: &[u8]) -> Result<Value, Status> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(Status::NoContent);
    }
    serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "response body is not JSON");
        Status::InvalidContent
    })
}

/// Optional wrapped metadata object under `key`.
fn metadata_field(obj: &serde_json::Map<String, Value>, key: &str) -> Result<Metadata, Status> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(Metadata::new()),
        Some(v) => Metadata::from_wrapped_value(v).map_err(|e| {
            debug!(error = %e, "bad metadata in response");
            Status::InvalidContent
        }),
    }
}

/// `{"results": [{"ni": "ni://alg;hash", "metadata": {"meta": {...}}}, ...]}`
fn parse_search_results(value: &Value) -> Result<Vec<SearchResult>, Status> {
    let items = value
        .get("results")
        .and_then(Value::as_array)
        .ok_or(Status::InvalidSearchResults)?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let obj = item.as_object().ok_or(Status::InvalidSearchResults)?;
        let ni = obj
            .get("ni")
            .and_then(Value::as_str)
            .ok_or(Status::InvalidSearchResults)?;
        let id = ContentIdentifier::parse(ni).map_err(|_| Status::InvalidSearchResults)?;
        let metadata = metadata_field(obj, "metadata").map_err(|_| Status::InvalidSearchResults)?;
        out.push(SearchResult { id, metadata });
    }
    Ok(out)
}

/// Search body to response, shared by both wire forms.
fn search_from_body(token: &str, body: &[u8]) -> SearchResponse {
    let parsed = parse_json(body)
        .map_err(|status| match status {
            Status::NoContent => Status::NoSearchResults,
            _ => Status::InvalidSearchResults,
        })
        .and_then(|value| parse_search_results(&value));
    match parsed {
        Ok(results) => SearchResponse::ok(token, results),
        Err(status) => {
            debug!(token, ?status, "search response unusable");
            SearchResponse::failed(token, status)
        }
    }
}

#[async_trait]
impl ResolutionBackend for NamingClient {
    fn name(&self) -> &str {
        "naming-service"
    }

    fn scope(&self) -> Scope {
        Scope::Network
    }

    async fn get(&self, id: &ContentIdentifier, ctx: &Context) -> RetrieveResponse {
        NamingClient::get(self, id, ctx).await
    }

    async fn put(&self, request: &PublishRequest, ctx: &Context) -> PublishResponse {
        NamingClient::put(self, request, ctx).await
    }

    async fn delete(&self, id: &ContentIdentifier, _ctx: &Context) -> Status {
        warn!(%id, "naming service has no delete operation");
        Status::Failed
    }
}

#[async_trait]
impl SearchBackend for NamingClient {
    fn name(&self) -> &str {
        "naming-service"
    }

    async fn search(&self, token: &str, ext: &str, ctx: &Context) -> SearchResponse {
        NamingClient::search(self, token, ext, ctx).await
    }
}
