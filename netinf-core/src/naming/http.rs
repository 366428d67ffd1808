//! Query-string wire form: `/publish`, `/retrieve`, `/search`.

use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use super::{metadata_field, parse_json, search_from_body, NamingClient};
use crate::catalog::CatalogEntry;
use crate::context::Context;
use crate::identity::ContentIdentifier;
use crate::locator::{Locator, Transport};
use crate::metadata::keys;
use crate::request::PublishRequest;
use crate::response::{PublishResponse, RetrieveResponse, Retrieved, SearchResponse, Status};

pub(super) async fn get(
    client: &NamingClient,
    id: &ContentIdentifier,
    ctx: &Context,
) -> RetrieveResponse {
    let req = client
        .http
        .get(client.url("/retrieve"))
        .query(&[("hash", id.hash()), ("hashAlg", id.hash_algorithm())]);
    let resp = match client.send(req, ctx).await {
        Ok(resp) => resp,
        Err(status) => return RetrieveResponse::failed(id.clone(), status),
    };
    if resp.status() != StatusCode::OK {
        debug!(%id, status = %resp.status(), "retrieve rejected");
        return RetrieveResponse::failed(id.clone(), Status::Failed);
    }
    let body = match client.body(resp, ctx).await {
        Ok(body) => body,
        Err(status) => return RetrieveResponse::failed(id.clone(), status),
    };
    match retrieved_entry(id, &body).await {
        Ok(entry) => RetrieveResponse::ok(id.clone(), Retrieved::Locators(entry)),
        Err(status) => {
            debug!(%id, ?status, "retrieve response unusable");
            RetrieveResponse::failed(id.clone(), status)
        }
    }
}

/// `{"filePath": ..., "contentType": ..., "metadata"?: {"meta": {...}}}`.
/// The path must exist on this device.
async fn retrieved_entry(id: &ContentIdentifier, body: &[u8]) -> Result<CatalogEntry, Status> {
    let value = parse_json(body)?;
    let obj = value.as_object().ok_or(Status::InvalidContent)?;
    let path = non_empty(obj.get("filePath")).ok_or(Status::NoFilePath)?;
    let content_type = non_empty(obj.get("contentType")).ok_or(Status::NoContentType)?;
    let metadata = metadata_field(obj, "metadata")?;
    if tokio::fs::metadata(path).await.is_err() {
        return Err(Status::FileDoesNotExist);
    }
    Ok(CatalogEntry::new(id.clone(), content_type)
        .with_locator(Locator::file_path(path))
        .with_metadata(metadata))
}

fn non_empty(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn publish_params(request: &PublishRequest) -> Vec<(String, String)> {
    let id = &request.id;
    let mut params = vec![
        ("hash".to_string(), id.hash().to_string()),
        ("hashAlg".to_string(), id.hash_algorithm().to_string()),
    ];
    for loc in &request.locators {
        if loc.transport() != Transport::FilePath {
            params.push((loc.transport().key().to_string(), loc.value().to_string()));
        }
    }
    if !request.metadata.is_empty() {
        params.push(("meta".to_string(), request.metadata.encode()));
    }
    if let Some(ct) = &request.content_type {
        params.push(("ct".to_string(), ct.clone()));
    }
    let path = request.metadata.get(keys::FILE_PATH).or_else(|| {
        request
            .locators
            .iter()
            .find(|l| l.transport() == Transport::FilePath)
            .map(Locator::value)
    });
    if let Some(path) = path {
        params.push(("filepath".to_string(), path.to_string()));
    }
    params
}

/// PUT for a metadata-only sighting, POST when the bytes go along.
pub(super) async fn put(
    client: &NamingClient,
    request: &PublishRequest,
    ctx: &Context,
) -> PublishResponse {
    let url = client.url("/publish");
    let params = publish_params(request);
    let req = match &request.content {
        Some(bytes) => client
            .http
            .post(url)
            .query(&params)
            .header(
                CONTENT_TYPE,
                request
                    .content_type
                    .as_deref()
                    .unwrap_or("application/octet-stream"),
            )
            .body(bytes.clone()),
        None => client.http.put(url).query(&params),
    };
    let resp = match client.send(req, ctx).await {
        Ok(resp) => resp,
        Err(status) => return PublishResponse::failed(request.id.clone(), status),
    };
    if resp.status() == StatusCode::OK {
        PublishResponse::ok(request.id.clone())
    } else {
        debug!(id = %request.id, status = %resp.status(), "publish rejected");
        PublishResponse::failed(request.id.clone(), Status::Failed)
    }
}

pub(super) async fn search(
    client: &NamingClient,
    token: &str,
    ext: &str,
    ctx: &Context,
) -> SearchResponse {
    let req = client
        .http
        .get(client.url("/search"))
        .query(&[("tokens", token), ("ext", ext)]);
    let resp = match client.send(req, ctx).await {
        Ok(resp) => resp,
        Err(status) => return SearchResponse::failed(token, status),
    };
    if resp.status() != StatusCode::OK {
        debug!(token, status = %resp.status(), "search rejected");
        return SearchResponse::failed(token, Status::Failed);
    }
    let body = match client.body(resp, ctx).await {
        Ok(body) => body,
        Err(status) => return SearchResponse::failed(token, status),
    };
    search_from_body(token, &body)
}
