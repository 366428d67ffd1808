//! NetInf wire form: multipart POSTs to `/netinfproto/{get,publish,search}`.
//!
//! A `get` answered with 203 carries only locators; 200 carries a multipart
//! body whose first part is the JSON description and whose second part is
//! the content itself.

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::multipart;
use super::{metadata_field, parse_json, search_from_body, NamingClient};
use crate::catalog::CatalogEntry;
use crate::context::Context;
use crate::events::Event;
use crate::identity::ContentIdentifier;
use crate::locator::{Locator, LocatorSet, Transport};
use crate::request::{new_message_id, PublishRequest};
use crate::response::{PublishResponse, RetrieveResponse, Retrieved, SearchResponse, Status};

const LOCATORS_ONLY: StatusCode = StatusCode::NON_AUTHORITATIVE_INFORMATION;

pub(super) async fn get(
    client: &NamingClient,
    id: &ContentIdentifier,
    ctx: &Context,
) -> RetrieveResponse {
    let form = Form::new()
        .text("URI", id.to_netinf_uri())
        .text("msgid", new_message_id())
        .text("ext", "");
    let req = client.http.post(client.url("/netinfproto/get")).multipart(form);
    let resp = match client.send(req, ctx).await {
        Ok(resp) => resp,
        Err(status) => return RetrieveResponse::failed(id.clone(), status),
    };
    let code = resp.status();
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if code != StatusCode::OK && code != LOCATORS_ONLY {
        debug!(%id, status = %code, "netinf get rejected");
        return RetrieveResponse::failed(id.clone(), Status::Failed);
    }
    let body = match client.body(resp, ctx).await {
        Ok(body) => body,
        Err(status) => return RetrieveResponse::failed(id.clone(), status),
    };

    let retrieved = if code == LOCATORS_ONLY {
        locators_only(id, &body)
    } else {
        with_content(id, content_type.as_deref(), body)
    };
    match retrieved {
        Ok(retrieved) => {
            if matches!(retrieved, Retrieved::Content { .. }) {
                client.events.emit(Event::UsingNamingService { id: id.clone() });
            }
            RetrieveResponse::ok(id.clone(), retrieved)
        }
        Err(status) => {
            debug!(%id, ?status, "netinf get response unusable");
            RetrieveResponse::failed(id.clone(), status)
        }
    }
}

/// `{"loc": [uri, ...], "ct": ..., "metadata"?: {"meta": {...}}}`.
fn describe(id: &ContentIdentifier, obj: &Map<String, Value>) -> Result<CatalogEntry, Status> {
    let content_type = obj
        .get("ct")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(Status::NoContentType)?;
    let metadata = metadata_field(obj, "metadata")?;
    let locators: LocatorSet = obj
        .get("loc")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter_map(Locator::parse_uri)
        .collect();
    let mut entry = CatalogEntry::new(id.clone(), content_type).with_metadata(metadata);
    entry.locators = locators;
    Ok(entry)
}

fn locators_only(id: &ContentIdentifier, body: &[u8]) -> Result<Retrieved, Status> {
    let value = parse_json(body)?;
    let obj = value.as_object().ok_or(Status::InvalidContent)?;
    let entry = describe(id, obj)?;
    if entry.locators.is_empty() {
        return Err(Status::NoContent);
    }
    Ok(Retrieved::Locators(entry))
}

fn with_content(
    id: &ContentIdentifier,
    content_type: Option<&str>,
    body: Bytes,
) -> Result<Retrieved, Status> {
    let boundary = content_type
        .and_then(multipart::boundary)
        .ok_or(Status::InvalidContent)?;
    let parts = multipart::parse(&body, &boundary).map_err(|e| {
        debug!(%id, error = %e, "bad multipart body");
        Status::InvalidContent
    })?;
    let mut parts = parts.into_iter();
    let (Some(description), Some(content)) = (parts.next(), parts.next()) else {
        return Err(Status::NoContent);
    };
    let value = parse_json(&description.body)?;
    let obj = value.as_object().ok_or(Status::InvalidContent)?;
    let entry = describe(id, obj)?;
    Ok(Retrieved::Content {
        entry,
        bytes: content.body,
    })
}

pub(super) async fn put(
    client: &NamingClient,
    request: &PublishRequest,
    ctx: &Context,
) -> PublishResponse {
    let id = &request.id;
    let mut form = Form::new()
        .text("URI", id.to_netinf_uri())
        .text("msgid", new_message_id())
        .text("ext", request.metadata.encode())
        .text("fullPut", request.content.is_some().to_string())
        .text("rform", "json");
    let shared = request
        .locators
        .iter()
        .filter(|l| l.transport() != Transport::FilePath);
    for (n, loc) in shared.enumerate() {
        form = form.text(format!("loc{}", n + 1), loc.to_uri());
    }
    if let Some(ct) = &request.content_type {
        form = form.text("ct", ct.clone());
    }
    if let Some(bytes) = &request.content {
        let part = Part::bytes(bytes.to_vec()).file_name(id.hash().to_string());
        let mime = request.content_type.as_deref().unwrap_or("application/octet-stream");
        let part = match part.mime_str(mime) {
            Ok(part) => part,
            Err(e) => {
                warn!(%id, mime, error = %e, "unusable content type, sending as octets");
                Part::bytes(bytes.to_vec()).file_name(id.hash().to_string())
            }
        };
        form = form.part("octets", part);
    }

    let req = client
        .http
        .post(client.url("/netinfproto/publish"))
        .multipart(form);
    let resp = match client.send(req, ctx).await {
        Ok(resp) => resp,
        Err(status) => return PublishResponse::failed(id.clone(), status),
    };
    match resp.status() {
        StatusCode::OK | StatusCode::CREATED => PublishResponse::ok(id.clone()),
        other => {
            debug!(%id, status = %other, "netinf publish rejected");
            PublishResponse::failed(id.clone(), Status::Failed)
        }
    }
}

pub(super) async fn search(
    client: &NamingClient,
    token: &str,
    ext: &str,
    ctx: &Context,
) -> SearchResponse {
    let form = Form::new()
        .text("tokens", token.to_string())
        .text("msgid", new_message_id())
        .text("ext", ext.to_string())
        .text("rform", "json");
    let req = client
        .http
        .post(client.url("/netinfproto/search"))
        .multipart(form);
    let resp = match client.send(req, ctx).await {
        Ok(resp) => resp,
        Err(status) => return SearchResponse::failed(token, status),
    };
    if resp.status() != StatusCode::OK {
        debug!(token, status = %resp.status(), "netinf search rejected");
        return SearchResponse::failed(token, Status::Failed);
    }
    match client.body(resp, ctx).await {
        Ok(body) => search_from_body(token, &body),
        Err(status) => SearchResponse::failed(token, status),
    }
}
