use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::core::error::{DeliveryError, SourceError};
use crate::core::types::{ContainerId, MediaFile, MediaObject, MediaSlot, ObjectId};
use crate::descriptor::MediaDescriptor;
use crate::observability::metrics as obs;
use crate::source::{content_type_for_name, extension_for_mime, ObjectLookup, RemoteClient};
use crate::stream::fetch::{ChunkFetcher, FetchBudget};
use crate::stream::location::LocationHandle;
use crate::stream::range::{RangeRequest, RangeSpec};
use crate::stream::session::{stream_body, CloseReason, StreamSession};

use super::links::ShareLinks;
use super::router::AppState;

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    status: u16,
}

fn error_json(status: StatusCode, error: &str, message: &str) -> Response {
    let body = ErrorResponse {
        error: error.to_string(),
        message: message.to_string(),
        status: status.as_u16(),
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for DeliveryError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = error_json(status, self.error_code(), &self.to_string());
        if let DeliveryError::RangeNotSatisfiable { total_size } = self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", total_size)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }
        response
    }
}

// ---------------------------------------------------------------------------
// Service endpoints
// ---------------------------------------------------------------------------

/// `GET /`: plain liveness text.
pub async fn home() -> &'static str {
    "seekbridge is running"
}

/// `GET /healthz`: liveness probe.
pub async fn healthz<R: RemoteClient>(State(state): State<AppState<R>>) -> Json<serde_json::Value> {
    let uptime = state.start_time.elapsed().as_secs();
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /metrics`: Prometheus text exposition.
pub async fn metrics_handler<R: RemoteClient>(State(state): State<AppState<R>>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            handle.render(),
        )
            .into_response(),
        None => error_json(
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics_disabled",
            "Metrics collection is disabled.",
        ),
    }
}

// ---------------------------------------------------------------------------
// Stream endpoint
// ---------------------------------------------------------------------------

/// `GET|HEAD /stream/{container_id}/{object_id}`
pub async fn stream_media<R: RemoteClient>(
    State(state): State<AppState<R>>,
    method: Method,
    Path((container_id, object_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let response = serve_stream(
        &state,
        &container_id,
        &object_id,
        range_header,
        method == Method::HEAD,
    )
    .await;
    obs::inc_http_request("stream", response.status().as_u16());
    response
}

/// Everything needed to answer a stream request, computed before any header
/// is committed.
#[derive(Debug, Clone)]
pub struct StreamPlan {
    pub location: LocationHandle,
    pub total_size: u64,
    pub file_name: String,
    pub mime_type: String,
    pub request: RangeRequest,
    /// Interval to send. `None` only for an empty object served whole.
    pub span: Option<RangeSpec>,
}

impl StreamPlan {
    pub fn status(&self) -> StatusCode {
        match self.request {
            RangeRequest::Partial(_) => StatusCode::PARTIAL_CONTENT,
            _ => StatusCode::OK,
        }
    }

    pub fn content_length(&self) -> u64 {
        self.span.map_or(0, |span| span.len())
    }
}

async fn serve_stream<R: RemoteClient>(
    state: &AppState<R>,
    raw_container_id: &str,
    raw_object_id: &str,
    range_header: Option<&str>,
    head_only: bool,
) -> Response {
    let (container_id, object_id) = match parse_ids(raw_container_id, raw_object_id) {
        Ok(ids) => ids,
        Err(e) => return e.into_response(),
    };

    let mut session = StreamSession::begin(container_id, object_id);

    let prepared = prepare_stream(state.remote.as_ref(), container_id, object_id, range_header)
        .await
        .and_then(|plan| stream_headers(&plan).map(|headers| (plan, headers)));
    let (plan, response_headers) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            session.close(CloseReason::Rejected(e.status_code()));
            return e.into_response();
        }
    };

    let status = plan.status();
    session.headers_sent(plan.content_length());
    info!(
        %container_id,
        %object_id,
        location = %plan.location,
        status = status.as_u16(),
        start = plan.span.map(|s| s.start),
        end = plan.span.map(|s| s.end),
        total = plan.total_size,
        "streaming media"
    );

    let body = match plan.span {
        Some(span) if !head_only => {
            let fetcher = ChunkFetcher::new(
                Arc::clone(&state.remote),
                plan.location,
                FetchBudget::new(span.start, span.len()),
                state.config.streaming.chunk_size_bytes,
            );
            Body::from_stream(stream_body(session, fetcher))
        }
        _ => {
            session.close(CloseReason::Completed);
            Body::empty()
        }
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}

fn parse_ids(
    raw_container_id: &str,
    raw_object_id: &str,
) -> Result<(ContainerId, ObjectId), DeliveryError> {
    let container_id = raw_container_id
        .parse::<ContainerId>()
        .map_err(|_| DeliveryError::InvalidIdentifier {
            value: raw_container_id.to_string(),
        })?;
    let object_id = raw_object_id
        .parse::<ObjectId>()
        .map_err(|_| DeliveryError::InvalidIdentifier {
            value: raw_object_id.to_string(),
        })?;
    Ok((container_id, object_id))
}

async fn lookup<L: ObjectLookup>(
    remote: &L,
    container_id: ContainerId,
    object_id: ObjectId,
) -> Result<MediaObject, DeliveryError> {
    let started = Instant::now();
    let result = remote.lookup_object(container_id, object_id).await;
    obs::record_lookup_duration(started.elapsed().as_secs_f64());

    result.map_err(|e| {
        obs::inc_lookup_error();
        match e {
            SourceError::ObjectNotFound { .. } => {
                debug!(%container_id, %object_id, "object not found")
            }
            other => warn!(%container_id, %object_id, error = %other, "object lookup failed"),
        }
        DeliveryError::ObjectNotFound {
            container_id,
            object_id,
        }
    })
}

/// Resolve a request into a [`StreamPlan`]: lookup, media selection,
/// descriptor decode, location resolution and range interpretation.
pub async fn prepare_stream<L: ObjectLookup>(
    remote: &L,
    container_id: ContainerId,
    object_id: ObjectId,
    range_header: Option<&str>,
) -> Result<StreamPlan, DeliveryError> {
    let object = lookup(remote, container_id, object_id).await?;
    let (slot, file) = object.primary_media().ok_or(DeliveryError::NoMedia {
        container_id,
        object_id,
    })?;

    let location = MediaDescriptor::decode(&file.file_ref)
        .and_then(|descriptor| LocationHandle::resolve(&descriptor))
        .map_err(|e| {
            warn!(%container_id, %object_id, error = %e, "media reference is unusable");
            DeliveryError::UnusableMedia {
                reason: e.to_string(),
            }
        })?;

    let (file_name, mime_type) = describe_media(slot, object_id, file);
    let total_size = file.file_size;

    let request = RangeRequest::parse(range_header, total_size);
    if request == RangeRequest::Unsatisfiable {
        return Err(DeliveryError::RangeNotSatisfiable { total_size });
    }
    let span = request.resolve(total_size);

    Ok(StreamPlan {
        location,
        total_size,
        file_name,
        mime_type,
        request,
        span,
    })
}

/// File name and MIME type with fallbacks applied.
pub fn describe_media(slot: MediaSlot, object_id: ObjectId, file: &MediaFile) -> (String, String) {
    let mime_type = file
        .mime_type
        .as_deref()
        .filter(|m| !m.is_empty())
        .or_else(|| file.file_name.as_deref().and_then(content_type_for_name))
        .unwrap_or(slot.default_mime_type())
        .to_string();

    let file_name = match file.file_name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => format!(
            "{}_{}.{}",
            slot.as_str(),
            object_id,
            extension_for_mime(&mime_type)
        ),
    };
    (file_name, mime_type)
}

fn stream_headers(plan: &StreamPlan) -> Result<HeaderMap, DeliveryError> {
    let invalid = |name: &str| DeliveryError::Internal {
        reason: format!("cannot encode {} header", name),
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&plan.mime_type).map_err(|_| invalid("Content-Type"))?,
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(plan.content_length()),
    );
    if let RangeRequest::Partial(spec) = plan.request {
        headers.insert(
            header::CONTENT_RANGE,
            HeaderValue::from_str(&spec.content_range(plan.total_size))
                .map_err(|_| invalid("Content-Range"))?,
        );
    }
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_bytes(content_disposition(&plan.file_name).as_bytes())
            .map_err(|_| invalid("Content-Disposition"))?,
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    Ok(headers)
}

/// `inline; filename="<name>"` with quotes escaped and control characters dropped.
fn content_disposition(file_name: &str) -> String {
    let mut escaped = String::with_capacity(file_name.len());
    for c in file_name.chars().filter(|c| !c.is_control()) {
        if c == '"' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("inline; filename=\"{}\"", escaped)
}

// ---------------------------------------------------------------------------
// Share links
// ---------------------------------------------------------------------------

/// `GET /links/{container_id}/{object_id}`
pub async fn share_links<R: RemoteClient>(
    State(state): State<AppState<R>>,
    Path((container_id, object_id)): Path<(String, String)>,
) -> Response {
    let response = match build_share_links(&state, &container_id, &object_id).await {
        Ok(links) => Json(links).into_response(),
        Err(e) => {
            if matches!(e, DeliveryError::LinksUnavailable) {
                error!("share links requested but links.public_base_url is not set");
            }
            e.into_response()
        }
    };
    obs::inc_http_request("links", response.status().as_u16());
    response
}

async fn build_share_links<R: RemoteClient>(
    state: &AppState<R>,
    raw_container_id: &str,
    raw_object_id: &str,
) -> Result<ShareLinks, DeliveryError> {
    let (container_id, object_id) = parse_ids(raw_container_id, raw_object_id)?;
    let links = &state.config.links;
    if links.public_base_url.trim().is_empty() {
        return Err(DeliveryError::LinksUnavailable);
    }

    let object = lookup(state.remote.as_ref(), container_id, object_id).await?;
    let (slot, file) = object.primary_media().ok_or(DeliveryError::NoMedia {
        container_id,
        object_id,
    })?;
    let (file_name, _) = describe_media(slot, object_id, file);

    Ok(ShareLinks::build(
        &links.public_base_url,
        &links.player_url,
        container_id,
        object_id,
        &file_name,
    ))
}
