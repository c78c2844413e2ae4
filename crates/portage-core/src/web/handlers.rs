//! HTTP endpoint handlers for the replication coordination service.

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use futures::stream;
use serde::Deserialize;

use crate::discovery::{discover_targets, SyncTarget};
use crate::error::Error;
use crate::geo::{import_body, Bbox, ImportOutcome};

use super::error::{ApiError, ApiResult};
use super::state::SharedState;

/// Request body for `POST /replicate`.
#[derive(Debug, Deserialize)]
pub struct ReplicateRequest {
    /// Path of the removable medium to replicate against
    pub source: String,
}

/// POST /replicate - start a replication pass.
///
/// The 200 response only acknowledges that replication **started**; the
/// eventual outcome is delivered exclusively on the push channel. Callers
/// must not treat this response as success.
pub async fn replicate(State(state): State<SharedState>, body: Bytes) -> ApiResult<String> {
    let request: ReplicateRequest = serde_json::from_slice(&body)
        .map_err(|e| Error::MalformedRequest(format!("bad replicate body: {e}")))?;
    state.coordinator.start(request.source)?;
    Ok("replication started\n".to_string())
}

/// GET /export.geojson - streamed feature export scoped by bbox.
///
/// Any omitted bound defaults to unbounded, so a bare request exports the
/// full dataset.
pub async fn export_geojson(
    State(state): State<SharedState>,
    Query(bbox): Query<Bbox>,
) -> ApiResult<Response> {
    let features = state.features.export(&bbox)?;
    let total = features.len();

    // One chunk per feature, rendered as the stream is polled, so the
    // response body is never materialized in full.
    let chunks = std::iter::once(String::from(
        "{\"type\":\"FeatureCollection\",\"features\":[\n",
    ))
    .chain(features.into_iter().enumerate().map(move |(i, feature)| {
        let mut line = feature.to_geojson().to_string();
        if i + 1 < total {
            line.push(',');
        }
        line.push('\n');
        line
    }))
    .chain(std::iter::once(String::from("]}\n")));

    let body = Body::from_stream(stream::iter(chunks.map(Ok::<_, std::convert::Infallible>)));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/geo+json")
        .body(body)
        .map_err(|e| ApiError::internal(e.to_string()))
}

/// PUT|POST /import.shp - bulk feature import.
///
/// Always responds 200 with an `errors` array; collections are imported
/// independently and per-collection failures are aggregated into the body
/// instead of an error status. Callers must inspect the body, not the
/// status code. Only a body that fails conversion as a whole gets a 400.
pub async fn import_features(
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<Json<ImportOutcome>> {
    let outcome = import_body(state.features.as_ref(), &body)?;
    if !outcome.errors.is_empty() {
        tracing::warn!(errors = outcome.errors.len(), "partial import failure");
    }
    Ok(Json(outcome))
}

/// GET /sync_targets - currently mounted replication targets.
pub async fn sync_targets(State(state): State<SharedState>) -> ApiResult<Json<Vec<SyncTarget>>> {
    let targets = discover_targets(&state.discovery)?;
    Ok(Json(targets))
}

/// Fallback for unmatched routes.
pub async fn not_found() -> ApiError {
    ApiError::not_found()
}
