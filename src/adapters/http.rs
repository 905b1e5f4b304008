//! Admin HTTP API.
//!
//! - `PATCH /api/admin/{kind}/{id}` - partial update, moving featured slots as needed
//! - `POST /api/admin/{kind}/{id}/release` - stop featuring a listing
//! - `GET /api/admin/{kind}` - full ordered collection
//! - `GET /healthz` - liveness check

use crate::core::featured::{FeaturedOutcome, FeaturedService};
use crate::domain::model::{ListingId, ListingKind, ListingPatch};
use crate::domain::ports::ListingStore;
use crate::utils::error::SlotError;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Error response carrying the admin-facing message for one listing kind.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn from_slot_error(kind: Option<ListingKind>, err: SlotError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = match kind {
            Some(kind) => err.message_for(kind),
            None => err.user_friendly_message(),
        };
        Self { status, message }
    }

    fn bad_body(rejection: JsonRejection) -> Self {
        debug!(error = %rejection.body_text(), "Rejected request body");
        Self {
            status: rejection.status(),
            message: "Geçersiz istek gövdesi".to_string(),
        }
    }

    fn unknown_kind(segment: &str) -> Self {
        debug!(segment, "Unknown listing kind in path");
        Self {
            status: StatusCode::NOT_FOUND,
            message: "Kayıt bulunamadı".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn parse_kind(segment: &str) -> Result<ListingKind, ApiError> {
    ListingKind::from_path_segment(segment).ok_or_else(|| ApiError::unknown_kind(segment))
}

fn outcome_response(kind: ListingKind, outcome: FeaturedOutcome) -> Result<Response, ApiError> {
    let body = outcome
        .to_json()
        .map_err(|e| ApiError::from_slot_error(Some(kind), e))?;
    Ok((StatusCode::OK, Json(body)).into_response())
}

/// Build the admin router over a shared featured service.
pub fn create_router<S>(service: Arc<FeaturedService<S>>) -> Router
where
    S: ListingStore + 'static,
{
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/admin/{kind}", get(list_listings::<S>))
        .route("/api/admin/{kind}/{id}", patch(patch_listing::<S>))
        .route("/api/admin/{kind}/{id}/release", post(release_listing::<S>))
        .with_state(service)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn patch_listing<S: ListingStore + 'static>(
    State(service): State<Arc<FeaturedService<S>>>,
    Path((segment, id)): Path<(String, ListingId)>,
    payload: Result<Json<ListingPatch>, JsonRejection>,
) -> Result<Response, ApiError> {
    let kind = parse_kind(&segment)?;
    let Json(patch) = payload.map_err(ApiError::bad_body)?;
    debug!(kind = %kind, listing_id = id, ?patch, "PATCH listing");

    let outcome = service
        .apply(kind, id, patch)
        .await
        .map_err(|e| ApiError::from_slot_error(Some(kind), e))?;
    outcome_response(kind, outcome)
}

async fn release_listing<S: ListingStore + 'static>(
    State(service): State<Arc<FeaturedService<S>>>,
    Path((segment, id)): Path<(String, ListingId)>,
) -> Result<Response, ApiError> {
    let kind = parse_kind(&segment)?;

    let outcome = service
        .release(kind, id)
        .await
        .map_err(|e| ApiError::from_slot_error(Some(kind), e))?;
    outcome_response(kind, outcome)
}

async fn list_listings<S: ListingStore + 'static>(
    State(service): State<Arc<FeaturedService<S>>>,
    Path(segment): Path<String>,
) -> Result<Response, ApiError> {
    let kind = parse_kind(&segment)?;

    let all = service
        .collection(kind)
        .await
        .map_err(|e| ApiError::from_slot_error(Some(kind), e))?;
    let mut body = serde_json::Map::new();
    body.insert(
        kind.collection_name().to_string(),
        serde_json::to_value(all).map_err(|e| ApiError::from_slot_error(Some(kind), e.into()))?,
    );
    Ok((StatusCode::OK, Json(serde_json::Value::Object(body))).into_response())
}

/// Serve the admin API until `shutdown` resolves.
pub async fn run_server<S, F>(
    service: Arc<FeaturedService<S>>,
    addr: SocketAddr,
    shutdown: F,
) -> std::io::Result<()>
where
    S: ListingStore + 'static,
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = create_router(service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Starting admin API server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
