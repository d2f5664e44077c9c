//! HTTP surface of the pricing service.
//!
//! | Method | Path | Body / query | Response |
//! |--------|------|--------------|----------|
//! | POST | `/optimize` | `{id, price, floor_price, ctx_hash?, <routing>?}` | `{optimized_price, status}` |
//! | POST | `/feedback` | `{id, price, impression}` | `{ack}` |
//! | GET | `/space` | `?ctx=<id>` | `{level: [{price, pr}]}` or `{}` |
//! | GET | `/health` | | `{status, contexts, ledger_entries}` |
//!
//! Malformed bodies and missing fields are 400, unknown contexts 400, a busy
//! pricing space 503.

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::logging::targets;
use crate::errors::Error;
use crate::optimizer::ledger::RoutingMetadata;
use crate::optimizer::PricingService;

/// Context used when a request does not name one.
pub const DEFAULT_CONTEXT: &str = "default_ctx";

#[derive(Debug, Deserialize)]
struct OptimizeBody {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    floor_price: Option<f64>,
    #[serde(default)]
    ctx_hash: Option<String>,
    #[serde(flatten)]
    metadata: RoutingMetadata,
}

/// Impression flags arrive as booleans or as 0/1.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl From<Flag> for bool {
    fn from(flag: Flag) -> bool {
        match flag {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeedbackBody {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    impression: Option<Flag>,
}

#[derive(Debug, Deserialize)]
struct SpaceQuery {
    ctx: Option<String>,
}

/// Error body `{"error": ...}` with its status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::UnknownContext(_) => StatusCode::BAD_REQUEST,
            Error::SpaceBusy { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(target: targets::HTTP, error = %e, "Invalid JSON body");
        ApiError::bad_request("Invalid JSON")
    })
}

fn missing_fields(prefix: &str, fields: &[(&str, bool)]) -> ApiError {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect();
    ApiError::bad_request(format!("{prefix}: {}", missing.join(", ")))
}

async fn optimize_handler(
    State(service): State<Arc<PricingService>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let OptimizeBody {
        id,
        price,
        floor_price,
        ctx_hash,
        metadata,
    } = parse_body(&body)?;
    let id = id.filter(|id| !id.is_empty());

    let (Some(id), Some(price), Some(floor_price)) = (id.as_deref(), price, floor_price) else {
        return Err(missing_fields(
            "Missing required fields",
            &[
                ("id", id.is_some()),
                ("price", price.is_some()),
                ("floor_price", floor_price.is_some()),
            ],
        ));
    };

    let context = ctx_hash.as_deref().unwrap_or(DEFAULT_CONTEXT);
    let response = service.optimize(id, context, price, floor_price, &metadata)?;
    Ok(Json(response))
}

async fn feedback_handler(
    State(service): State<Arc<PricingService>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let FeedbackBody {
        id,
        price,
        impression,
    } = parse_body(&body)?;
    let id = id.filter(|id| !id.is_empty());

    let (Some(id), Some(price), Some(impression)) = (id.as_deref(), price, impression) else {
        return Err(missing_fields(
            "Missing fields",
            &[
                ("id", id.is_some()),
                ("price", price.is_some()),
                ("impression", impression.is_some()),
            ],
        ));
    };

    // The space guard wait is blocking; keep it off the async workers
    let id = id.to_string();
    let impression: bool = impression.into();
    let ack = tokio::task::spawn_blocking(move || service.feedback(&id, price, impression))
        .await
        .map_err(|e| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("Feedback task failed: {e}"),
        })??;
    Ok(Json(json!({ "ack": ack })))
}

async fn space_handler(
    State(service): State<Arc<PricingService>>,
    Query(query): Query<SpaceQuery>,
) -> impl IntoResponse {
    let context = query.ctx.as_deref().unwrap_or(DEFAULT_CONTEXT);
    Json(service.curve_snapshot(context))
}

async fn health_handler(State(service): State<Arc<PricingService>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "contexts": service.context_count(),
        "ledger_entries": service.ledger().len(),
    }))
}

/// Build the application router.
pub fn router(service: Arc<PricingService>) -> Router {
    Router::new()
        .route("/optimize", post(optimize_handler))
        .route("/feedback", post(feedback_handler))
        .route("/space", get(space_handler))
        .route("/health", get(health_handler))
        .with_state(service)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    service: Arc<PricingService>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(target: targets::HTTP, %addr, "HTTP server listening");
    }
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}
