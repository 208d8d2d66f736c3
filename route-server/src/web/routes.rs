//! HTTP route handlers.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::planner::{RouteError, RouteFinder};

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/arrival_time", get(arrival_time))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Arrival time for a route through the given stations.
async fn arrival_time(
    State(state): State<AppState>,
    Query(req): Query<ArrivalTimeRequest>,
) -> Result<Json<ArrivalTimeResponse>, AppError> {
    let request = req
        .to_route_request(state.timezone, state.route.upper_bound_wait_mins)
        .map_err(|message| AppError::BadRequest { message })?;

    let finder = RouteFinder::new(&*state.cache, &*state.fetcher, &*state.route);
    let itinerary = finder.find_route(&request).await?;

    Ok(Json(ArrivalTimeResponse::from_itinerary(
        &itinerary,
        state.timezone,
    )))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest { message: String },
    NotFound { message: String },
    BadGateway { message: String },
    Internal { message: String },
}

impl From<RouteError> for AppError {
    fn from(e: RouteError) -> Self {
        let message = e.to_string();
        match e {
            RouteError::InvalidRequest(_) => AppError::BadRequest { message },
            RouteError::RouteNotFound { .. } | RouteError::ExcessiveWait { .. } => {
                AppError::NotFound { message }
            }
            RouteError::UpstreamUnavailable(_) | RouteError::DataUnavailable { .. } => {
                AppError::BadGateway { message }
            }
            RouteError::Store(_) => AppError::Internal { message },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest { message } => (StatusCode::BAD_REQUEST, message),
            AppError::NotFound { message } => (StatusCode::NOT_FOUND, message),
            AppError::BadGateway { message } => (StatusCode::BAD_GATEWAY, message),
            AppError::Internal { message } => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        if status.is_server_error() {
            error!(%status, %message, "Request failed");
        } else {
            warn!(%status, %message, "Request rejected");
        }

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}
