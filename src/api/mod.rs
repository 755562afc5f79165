use axum::{
    extract::{rejection::QueryRejection, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, warn};

use crate::analytics::{self, DEFAULT_PAGE_SIZE, DEFAULT_WINDOW_DAYS};
use crate::domain::PageType;
use crate::error::Error;
use crate::ingress;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct VisitorsQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub page_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }
    }
}

/// Envelope for a failed request. Internal details stay in the logs.
fn failure(err: Error, context: &str) -> Response {
    match err {
        Error::InvalidQuery(msg) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::error(&msg)),
        )
            .into_response(),
        Error::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()>::error("Unauthorized")),
        )
            .into_response(),
        other => {
            error!("{}: {}", context, other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error(context)),
            )
                .into_response()
        }
    }
}

/// Maps a malformed query string onto the 400 envelope.
fn parse_query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, Response> {
    query
        .map(|Query(inner)| inner)
        .map_err(|rejection| failure(Error::InvalidQuery(rejection.body_text()), "Invalid query"))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Admin gate for the read-side routes. Rejects before any query runs.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.settings.admin_token.as_deref() else {
        warn!("Admin token not configured, rejecting {}", request.uri().path());
        return failure(Error::Unauthorized, "Unauthorized");
    };

    match bearer_token(request.headers()) {
        Some(token) if token == expected => next.run(request).await,
        _ => failure(Error::Unauthorized, "Unauthorized"),
    }
}

/// GET /api/analytics/stats
pub async fn get_stats(
    State(state): State<AppState>,
    query: Result<Query<StatsQuery>, QueryRejection>,
) -> Response {
    let query = match parse_query(query) {
        Ok(query) => query,
        Err(response) => return response,
    };
    let days = query.days.unwrap_or(DEFAULT_WINDOW_DAYS);

    match analytics::build_stats(&state.pool, days, Utc::now()).await {
        Ok(report) => Json(ApiResponse::success(report)).into_response(),
        Err(e) => failure(e, "Failed to compute stats"),
    }
}

/// GET /api/analytics/visitors
pub async fn list_visitors(
    State(state): State<AppState>,
    query: Result<Query<VisitorsQuery>, QueryRejection>,
) -> Response {
    let query = match parse_query(query) {
        Ok(query) => query,
        Err(response) => return response,
    };
    let page_type = query
        .page_type
        .as_deref()
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(PageType::from);

    match analytics::list_visitors(
        &state.pool,
        query.page.unwrap_or(1),
        query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        page_type.as_ref(),
    )
    .await
    {
        Ok(page) => Json(ApiResponse::success(page)).into_response(),
        Err(e) => failure(e, "Failed to list visitors"),
    }
}

/// GET /api/analytics/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    query: Result<Query<SessionsQuery>, QueryRejection>,
) -> Response {
    let query = match parse_query(query) {
        Ok(query) => query,
        Err(response) => return response,
    };
    match analytics::list_sessions(
        &state.pool,
        query.page.unwrap_or(1),
        query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
    )
    .await
    {
        Ok(page) => Json(ApiResponse::success(page)).into_response(),
        Err(e) => failure(e, "Failed to list sessions"),
    }
}

/// Full HTTP surface: the public track endpoint plus the gated read side.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_origin(Any);

    let admin = Router::new()
        .route("/api/analytics/stats", get(get_stats))
        .route("/api/analytics/visitors", get(list_visitors))
        .route("/api/analytics/sessions", get(list_sessions))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/api/analytics/track", post(ingress::track_handler))
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
