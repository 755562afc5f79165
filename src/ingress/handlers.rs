use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::client_info::{client_ip, referrer, user_agent, PeerAddr};
use crate::state::AppState;

use super::IngestRequest;

#[derive(Debug, Default, Deserialize)]
pub struct TrackPayload {
    #[serde(default)]
    pub page_type: Option<String>,
    #[serde(default)]
    pub resource_id: Option<i64>,
    /// Older clients only send the post identifier.
    #[serde(default)]
    pub post_id: Option<i64>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub status: &'static str,
}

/// POST /api/analytics/track
///
/// Always answers `202 {"status":"accepted"}`; the view is recorded in the
/// background and its outcome is never reported back.
pub async fn track_handler(
    State(state): State<AppState>,
    PeerAddr(peer): PeerAddr,
    headers: HeaderMap,
    Json(payload): Json<TrackPayload>,
) -> Response {
    let request = IngestRequest {
        page_type: payload.page_type,
        resource_id: payload.resource_id,
        post_id: payload.post_id,
        session_id: payload.session_id,
        referrer: payload.referrer.or_else(|| referrer(&headers)),
        ip_address: client_ip(&headers, peer),
        user_agent: user_agent(&headers),
    };

    debug!(
        "Track request page_type={:?} resource_id={:?} from {}",
        request.page_type, request.resource_id, request.ip_address
    );

    if let Err(e) = state.ingest.submit(request, Utc::now()).await {
        error!("Could not enqueue view: {}", e);
    }

    accepted()
}

fn accepted() -> Response {
    (
        StatusCode::ACCEPTED,
        Json(TrackResponse { status: "accepted" }),
    )
        .into_response()
}
