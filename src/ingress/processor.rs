use chrono::{DateTime, Utc};
use tracing::debug;

use crate::db;
use crate::domain::{GeoInfo, NewViewEvent, PageType, ViewOutcome};
use crate::error::Result;
use crate::state::AppState;

/// A view as handed over by the HTTP boundary. IP and user agent are
/// already extracted from the request.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub page_type: Option<String>,
    pub resource_id: Option<i64>,
    /// Legacy identifier, used when `resource_id` is absent.
    pub post_id: Option<i64>,
    pub session_id: Option<String>,
    pub referrer: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl IngestRequest {
    fn into_event(self, geo: GeoInfo, received_at: DateTime<Utc>) -> NewViewEvent {
        NewViewEvent {
            page_type: PageType::normalize(self.page_type.as_deref()),
            resource_id: self.resource_id.or(self.post_id),
            ip_address: non_empty(Some(self.ip_address)),
            user_agent: non_empty(Some(self.user_agent)),
            referrer: non_empty(self.referrer),
            session_id: non_empty(self.session_id),
            geo,
            timestamp: received_at,
        }
    }
}

/// Runs one ingestion job: normalize, resolve geography, then record the
/// view and bump the owning resource's counter in one transaction.
pub async fn process_view(
    state: &AppState,
    request: IngestRequest,
    received_at: DateTime<Utc>,
) -> Result<ViewOutcome> {
    let geo = state.geo.resolve(&request.ip_address).await;
    let event = request.into_event(geo, received_at);

    let outcome = {
        let _writer = state.writer.lock().await;
        db::record_view(&state.pool, &event, state.settings.dedup_window()).await?
    };

    match outcome {
        ViewOutcome::Recorded(id) => debug!(
            "Recorded view {} for {} {:?}",
            id, event.page_type, event.resource_id
        ),
        ViewOutcome::Duplicate => debug!(
            "Duplicate view for {} {:?} in session {:?}",
            event.page_type, event.resource_id, event.session_id
        ),
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn received() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_defaults_to_post() {
        let event = IngestRequest::default().into_event(GeoInfo::unknown(), received());
        assert_eq!(event.page_type, PageType::Post);
        assert_eq!(event.resource_id, None);
    }

    #[test]
    fn test_legacy_post_id_fallback() {
        let request = IngestRequest {
            post_id: Some(4),
            ..Default::default()
        };
        let event = request.into_event(GeoInfo::unknown(), received());
        assert_eq!(event.resource_id, Some(4));
        assert_eq!(event.legacy_post_id(), Some(4));
    }

    #[test]
    fn test_resource_id_wins_over_legacy() {
        let request = IngestRequest {
            page_type: Some("Message".to_string()),
            resource_id: Some(7),
            post_id: Some(4),
            ..Default::default()
        };
        let event = request.into_event(GeoInfo::unknown(), received());
        assert_eq!(event.page_type, PageType::Message);
        assert_eq!(event.resource_id, Some(7));
        assert_eq!(event.legacy_post_id(), None);
    }

    #[test]
    fn test_blank_session_is_absent() {
        let request = IngestRequest {
            session_id: Some("  ".to_string()),
            referrer: Some(String::new()),
            ip_address: "203.0.113.1".to_string(),
            ..Default::default()
        };
        let event = request.into_event(GeoInfo::unknown(), received());
        assert_eq!(event.session_id, None);
        assert_eq!(event.referrer, None);
        assert_eq!(event.ip_address.as_deref(), Some("203.0.113.1"));
    }
}
