use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{EventId, GeoInfo, PageType, ResourceKind};

/// One recorded view. Never mutated once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewEvent {
    pub id: EventId,
    pub page_type: PageType,
    pub resource_id: Option<i64>,
    pub post_id: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub session_id: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A normalized, geo-enriched event ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewViewEvent {
    pub page_type: PageType,
    pub resource_id: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub session_id: Option<String>,
    pub geo: GeoInfo,
    pub timestamp: DateTime<Utc>,
}

impl NewViewEvent {
    /// The legacy post identifier mirrors `resource_id` for post views only.
    pub fn legacy_post_id(&self) -> Option<i64> {
        match self.page_type {
            PageType::Post => self.resource_id,
            _ => None,
        }
    }
}

/// Result of one ingestion unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewOutcome {
    Recorded(EventId),
    Duplicate,
}

impl ViewOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: i64,
    pub title: String,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateResource {
    pub kind: ResourceKind,
    pub title: String,
}

// Rollup rows

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStats {
    pub post_id: i64,
    pub title: String,
    pub view_count: i64,
    pub unique_visitors: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoStats {
    pub country: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: String,
    pub views: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyStats {
    pub hour: i32,
    pub views: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTypeStats {
    pub page_type: PageType,
    pub views: i64,
    pub unique_visitors: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub device: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopResource {
    pub page_type: PageType,
    pub resource_id: Option<i64>,
    pub title: Option<String>,
    pub views: i64,
    pub unique_visitors: i64,
}

/// Everything the Stats operation returns for one reporting window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub window_days: i64,
    pub total_views: i64,
    pub total_unique_visitors: i64,
    pub total_posts: i64,
    pub total_resources: i64,
    pub views_today: i64,
    pub views_this_week: i64,
    pub views_in_window: i64,
    pub posts_stats: Vec<PostStats>,
    pub geo_stats: Vec<GeoStats>,
    pub daily_stats: Vec<DailyStats>,
    pub hourly_stats: Vec<HourlyStats>,
    pub page_type_stats: Vec<PageTypeStats>,
    pub device_stats: Vec<DeviceStats>,
    pub top_resources: Vec<TopResource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visitor {
    pub id: EventId,
    pub page_type: PageType,
    pub resource_id: Option<i64>,
    pub post_id: Option<i64>,
    pub resource_title: Option<String>,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<String>,
}

impl Visitor {
    pub fn from_event(event: ViewEvent, resource_title: Option<String>) -> Self {
        Self {
            id: event.id,
            page_type: event.page_type,
            resource_id: event.resource_id,
            post_id: event.post_id,
            resource_title,
            ip_address: event.ip_address,
            country: event.country,
            city: event.city,
            user_agent: event.user_agent,
            referrer: event.referrer,
            timestamp: event.timestamp,
            session_id: event.session_id,
        }
    }
}

/// Session rollup. The IP/geo/device fields come from one member event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub device: Option<String>,
    pub visit_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub pages_viewed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitorPage {
    pub visitors: Vec<Visitor>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPage {
    pub sessions: Vec<SessionInfo>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

pub fn total_pages(total: i64, page_size: i64) -> i64 {
    if page_size <= 0 {
        return 0;
    }
    (total + page_size - 1) / page_size
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_event(page_type: PageType, resource_id: Option<i64>) -> NewViewEvent {
        NewViewEvent {
            page_type,
            resource_id,
            ip_address: Some("203.0.113.9".to_string()),
            user_agent: None,
            referrer: None,
            session_id: None,
            geo: GeoInfo::unknown(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_legacy_post_id_mirrors_post_resource() {
        assert_eq!(new_event(PageType::Post, Some(3)).legacy_post_id(), Some(3));
        assert_eq!(new_event(PageType::Post, None).legacy_post_id(), None);
    }

    #[test]
    fn test_legacy_post_id_absent_for_other_types() {
        assert_eq!(new_event(PageType::Message, Some(7)).legacy_post_id(), None);
        assert_eq!(new_event(PageType::Home, None).legacy_post_id(), None);
    }

    #[test]
    fn test_view_outcome_is_recorded() {
        assert!(ViewOutcome::Recorded(EventId(1)).is_recorded());
        assert!(!ViewOutcome::Duplicate.is_recorded());
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 50), 0);
        assert_eq!(total_pages(1, 50), 1);
        assert_eq!(total_pages(50, 50), 1);
        assert_eq!(total_pages(51, 50), 2);
        assert_eq!(total_pages(10, 0), 0);
    }

    #[test]
    fn test_stats_report_default() {
        let report = StatsReport::default();
        assert_eq!(report.total_views, 0);
        assert!(report.posts_stats.is_empty());
        assert!(report.top_resources.is_empty());
    }

    #[test]
    fn test_page_type_stats_serializes_tag() {
        let row = PageTypeStats {
            page_type: PageType::Message,
            views: 2,
            unique_visitors: 1,
        };
        let json = serde_json::to_string(&row).unwrap();
        assert!(json.contains("\"page_type\":\"message\""));
    }
}
