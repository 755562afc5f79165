use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::collections::HashMap;

use crate::db::{self, Pool};
use crate::domain::{
    total_pages, DailyStats, DeviceStats, HourlyStats, PageType, PageTypeStats, ResourceKind,
    SessionPage, StatsReport, TopResource, Visitor, VisitorPage,
};
use crate::error::{Error, Result};
use crate::ua;

pub const DEFAULT_WINDOW_DAYS: i64 = 30;
pub const MAX_WINDOW_DAYS: i64 = 365;
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

const GEO_LIMIT: i64 = 15;
const DEVICE_LIMIT: usize = 15;
const TOP_RESOURCES_LIMIT: i64 = 10;

pub fn validate_window(days: i64) -> Result<i64> {
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(Error::InvalidQuery(format!(
            "days must be between 1 and {}",
            MAX_WINDOW_DAYS
        )));
    }
    Ok(days)
}

/// Validates 1-based pagination and returns `(limit, offset)`.
pub fn validate_page(page: i64, page_size: i64) -> Result<(i64, i64)> {
    if page < 1 {
        return Err(Error::InvalidQuery("page must be at least 1".to_string()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(Error::InvalidQuery(format!(
            "page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    let offset = (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| Error::InvalidQuery("page is out of range".to_string()))?;
    Ok((page_size, offset))
}

/// Reporting boundaries, all anchored on today's UTC midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub today: DateTime<Utc>,
    pub week: DateTime<Utc>,
    pub start: DateTime<Utc>,
}

impl Window {
    pub fn new(now: DateTime<Utc>, days: i64) -> Self {
        let today = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        Self {
            today,
            week: today - Duration::days(7),
            start: today - Duration::days(days),
        }
    }
}

/// Display title for a viewed resource. Only page types backed by a
/// resource table have one.
pub async fn resolve_title(
    pool: &Pool,
    page_type: &PageType,
    resource_id: Option<i64>,
) -> Result<Option<String>> {
    match (page_type.resource_kind(), resource_id) {
        (Some(kind), Some(id)) => db::resource_title(pool, kind, id).await,
        _ => Ok(None),
    }
}

/// Classifies every agent and keeps the most common labels.
pub fn tally_devices<'a>(agents: impl IntoIterator<Item = Option<&'a str>>) -> Vec<DeviceStats> {
    let mut counts: HashMap<String, i64> = HashMap::new();
    for agent in agents {
        *counts.entry(ua::device_label(agent)).or_default() += 1;
    }

    let mut stats: Vec<DeviceStats> = counts
        .into_iter()
        .map(|(device, count)| DeviceStats { device, count })
        .collect();
    stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.device.cmp(&b.device)));
    stats.truncate(DEVICE_LIMIT);
    stats
}

/// Computes the full report for the trailing `days` window from scratch.
pub async fn build_stats(pool: &Pool, days: i64, now: DateTime<Utc>) -> Result<StatsReport> {
    let days = validate_window(days)?;
    let window = Window::new(now, days);

    let total_views = db::count_views(pool).await?;
    let total_unique_visitors = db::count_unique_visitors(pool).await?;
    let total_posts = db::count_resources(pool, ResourceKind::Post).await?;
    let total_resources = db::count_viewed_resources(pool).await?;
    let views_today = db::count_views_since(pool, window.today).await?;
    let views_this_week = db::count_views_since(pool, window.week).await?;
    let views_in_window = db::count_views_since(pool, window.start).await?;

    let posts_stats = db::post_stats(pool).await?;
    let geo_stats = db::geo_stats(pool, GEO_LIMIT).await?;

    let daily_stats = db::daily_views(pool, window.start)
        .await?
        .into_iter()
        .map(|(date, views)| DailyStats { date, views })
        .collect();

    let hourly_stats = db::hourly_views(pool, window.start)
        .await?
        .into_iter()
        .map(|(hour, views)| HourlyStats {
            hour: hour as i32,
            views,
        })
        .collect();

    let page_type_stats = db::page_type_views(pool, window.start)
        .await?
        .into_iter()
        .map(|(page_type, views, unique_visitors)| PageTypeStats {
            page_type: PageType::from(page_type),
            views,
            unique_visitors,
        })
        .collect();

    let agents = db::user_agents_since(pool, window.start).await?;
    let device_stats = tally_devices(agents.iter().map(|a| a.as_deref()));

    let mut top_resources = Vec::new();
    for (page_type, resource_id, views, unique_visitors) in
        db::top_resource_views(pool, window.start, TOP_RESOURCES_LIMIT).await?
    {
        let page_type = PageType::from(page_type);
        let title = resolve_title(pool, &page_type, resource_id).await?;
        top_resources.push(TopResource {
            page_type,
            resource_id,
            title,
            views,
            unique_visitors,
        });
    }

    Ok(StatsReport {
        window_days: days,
        total_views,
        total_unique_visitors,
        total_posts,
        total_resources,
        views_today,
        views_this_week,
        views_in_window,
        posts_stats,
        geo_stats,
        daily_stats,
        hourly_stats,
        page_type_stats,
        device_stats,
        top_resources,
    })
}

/// Raw events, newest first, each with its resource title.
pub async fn list_visitors(
    pool: &Pool,
    page: i64,
    page_size: i64,
    page_type: Option<&PageType>,
) -> Result<VisitorPage> {
    let (limit, offset) = validate_page(page, page_size)?;

    let total = db::count_events(pool, page_type).await?;
    let events = db::list_events(pool, page_type, limit, offset).await?;

    // Pages often repeat the same resource.
    let mut titles: HashMap<(PageType, Option<i64>), Option<String>> = HashMap::new();
    let mut visitors = Vec::with_capacity(events.len());
    for event in events {
        let key = (event.page_type.clone(), event.resource_id);
        let title = match titles.get(&key) {
            Some(title) => title.clone(),
            None => {
                let title = resolve_title(pool, &event.page_type, event.resource_id).await?;
                titles.insert(key, title.clone());
                title
            }
        };
        visitors.push(Visitor::from_event(event, title));
    }

    Ok(VisitorPage {
        visitors,
        total,
        page,
        page_size,
        total_pages: total_pages(total, page_size),
    })
}

pub async fn list_sessions(pool: &Pool, page: i64, page_size: i64) -> Result<SessionPage> {
    let (limit, offset) = validate_page(page, page_size)?;

    let total = db::count_sessions(pool).await?;
    let sessions = db::list_sessions(pool, limit, offset).await?;

    Ok(SessionPage {
        sessions,
        total,
        page,
        page_size,
        total_pages: total_pages(total, page_size),
    })
}
