use chrono::{DateTime, Duration, Utc};

use crate::domain::{
    CreateResource, EventId, GeoStats, NewViewEvent, PageType, PostStats, Resource, ResourceKind,
    SessionInfo, ViewEvent, ViewOutcome,
};
use crate::error::Result;
use crate::ua;

#[cfg(feature = "postgres")]
pub type Pool = sqlx::PgPool;
#[cfg(feature = "postgres")]
pub type PoolOptions = sqlx::postgres::PgPoolOptions;
#[cfg(feature = "postgres")]
type Connection = sqlx::PgConnection;

#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
pub type Pool = sqlx::SqlitePool;
#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
pub type PoolOptions = sqlx::sqlite::SqlitePoolOptions;
#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
type Connection = sqlx::SqliteConnection;

// Dialect fragments. Everything else is shared SQL with `$N` placeholders.
#[cfg(feature = "postgres")]
const NULL_SAFE_EQ: &str = "IS NOT DISTINCT FROM";
#[cfg(feature = "postgres")]
const DAY_EXPR: &str = "TO_CHAR(viewed_at AT TIME ZONE 'UTC', 'YYYY-MM-DD')";
#[cfg(feature = "postgres")]
const HOUR_EXPR: &str = "CAST(EXTRACT(HOUR FROM viewed_at AT TIME ZONE 'UTC') AS BIGINT)";

#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
const NULL_SAFE_EQ: &str = "IS";
#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
const DAY_EXPR: &str = "date(viewed_at)";
#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
const HOUR_EXPR: &str = "CAST(strftime('%H', viewed_at) AS BIGINT)";

const EVENT_COLUMNS: &str = "id, page_type, resource_id, post_id, ip_address, user_agent, \
     referrer, session_id, country, city, viewed_at";

pub async fn create_pool(url: &str) -> Result<Pool> {
    // Each connection to an in-memory SQLite URL opens a separate database.
    let options = if url.contains(":memory:") {
        PoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        PoolOptions::new().max_connections(10)
    };

    let pool = options.connect(url).await?;
    Ok(pool)
}

/// Applies the schema. Safe to run on every startup.
pub async fn run_migrations(pool: &Pool) -> Result<()> {
    #[cfg(feature = "postgres")]
    let sql = include_str!("../../migrations/postgres/001_initial.sql");

    #[cfg(all(feature = "sqlite", not(feature = "postgres")))]
    let sql = include_str!("../../migrations/sqlite/001_initial.sql");

    sqlx::raw_sql(sql).execute(pool).await?;
    Ok(())
}

// Resource queries
pub async fn create_resource(pool: &Pool, input: CreateResource) -> Result<Resource> {
    let now = Utc::now();
    let sql = format!(
        "INSERT INTO {} (title, view_count, created_at) VALUES ($1, 0, $2) \
         RETURNING id, title, view_count, created_at",
        input.kind.table()
    );

    let row: ResourceRow = sqlx::query_as(&sql)
        .bind(&input.title)
        .bind(now)
        .fetch_one(pool)
        .await?;

    Ok(row.into())
}

pub async fn get_resource(pool: &Pool, kind: ResourceKind, id: i64) -> Result<Option<Resource>> {
    let sql = format!(
        "SELECT id, title, view_count, created_at FROM {} WHERE id = $1",
        kind.table()
    );

    let row: Option<ResourceRow> = sqlx::query_as(&sql).bind(id).fetch_optional(pool).await?;
    Ok(row.map(Into::into))
}

pub async fn resource_title(pool: &Pool, kind: ResourceKind, id: i64) -> Result<Option<String>> {
    let sql = format!("SELECT title FROM {} WHERE id = $1", kind.table());
    let title: Option<String> = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(title)
}

pub async fn count_resources(pool: &Pool, kind: ResourceKind) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
    let count: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;
    Ok(count)
}

/// Deletes a resource together with every view recorded against it.
///
/// Returns `false` when the resource did not exist.
pub async fn delete_resource(pool: &Pool, kind: ResourceKind, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let views_sql = match kind {
        ResourceKind::Post => {
            "DELETE FROM page_views WHERE (page_type = $1 AND resource_id = $2) OR post_id = $2"
        }
        ResourceKind::Message => "DELETE FROM page_views WHERE page_type = $1 AND resource_id = $2",
    };
    sqlx::query(views_sql)
        .bind(kind.page_type().as_str())
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let sql = format!("DELETE FROM {} WHERE id = $1", kind.table());
    let deleted = sqlx::query(&sql).bind(id).execute(&mut *tx).await?;

    tx.commit().await?;
    Ok(deleted.rows_affected() > 0)
}

// Ingestion

/// Records one view as a single unit of work: duplicate probe, event insert,
/// and the owning resource's counter increment commit together or not at all.
pub async fn record_view(
    pool: &Pool,
    event: &NewViewEvent,
    dedup_window: Duration,
) -> Result<ViewOutcome> {
    let mut tx = pool.begin().await?;

    if let Some(session_id) = event.session_id.as_deref() {
        lock_session(&mut tx, session_id).await?;
        if is_duplicate(&mut tx, event, dedup_window).await? {
            tx.rollback().await?;
            return Ok(ViewOutcome::Duplicate);
        }
    }

    let id = insert_event(&mut tx, event).await?;

    if let (Some(kind), Some(resource_id)) = (event.page_type.resource_kind(), event.resource_id) {
        increment_view_count(&mut tx, kind, resource_id).await?;
    }

    tx.commit().await?;
    Ok(ViewOutcome::Recorded(id))
}

/// Holds a transaction-scoped advisory lock on the session so replicas
/// sharing the database cannot both pass the duplicate probe.
#[cfg(feature = "postgres")]
async fn lock_session(conn: &mut Connection, session_id: &str) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(session_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// SQLite allows one writer per database file; in-process workers are
// serialized by `AppState::writer`.
#[cfg(all(feature = "sqlite", not(feature = "postgres")))]
async fn lock_session(_conn: &mut Connection, _session_id: &str) -> Result<()> {
    Ok(())
}

/// A prior view from the same session, IP, page type and resource inside
/// the trailing window `(timestamp - window, timestamp]`.
async fn is_duplicate(
    conn: &mut Connection,
    event: &NewViewEvent,
    window: Duration,
) -> Result<bool> {
    let sql = format!(
        "SELECT COUNT(*) FROM page_views \
         WHERE session_id = $1 \
           AND page_type = $2 \
           AND resource_id {eq} $3 \
           AND ip_address {eq} $4 \
           AND viewed_at > $5 \
           AND viewed_at <= $6",
        eq = NULL_SAFE_EQ
    );

    let count: i64 = sqlx::query_scalar(&sql)
        .bind(event.session_id.as_deref())
        .bind(event.page_type.as_str())
        .bind(event.resource_id)
        .bind(event.ip_address.as_deref())
        .bind(event.timestamp - window)
        .bind(event.timestamp)
        .fetch_one(&mut *conn)
        .await?;

    Ok(count > 0)
}

async fn insert_event(conn: &mut Connection, event: &NewViewEvent) -> Result<EventId> {
    let id: i64 = sqlx::query_scalar(
        r#"INSERT INTO page_views
           (page_type, resource_id, post_id, ip_address, user_agent, referrer,
            session_id, country, city, viewed_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
           RETURNING id"#,
    )
    .bind(event.page_type.as_str())
    .bind(event.resource_id)
    .bind(event.legacy_post_id())
    .bind(event.ip_address.as_deref())
    .bind(event.user_agent.as_deref())
    .bind(event.referrer.as_deref())
    .bind(event.session_id.as_deref())
    .bind(&event.geo.country)
    .bind(&event.geo.city)
    .bind(event.timestamp)
    .fetch_one(&mut *conn)
    .await?;

    Ok(EventId(id))
}

// A missing resource row is not an error: the event is still kept.
async fn increment_view_count(conn: &mut Connection, kind: ResourceKind, id: i64) -> Result<bool> {
    let sql = format!(
        "UPDATE {} SET view_count = view_count + 1 WHERE id = $1",
        kind.table()
    );
    let result = sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

// Event listing
pub async fn list_events(
    pool: &Pool,
    page_type: Option<&PageType>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ViewEvent>> {
    let rows: Vec<ViewEventRow> = match page_type {
        Some(page_type) => {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM page_views WHERE page_type = $1 \
                 ORDER BY viewed_at DESC, id DESC LIMIT $2 OFFSET $3"
            );
            sqlx::query_as(&sql)
                .bind(page_type.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!(
                "SELECT {EVENT_COLUMNS} FROM page_views \
                 ORDER BY viewed_at DESC, id DESC LIMIT $1 OFFSET $2"
            );
            sqlx::query_as(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn count_events(pool: &Pool, page_type: Option<&PageType>) -> Result<i64> {
    let count: i64 = match page_type {
        Some(page_type) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM page_views WHERE page_type = $1")
                .bind(page_type.as_str())
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(*) FROM page_views")
                .fetch_one(pool)
                .await?
        }
    };
    Ok(count)
}

// Aggregations
pub async fn count_views(pool: &Pool) -> Result<i64> {
    count_events(pool, None).await
}

pub async fn count_views_since(pool: &Pool, start: DateTime<Utc>) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM page_views WHERE viewed_at >= $1")
        .bind(start)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Distinct IP addresses across all events, the unique-visitor proxy.
pub async fn count_unique_visitors(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT ip_address) FROM page_views")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Distinct `(page_type, resource_id)` pairs that have been viewed.
pub async fn count_viewed_resources(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM (
               SELECT DISTINCT page_type, resource_id FROM page_views
               WHERE resource_id IS NOT NULL
           ) viewed"#,
    )
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn post_stats(pool: &Pool) -> Result<Vec<PostStats>> {
    let rows: Vec<(i64, String, i64, i64)> = sqlx::query_as(
        r#"SELECT p.id, p.title, p.view_count, COUNT(DISTINCT v.ip_address)
           FROM posts p
           LEFT JOIN page_views v ON v.page_type = 'post' AND v.resource_id = p.id
           GROUP BY p.id, p.title, p.view_count
           ORDER BY p.view_count DESC, p.id ASC"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(post_id, title, view_count, unique_visitors)| PostStats {
            post_id,
            title,
            view_count,
            unique_visitors,
        })
        .collect())
}

pub async fn geo_stats(pool: &Pool, limit: i64) -> Result<Vec<GeoStats>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"SELECT country, COUNT(*) AS total FROM page_views
           WHERE country IS NOT NULL
           GROUP BY country
           ORDER BY total DESC, country ASC
           LIMIT $1"#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(country, count)| GeoStats { country, count })
        .collect())
}

/// `(YYYY-MM-DD, views)` per UTC day since `start`, oldest first.
pub async fn daily_views(pool: &Pool, start: DateTime<Utc>) -> Result<Vec<(String, i64)>> {
    let sql = format!(
        "SELECT {DAY_EXPR} AS day, COUNT(*) AS views FROM page_views \
         WHERE viewed_at >= $1 GROUP BY day ORDER BY day ASC"
    );
    let rows: Vec<(String, i64)> = sqlx::query_as(&sql).bind(start).fetch_all(pool).await?;
    Ok(rows)
}

/// `(hour, views)` per UTC hour-of-day since `start`. Hours without views are absent.
pub async fn hourly_views(pool: &Pool, start: DateTime<Utc>) -> Result<Vec<(i64, i64)>> {
    let sql = format!(
        "SELECT {HOUR_EXPR} AS hour, COUNT(*) AS views FROM page_views \
         WHERE viewed_at >= $1 GROUP BY hour ORDER BY hour ASC"
    );
    let rows: Vec<(i64, i64)> = sqlx::query_as(&sql).bind(start).fetch_all(pool).await?;
    Ok(rows)
}

/// `(page_type, views, unique_visitors)` since `start`.
pub async fn page_type_views(
    pool: &Pool,
    start: DateTime<Utc>,
) -> Result<Vec<(String, i64, i64)>> {
    let rows: Vec<(String, i64, i64)> = sqlx::query_as(
        r#"SELECT page_type, COUNT(*) AS views, COUNT(DISTINCT ip_address) AS visitors
           FROM page_views
           WHERE viewed_at >= $1
           GROUP BY page_type
           ORDER BY views DESC, page_type ASC"#,
    )
    .bind(start)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// `(page_type, resource_id, views, unique_visitors)` for the most viewed resources since `start`.
pub async fn top_resource_views(
    pool: &Pool,
    start: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<(String, Option<i64>, i64, i64)>> {
    let rows: Vec<(String, Option<i64>, i64, i64)> = sqlx::query_as(
        r#"SELECT page_type, resource_id, COUNT(*) AS views, COUNT(DISTINCT ip_address) AS visitors
           FROM page_views
           WHERE viewed_at >= $1 AND resource_id IS NOT NULL
           GROUP BY page_type, resource_id
           ORDER BY views DESC, page_type ASC, resource_id ASC
           LIMIT $2"#,
    )
    .bind(start)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn user_agents_since(pool: &Pool, start: DateTime<Utc>) -> Result<Vec<Option<String>>> {
    let agents: Vec<Option<String>> =
        sqlx::query_scalar("SELECT user_agent FROM page_views WHERE viewed_at >= $1")
            .bind(start)
            .fetch_all(pool)
            .await?;
    Ok(agents)
}

// Session queries

/// One row per session id, most recently active first. IP, geo and device
/// are taken from the session's latest event.
pub async fn list_sessions(pool: &Pool, limit: i64, offset: i64) -> Result<Vec<SessionInfo>> {
    let rows: Vec<SessionRow> = sqlx::query_as(
        r#"SELECT g.session_id, g.first_seen, g.last_seen, g.visit_count, g.pages_viewed,
                  v.ip_address, v.country, v.city, v.user_agent
           FROM (
               SELECT session_id,
                      MIN(viewed_at) AS first_seen,
                      MAX(viewed_at) AS last_seen,
                      COUNT(*) AS visit_count,
                      COUNT(DISTINCT page_type) AS pages_viewed,
                      MAX(id) AS latest_id
               FROM page_views
               WHERE session_id IS NOT NULL
               GROUP BY session_id
           ) g
           JOIN page_views v ON v.id = g.latest_id
           ORDER BY g.last_seen DESC, g.session_id ASC
           LIMIT $1 OFFSET $2"#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn count_sessions(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT session_id) FROM page_views WHERE session_id IS NOT NULL",
    )
    .fetch_one(pool)
    .await?;
    Ok(count)
}

// Row types

#[derive(sqlx::FromRow)]
struct ResourceRow {
    id: i64,
    title: String,
    view_count: i64,
    created_at: DateTime<Utc>,
}

impl From<ResourceRow> for Resource {
    fn from(row: ResourceRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            view_count: row.view_count,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ViewEventRow {
    id: i64,
    page_type: String,
    resource_id: Option<i64>,
    post_id: Option<i64>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    referrer: Option<String>,
    session_id: Option<String>,
    country: Option<String>,
    city: Option<String>,
    viewed_at: DateTime<Utc>,
}

impl From<ViewEventRow> for ViewEvent {
    fn from(row: ViewEventRow) -> Self {
        Self {
            id: EventId(row.id),
            page_type: PageType::from(row.page_type),
            resource_id: row.resource_id,
            post_id: row.post_id,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            referrer: row.referrer,
            session_id: row.session_id,
            country: row.country,
            city: row.city,
            timestamp: row.viewed_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    visit_count: i64,
    pages_viewed: i64,
    ip_address: Option<String>,
    country: Option<String>,
    city: Option<String>,
    user_agent: Option<String>,
}

impl From<SessionRow> for SessionInfo {
    fn from(row: SessionRow) -> Self {
        Self {
            device: row
                .user_agent
                .as_deref()
                .map(|agent| ua::device_label(Some(agent))),
            session_id: row.session_id,
            ip_address: row.ip_address,
            country: row.country,
            city: row.city,
            visit_count: row.visit_count,
            first_seen: row.first_seen,
            last_seen: row.last_seen,
            pages_viewed: row.pages_viewed,
        }
    }
}
