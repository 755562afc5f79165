//! Criterion benchmarks for the classifier and the read-side rollups.
//!
//! Run with: cargo bench
//!
//! The stats benches seed an in-memory SQLite database on startup.

use chrono::{Duration, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use tokio::runtime::Runtime;

use viewstats::{
    analytics,
    db::{self, Pool},
    domain::{CreateResource, GeoInfo, NewViewEvent, PageType, ResourceKind},
    ua,
};

const AGENTS: &[&str] = &[
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/605.1",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.91",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
];

const COUNTRIES: &[(&str, &str)] = &[
    ("France", "Paris"),
    ("Japan", "Tokyo"),
    ("Brazil", "Recife"),
    ("Local", "Development"),
];

async fn seeded_pool(views: usize) -> Pool {
    let pool = db::create_pool("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    db::run_migrations(&pool).await.expect("Migrations failed");

    for i in 0..20 {
        let kind = if i % 2 == 0 {
            ResourceKind::Post
        } else {
            ResourceKind::Message
        };
        db::create_resource(
            &pool,
            CreateResource {
                kind,
                title: format!("Resource {}", i),
            },
        )
        .await
        .expect("Failed to create resource");
    }

    let now = Utc::now();
    let page_types = [
        PageType::Post,
        PageType::Message,
        PageType::Home,
        PageType::Music,
    ];
    for i in 0..views {
        let page_type = page_types[i % page_types.len()].clone();
        let resource_id = page_type.resource_kind().map(|_| (i % 10) as i64 + 1);
        let (country, city) = COUNTRIES[i % COUNTRIES.len()];
        let event = NewViewEvent {
            page_type,
            resource_id,
            ip_address: Some(format!("203.0.113.{}", i % 250)),
            user_agent: Some(AGENTS[i % AGENTS.len()].to_string()),
            referrer: None,
            session_id: None,
            geo: GeoInfo::new(country, city),
            timestamp: now - Duration::minutes((i * 37) as i64),
        };
        db::record_view(&pool, &event, Duration::hours(24))
            .await
            .expect("Failed to record view");
    }

    pool
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("ua_classify");

    for (i, agent) in AGENTS.iter().enumerate() {
        group.bench_with_input(BenchmarkId::from_parameter(i), agent, |b, agent| {
            b.iter(|| ua::classify(black_box(agent)))
        });
    }

    group.bench_function("tally_devices", |b| {
        let agents: Vec<&str> = AGENTS.iter().cycle().take(1000).copied().collect();
        b.iter(|| analytics::tally_devices(agents.iter().map(|a| Some(black_box(*a)))))
    });

    group.finish();
}

fn bench_stats(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pool = rt.block_on(seeded_pool(5_000));
    let now = Utc::now();

    let mut group = c.benchmark_group("stats");

    for days in [7_i64, 30, 365] {
        group.bench_with_input(BenchmarkId::new("build_stats", days), &days, |b, &days| {
            b.to_async(&rt)
                .iter(|| async { analytics::build_stats(&pool, days, now).await.unwrap() })
        });
    }

    group.bench_function("visitors_first_page", |b| {
        b.to_async(&rt)
            .iter(|| async { analytics::list_visitors(&pool, 1, 50, None).await.unwrap() })
    });

    group.bench_function("visitors_message_filter", |b| {
        b.to_async(&rt).iter(|| async {
            analytics::list_visitors(&pool, 1, 50, Some(&PageType::Message))
                .await
                .unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_classify, bench_stats);
criterion_main!(benches);
