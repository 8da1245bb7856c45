//! Performance benchmarks for a3s-tracker
//!
//! Run with: cargo bench

use a3s_tracker::{
    delivery::encode_form, EventBuilder, EventType, FieldSet, MemoryLog, MemoryTransport,
    PayloadEntry, RequestInfo, Tracker, TrackerOptions,
};
use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;

fn request() -> RequestInfo {
    RequestInfo::new()
        .with_ip_address("203.0.113.7")
        .with_url("/account/settings")
        .with_user_agent("Mozilla/5.0 (X11; Linux x86_64)")
        .with_browser_language("en-US")
        .with_http_method("POST")
        .with_http_referer("https://example.com/")
}

fn memory_tracker() -> Tracker {
    Tracker::builder("https://sensor.example.com", "bench-key")
        .options(TrackerOptions::default())
        .transport(Arc::new(MemoryTransport::default()))
        .log(Arc::new(MemoryLog::new(16)))
        .build()
        .unwrap()
}

fn bench_event_building(c: &mut Criterion) {
    let info = request();

    c.bench_function("EventBuilder populate", |b| {
        b.iter(|| {
            let mut event = EventBuilder::new(FieldSet::all());
            event.populate(&info);
            event
        });
    });

    let mut event = EventBuilder::new(FieldSet::all());
    event.populate(&info);
    event
        .set_user_name("alice")
        .set_event_type(EventType::AccountPasswordChange)
        .add_payload_entry(PayloadEntry::new("password", "***").with_old_value("***"));

    c.bench_function("EventBuilder serialize", |b| {
        b.iter(|| event.serialize());
    });

    let serialized = event.serialize();
    c.bench_function("encode_form", |b| {
        b.iter(|| encode_form(&serialized));
    });
}

fn bench_memory_track(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let tracker = memory_tracker();
    let info = request();

    c.bench_function("create + track", |b| {
        b.to_async(&rt).iter(|| async {
            let event = tracker.create_request_event(&info, None).await;
            tracker.track(&event).await
        });
    });
}

fn bench_pending_lookup(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("pending_lookup");
    for count in [10, 100, 1000] {
        let tracker = memory_tracker();
        let ids = rt.block_on(async {
            let mut ids = Vec::with_capacity(count);
            for _ in 0..count {
                ids.push(tracker.create_event().await.id());
            }
            ids
        });

        group.bench_function(format!("{} pending", count), |b| {
            b.to_async(&rt).iter(|| async {
                for id in &ids {
                    tracker.get_event(id).await;
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_event_building,
    bench_memory_track,
    bench_pending_lookup,
);
criterion_main!(benches);
