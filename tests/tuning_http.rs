use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use galton_board::tuning::{build_router_for_test, BoardTuning, HistogramSnapshot};
use std::sync::{Arc, Mutex};

fn tuning() -> BoardTuning {
    BoardTuning {
        spawning_enabled: true,
        spawn_interval_ms: 250,
        reap_interval_ms: 5000,
        bead_max_age_ms: None,
    }
}

#[tokio::test]
async fn http_get_and_patch_partial() {
    let (tx, rx) = std::sync::mpsc::channel::<BoardTuning>();
    let mirror = Arc::new(Mutex::new(tuning()));
    let histogram = Arc::new(Mutex::new(HistogramSnapshot::default()));

    let app = build_router_for_test(tx, mirror.clone(), histogram);

    let resp = app.clone().oneshot(Request::builder().uri("/tuning").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let payload = serde_json::json!({
        "spawn": { "spawn_interval_ms": 100 },
        "reap": { "bead_max_age_ms": 45000 }
    });
    let resp = app.clone().oneshot(Request::builder().method("PATCH").uri("/tuning").header("content-type", "application/json").body(Body::from(payload.to_string())).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let guard = mirror.lock().unwrap();
    assert_eq!(guard.spawn_interval_ms, 100);
    assert_eq!(guard.bead_max_age_ms, Some(45000));
    assert_eq!(guard.reap_interval_ms, 5000);
    assert!(guard.spawning_enabled);

    let sent = rx.try_recv().unwrap();
    assert_eq!(sent, *guard);
}

#[tokio::test]
async fn http_patch_rejects_zero_interval() {
    let (tx, rx) = std::sync::mpsc::channel::<BoardTuning>();
    let mirror = Arc::new(Mutex::new(tuning()));
    let histogram = Arc::new(Mutex::new(HistogramSnapshot::default()));
    let app = build_router_for_test(tx, mirror.clone(), histogram);

    let payload = serde_json::json!({ "reap": { "reap_interval_ms": 0 } });
    let resp = app.oneshot(Request::builder().method("PATCH").uri("/tuning").header("content-type", "application/json").body(Body::from(payload.to_string())).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert_eq!(*mirror.lock().unwrap(), tuning());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn http_histogram_serves_the_latest_snapshot() {
    let (tx, _rx) = std::sync::mpsc::channel::<BoardTuning>();
    let mirror = Arc::new(Mutex::new(tuning()));
    let histogram = Arc::new(Mutex::new(HistogramSnapshot {
        counters: vec![2, 0, 4],
        top_counter: 4,
        total: 6,
        bar_heights: vec![120.0, 0.0, 240.0],
        captured_at: "2026-10-19T12:00:00+00:00".into(),
    }));
    let app = build_router_for_test(tx, mirror, histogram);

    let resp = app.oneshot(Request::builder().uri("/histogram").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let snap: HistogramSnapshot = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(snap.counters, vec![2, 0, 4]);
    assert_eq!(snap.top_counter, 4);
    assert_eq!(snap.bar_heights[2], 240.0);
}
