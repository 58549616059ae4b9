//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! the /api/v1/* endpoints using `tower::ServiceExt::oneshot()`. The
//! controller runs against a simulated house on a manual clock, so no
//! network port or wall-clock wait is involved.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, TimeZone, Utc};
use tower::ServiceExt;

use heatwise::api::{create_app, ApiState};
use heatwise::background::{HealthBoard, HealthSignal};
use heatwise::config::SystemConfig;
use heatwise::ml_engine::LearningEngine;
use heatwise::pipeline::{
    Clock, Collaborators, ManualClock, PredictiveController, SharedState, StatusHandle,
};
use heatwise::simulation::{NoiseLevels, SimulatedHouse};
use heatwise::storage::HistoricalDataStore;
use heatwise::thermal_model::{PlantConstants, ThermalModel};

struct Fixture {
    controller: PredictiveController,
    clock: Arc<ManualClock>,
    state: ApiState,
}

fn make_fixture() -> Fixture {
    let start = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();
    let config = SystemConfig::default();
    let clock = Arc::new(ManualClock::new(start));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let model = ThermalModel::new(PlantConstants::from(&config.model));

    let house = Arc::new(
        SimulatedHouse::new(model, config.prior_parameters(), Arc::clone(&dyn_clock), 20.5, 1)
            .with_noise(NoiseLevels {
                indoor: 0.0,
                power: 0.0,
                forecast: 0.0,
            }),
    );
    let shared = SharedState {
        engine: Arc::new(LearningEngine::new(
            config.learning.clone(),
            PlantConstants::from(&config.model),
            config.prior_parameters(),
        )),
        history: Arc::new(HistoricalDataStore::in_memory(1000)),
        status: Arc::new(StatusHandle::new(start)),
        health: Arc::new(HealthBoard::new()),
    };
    let state = ApiState {
        status: Arc::clone(&shared.status),
        health: Arc::clone(&shared.health),
        engine: Arc::clone(&shared.engine),
        history: Arc::clone(&shared.history),
        clock: dyn_clock,
    };
    let controller = PredictiveController::new(
        &config,
        model,
        Collaborators {
            forecast: house.clone(),
            telemetry: house.clone(),
            sink: house,
        },
        shared,
    );
    Fixture {
        controller,
        clock,
        state,
    }
}

async fn get_json(state: &ApiState, uri: &str) -> (StatusCode, serde_json::Value) {
    let resp = create_app(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

/// Read-only endpoints answer before the first tick.
#[tokio::test]
async fn test_v1_endpoints_before_first_tick() {
    let fx = make_fixture();

    for endpoint in ["/api/v1/health", "/api/v1/status", "/api/v1/learning", "/api/v1/history"] {
        let (status, json) = get_json(&fx.state, endpoint).await;
        assert_eq!(status, StatusCode::OK, "GET {endpoint}");
        assert!(json.is_object(), "GET {endpoint} should return a JSON object");
    }

    let (status, _) = get_json(&fx.state, "/api/v1/decision").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// After ticks the decision, schedule and history reflect the controller.
#[tokio::test]
async fn test_v1_decision_and_history_after_ticks() {
    let mut fx = make_fixture();
    for _ in 0..3 {
        fx.controller.tick(fx.clock.now()).await;
        fx.clock.advance(Duration::minutes(5));
    }

    let (status, decision) = get_json(&fx.state, "/api/v1/decision").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decision["tick"], 3);
    assert!(decision["current"]["modulation_pct"].is_number());

    let (status, schedule) = get_json(&fx.state, "/api/v1/schedule").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(schedule["slots"].as_array().unwrap().len(), 24);

    let (_, history) = get_json(&fx.state, "/api/v1/history?hours=1").await;
    assert_eq!(history["count"], 2);
    assert!(history["mean_abs_error"].is_number());

    let (_, status_json) = get_json(&fx.state, "/api/v1/status").await;
    assert_eq!(status_json["loop"]["ticks"], 3);
    assert_eq!(status_json["learning"]["version"], 0);
}

/// A raised tick failure turns /health into 503.
#[tokio::test]
async fn test_v1_health_unavailable_when_unhealthy() {
    let fx = make_fixture();
    fx.state.health.emit(
        HealthSignal::RepeatedTickFailure {
            consecutive: 3,
            last_error: "telemetry timed out".to_string(),
        },
        fx.clock.now(),
    );

    let (status, json) = get_json(&fx.state, "/api/v1/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["health"]["status"], "unhealthy");
    assert_eq!(json["events"].as_array().unwrap().len(), 1);
}

/// Unknown routes stay 404.
#[tokio::test]
async fn test_unknown_route_not_found() {
    let fx = make_fixture();
    let resp = create_app(fx.state)
        .oneshot(
            Request::builder()
                .uri("/api/v1/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
