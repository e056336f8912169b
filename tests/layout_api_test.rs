// Integration tests for the layout HTTP API

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use floorplan::api::{create_layout_router, LayoutAppState};
use floorplan::broker::{BrokerConfig, BrokerConfigStore};
use floorplan::layout::base;
use floorplan::overlay::LayoutStore;
use floorplan::storage::{FileStorage, KeyValueStorage, MemoryStorage};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_state(storage: Arc<dyn KeyValueStorage>) -> LayoutAppState {
    LayoutAppState {
        store: Arc::new(LayoutStore::with_default_key(
            base::bundled(),
            Arc::clone(&storage),
        )),
        broker_configs: Arc::new(BrokerConfigStore::new(storage, BrokerConfig::default())),
    }
}

fn create_test_app() -> (Router, LayoutAppState) {
    let state = create_test_state(Arc::new(MemoryStorage::new()));
    (create_layout_router(state.clone()), state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// GET /api/layout returns the bundled zones in order.
#[tokio::test]
async fn test_get_layout_returns_base() {
    let (app, _) = create_test_app();

    let (status, layout) = send(&app, "GET", "/api/layout", None).await;
    assert_eq!(status, StatusCode::OK);

    let zones: Vec<&String> = layout.as_object().unwrap().keys().collect();
    assert_eq!(zones, vec!["A", "B", "C"]);
    assert_eq!(layout["A"]["machines"]["1"]["status"], "active");
}

/// Adding a machine shows it in the effective layout.
#[tokio::test]
async fn test_add_machine_then_read() {
    let (app, state) = create_test_app();

    let (status, placement) = send(
        &app,
        "POST",
        "/api/zones/B/machines",
        Some(json!({ "id": "42", "x": 120.0, "y": 80.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(placement["status"], "inactive");

    let (_, zone) = send(&app, "GET", "/api/zones/B", None).await;
    assert_eq!(zone["machines"]["42"]["position"]["x"], 120.0);
    assert!(state.store.is_overlay_machine("B", "42"));
}

/// Positions are clamped to the zone bounds.
#[tokio::test]
async fn test_add_machine_clamps_position() {
    let (app, _) = create_test_app();

    let (status, placement) = send(
        &app,
        "POST",
        "/api/zones/A/machines",
        Some(json!({ "id": "77", "x": 5000.0, "y": -10.0, "status": "active" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(placement["position"]["x"], 1200.0);
    assert_eq!(placement["position"]["y"], 0.0);
    assert_eq!(placement["status"], "active");
}

#[tokio::test]
async fn test_add_machine_unknown_zone() {
    let (app, _) = create_test_app();

    let (status, body) = send(
        &app,
        "POST",
        "/api/zones/Z/machines",
        Some(json!({ "id": "1", "x": 1.0, "y": 1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("'Z'"));
}

#[tokio::test]
async fn test_add_machine_blank_id() {
    let (app, _) = create_test_app();

    let (status, _) = send(
        &app,
        "POST",
        "/api/zones/A/machines",
        Some(json!({ "id": "  ", "x": 1.0, "y": 1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Base machines can be moved but not removed.
#[tokio::test]
async fn test_remove_base_machine_forbidden() {
    let (app, _) = create_test_app();

    let (status, _) = send(&app, "DELETE", "/api/zones/A/machines/2", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Dragging it creates an overlay shadow, which is removable
    let (status, _) = send(
        &app,
        "PUT",
        "/api/zones/A/machines/2/position",
        Some(json!({ "x": 10.0, "y": 20.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "DELETE", "/api/zones/A/machines/2", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Base copy is still there
    let (_, zone) = send(&app, "GET", "/api/zones/A", None).await;
    assert!(zone["machines"]["2"].is_object());
}

#[tokio::test]
async fn test_remove_unknown_machine() {
    let (app, _) = create_test_app();

    let (status, _) = send(&app, "DELETE", "/api/zones/A/machines/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Zones created through the API are removable, base zones are not.
#[tokio::test]
async fn test_zone_lifecycle() {
    let (app, _) = create_test_app();

    let (status, zone) = send(
        &app,
        "PUT",
        "/api/zones/D",
        Some(json!({ "image": "/img/d.png", "baseWidth": 640, "baseHeight": 480 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(zone["image"], "/img/d.png");
    assert_eq!(zone["baseWidth"], 640);

    let (_, zones) = send(&app, "GET", "/api/zones", None).await;
    let zones = zones.as_array().unwrap();
    assert_eq!(zones.len(), 4);
    assert_eq!(zones[3]["id"], "D");
    assert_eq!(zones[3]["removable"], true);
    assert_eq!(zones[0]["removable"], false);
    assert_eq!(zones[0]["machineCount"], 4);

    let (status, _) = send(&app, "DELETE", "/api/zones/A", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "DELETE", "/api/zones/D", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "DELETE", "/api/zones/D", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upsert_blank_zone_id() {
    let (app, _) = create_test_app();

    let (status, body) = send(&app, "PUT", "/api/zones/%20", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "zone id must not be empty");
}

/// Moving a machine places it in the target zone as inactive.
#[tokio::test]
async fn test_move_machine() {
    let (app, _) = create_test_app();

    send(
        &app,
        "POST",
        "/api/zones/A/machines",
        Some(json!({ "id": "50", "x": 1.0, "y": 1.0, "status": "active" })),
    )
    .await;

    let (status, placement) = send(
        &app,
        "POST",
        "/api/machines/50/move",
        Some(json!({ "fromZone": "A", "toZone": "B", "x": 30.0, "y": 40.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(placement["status"], "inactive");

    let (_, found) = send(&app, "GET", "/api/machines/50/zone", None).await;
    assert_eq!(found["zone"], "B");

    let (_, zone_a) = send(&app, "GET", "/api/zones/A", None).await;
    assert!(zone_a["machines"]["50"].is_null());
}

#[tokio::test]
async fn test_move_machine_unknown_target() {
    let (app, _) = create_test_app();

    let (status, _) = send(
        &app,
        "POST",
        "/api/machines/1/move",
        Some(json!({ "fromZone": "A", "toZone": "Q", "x": 0.0, "y": 0.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_and_find_machines() {
    let (app, _) = create_test_app();

    let (status, ids) = send(&app, "GET", "/api/machines", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids, json!(["1", "2", "3", "312", "7", "8"]));

    let (status, found) = send(&app, "GET", "/api/machines/8/zone", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found, json!({ "id": "8", "zone": "B" }));

    let (status, _) = send(&app, "GET", "/api/machines/404/zone", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Export is served as an attachment with the effective layout.
#[tokio::test]
async fn test_export_layout() {
    let (app, state) = create_test_app();
    state.store.add_machine(
        "C",
        "9",
        floorplan::layout::Position::new(5.0, 5.0),
        floorplan::layout::MachineStatus::Inactive,
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/layout/export")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(disposition, "attachment; filename=\"layout.export.json\"");

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let layout: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(layout["C"]["machines"]["9"]["position"]["x"], 5.0);
}

#[tokio::test]
async fn test_broker_config_per_zone() {
    let (app, state) = create_test_app();

    let (status, cfg) = send(&app, "GET", "/api/zones/A/broker-config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cfg["fiwareService"], "textileservice");

    let (status, _) = send(
        &app,
        "PUT",
        "/api/zones/A/broker-config",
        Some(json!({ "fiwareService": "plant2", "fiwareServicePath": "/weave" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, cfg) = send(&app, "GET", "/api/zones/A/broker-config", None).await;
    assert_eq!(cfg["fiwareService"], "plant2");
    assert_eq!(cfg["entityPrefixes"], "emeter, gmeter, dmeter");

    // Other zones keep the default
    let (_, cfg) = send(&app, "GET", "/api/zones/B/broker-config", None).await;
    assert_eq!(cfg["fiwareService"], "textileservice");
    assert!(state.broker_configs.has_zone_config("A"));
}

/// Edits survive a restart on file storage.
#[tokio::test]
async fn test_overlay_survives_restart() {
    let temp_dir = tempfile::TempDir::new().unwrap();

    {
        let storage: Arc<dyn KeyValueStorage> =
            Arc::new(FileStorage::new(temp_dir.path()).unwrap());
        let app = create_layout_router(create_test_state(storage));
        let (status, _) = send(
            &app,
            "POST",
            "/api/zones/B/machines",
            Some(json!({ "id": "900", "x": 10.0, "y": 10.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let storage: Arc<dyn KeyValueStorage> = Arc::new(FileStorage::new(temp_dir.path()).unwrap());
    let app = create_layout_router(create_test_state(storage));
    let (_, found) = send(&app, "GET", "/api/machines/900/zone", None).await;
    assert_eq!(found["zone"], "B");
}
