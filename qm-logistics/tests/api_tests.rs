//! Integration tests for the qm-logistics command surface
//!
//! Tests cover:
//! - Project, requirement and status commands
//! - Ledger commands and the withdraw guard
//! - Bulk paste partial success
//! - Dashboard binding through the API
//! - Deferred replies and follow-up tickets

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use qm_common::db::{init_database, init_memory_database, ChannelId, MessageId, MessageRef};
use qm_common::events::EventBus;
use qm_logistics::db::{bindings, projects};
use qm_logistics::services::{DashboardSynchronizer, HttpPublisher, LogPublisher};
use qm_logistics::{build_router, AppState};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

/// Test helper: app over an existing pool
fn app_on(pool: SqlitePool, ack_deadline: Duration) -> Router {
    let dashboard = Arc::new(DashboardSynchronizer::new(
        pool.clone(),
        Arc::new(LogPublisher::new()),
        Duration::from_secs(1),
    ));
    let state = AppState::new(pool, EventBus::new(64), dashboard, ack_deadline);
    build_router(state)
}

/// Test helper: app over a fresh in-memory database
async fn setup_app() -> (Router, SqlitePool) {
    let pool = init_memory_database().await.unwrap();
    (app_on(pool.clone(), Duration::from_secs(5)), pool)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn test_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, extract_json(response.into_body()).await)
}

/// Poll a follow-up until the command's own reply is stored
async fn await_followup(app: &Router, ack: &Value) -> (StatusCode, Value) {
    let followup = ack["followup"].as_str().unwrap().to_string();
    for _ in 0..100 {
        let (status, body) = send(app, test_request("GET", &followup)).await;
        if status != StatusCode::ACCEPTED {
            return (status, body);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("follow-up {} never completed", followup);
}

async fn deposit(app: &Router, owner: i64, item: &str, amount: i64) -> (StatusCode, Value) {
    send(
        app,
        json_request(
            "POST",
            &format!("/guilds/1/members/{}/deposit", owner),
            json!({"item": item, "amount": amount}),
        ),
    )
    .await
}

async fn create_project_with(app: &Router, name: &str, item: &str, amount: i64) {
    let (status, _) = send(app, json_request("POST", "/guilds/1/projects", json!({"name": name}))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        app,
        json_request(
            "PUT",
            &format!("/guilds/1/projects/{}/requirements", name),
            json!({"item": item, "amount": amount}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _pool) = setup_app().await;
    let (status, body) = send(&app, test_request("GET", "/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "qm-logistics");
    assert!(body["version"].is_string());
}

// =============================================================================
// Projects and status
// =============================================================================

#[tokio::test]
async fn test_status_after_two_owners_deposit() {
    let (app, _pool) = setup_app().await;
    create_project_with(&app, "P", "Widget", 100).await;
    deposit(&app, 100, "Widget", 40).await;
    let (_, change) = deposit(&app, 200, "Widget", 10).await;
    assert_eq!(change["owner_quantity"], 10);
    assert_eq!(change["guild_total"], 50);

    let (status, report) = send(&app, test_request("GET", "/guilds/1/projects/P/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["requirements"][0]["direct_total"], 50);
    assert_eq!(report["requirements"][0]["direct_progress"], 0.5);
    assert_eq!(report["complete"], false);

    let (status, body) = send(
        &app,
        json_request("POST", "/guilds/1/members/100/withdraw", json!({"item": "Widget", "amount": 60})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_STOCK");
    assert_eq!(body["error"]["message"], "cannot withdraw 60 of Widget: only 40 on record");

    let (_, stock) = send(&app, test_request("GET", "/guilds/1/members/100/stock")).await;
    assert_eq!(stock["items"][0]["quantity"], 40);
}

#[tokio::test]
async fn test_potential_from_recipe_is_not_completion() {
    let (app, _pool) = setup_app().await;
    create_project_with(&app, "P", "Widget", 100).await;

    let (status, body) = send(
        &app,
        json_request("POST", "/recipes", json!({"output": "Widget", "input": "Bolt", "ratio": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["output"]["is_crafted"], true);

    deposit(&app, 300, "Bolt", 200).await;

    let (_, report) = send(&app, test_request("GET", "/guilds/1/projects/P/status")).await;
    let widget = &report["requirements"][0];
    assert_eq!(widget["direct_total"], 0);
    assert_eq!(widget["potential_total"], 100);
    assert_eq!(widget["potential_progress"], 1.0);
    assert_eq!(report["complete"], false);
}

#[tokio::test]
async fn test_requirement_upsert_replaces_target() {
    let (app, _pool) = setup_app().await;
    create_project_with(&app, "P", "Widget", 100).await;

    let (_, body) = send(
        &app,
        json_request("PUT", "/guilds/1/projects/P/requirements", json!({"item": "widget", "amount": 30})),
    )
    .await;
    assert_eq!(body["requirement"]["target_amount"], 30);

    let (_, export) = send(&app, test_request("GET", "/guilds/1/projects/P/requirements/export")).await;
    assert_eq!(export["text"], "Widget: 30\n");
}

#[tokio::test]
async fn test_duplicate_project_and_unknown_project() {
    let (app, _pool) = setup_app().await;
    send(&app, json_request("POST", "/guilds/1/projects", json!({"name": "Refinery"}))).await;

    let (status, body) = send(&app, json_request("POST", "/guilds/1/projects", json!({"name": "refinery"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "DUPLICATE_NAME");

    let (status, body) = send(&app, test_request("GET", "/guilds/1/projects/Nope/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "project 'Nope' not found");
}

#[tokio::test]
async fn test_project_status_transition() {
    let (app, _pool) = setup_app().await;
    create_project_with(&app, "P", "Widget", 1).await;

    let (status, body) = send(
        &app,
        json_request("PUT", "/guilds/1/projects/P/status", json!({"status": "completed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let (status, _) = send(
        &app,
        json_request("PUT", "/guilds/1/projects/P/status", json!({"status": "archived"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bulk_requirement_edit() {
    let (app, _pool) = setup_app().await;
    create_project_with(&app, "P", "Scrap", 1).await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/guilds/1/projects/P/requirements/bulk",
            json!({"text": "Scrap: 500\nGold: 10"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"].as_array().unwrap().len(), 2);
}

// =============================================================================
// Ledger
// =============================================================================

#[tokio::test]
async fn test_fractional_and_zero_amounts_rejected() {
    let (app, _pool) = setup_app().await;

    let (status, body) = send(
        &app,
        json_request("POST", "/guilds/1/members/1/deposit", json!({"item": "Gold", "amount": 2.5})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_AMOUNT");

    let (status, _) = deposit(&app, 1, "Gold", 0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bulk_update_reports_single_bad_line() {
    let (app, _pool) = setup_app().await;

    let text = "Scrap: 500\nGold: 10\nQuantanium fifty\nIron: 7\nCopper: 3";
    let (status, body) = send(
        &app,
        json_request("POST", "/guilds/1/members/5/stock/bulk", json!({"text": text})),
    )
    .await;

    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert_eq!(body["applied"].as_array().unwrap().len(), 4);
    assert_eq!(body["failures"].as_array().unwrap().len(), 1);
    assert_eq!(body["failures"][0]["line_number"], 3);

    let (_, export) = send(&app, test_request("GET", "/guilds/1/members/5/stock/export")).await;
    assert_eq!(export["text"], "Copper: 3\nGold: 10\nIron: 7\nScrap: 500\n");
}

#[tokio::test]
async fn test_modify_quantity_to_zero_clears_row() {
    let (app, _pool) = setup_app().await;
    deposit(&app, 1, "Gold", 10).await;

    let (status, body) = send(
        &app,
        json_request("PUT", "/guilds/1/members/1/stock", json!({"item": "Gold", "quantity": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["guild_total"], 0);

    let (_, stock) = send(&app, test_request("GET", "/guilds/1/members/1/stock")).await;
    assert!(stock["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_locate_lists_holders_and_total() {
    let (app, _pool) = setup_app().await;
    deposit(&app, 1, "Scrap", 5).await;
    deposit(&app, 2, "Scrap", 50).await;

    let (status, body) = send(&app, test_request("GET", "/guilds/1/items/scrap/holders")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["guild_total"], 55);
    assert_eq!(body["holders"][0]["owner_id"], 2);

    let (status, _) = send(&app, test_request("GET", "/guilds/1/items/Unobtainium/holders")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_wipe_requires_exact_phrase() {
    let (app, _pool) = setup_app().await;
    deposit(&app, 1, "Scrap", 5).await;
    deposit(&app, 2, "Gold", 5).await;

    let (status, _) = send(&app, json_request("DELETE", "/guilds/1/stock", json!({"confirm": "delete everything"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, json_request("DELETE", "/guilds/1/stock", json!({"confirm": "DELETE EVERYTHING"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 2);
}

// =============================================================================
// Lookups
// =============================================================================

#[tokio::test]
async fn test_item_autocomplete_with_and_without_owner() {
    let (app, _pool) = setup_app().await;
    deposit(&app, 1, "Quantanium", 5).await;
    deposit(&app, 2, "Raw Quantanium", 5).await;

    let (_, all) = send(&app, test_request("GET", "/items/autocomplete?q=quant")).await;
    assert_eq!(all, json!(["Quantanium", "Raw Quantanium"]));

    let (_, mine) = send(&app, test_request("GET", "/items/autocomplete?q=quant&guild=1&owner=2")).await;
    assert_eq!(mine, json!(["Raw Quantanium"]));
}

#[tokio::test]
async fn test_production_report() {
    let (app, _pool) = setup_app().await;
    send(&app, json_request("POST", "/recipes", json!({"output": "Widget", "input": "Bolt", "ratio": 5}))).await;
    deposit(&app, 1, "Bolt", 12).await;
    deposit(&app, 2, "Bolt", 3).await;

    let (status, body) = send(&app, test_request("GET", "/guilds/1/items/Widget/production")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["producible"], 3);
    let holders = body["ingredients"][0]["capable_holders"].as_array().unwrap();
    assert_eq!(holders.len(), 1);
    assert_eq!(holders[0]["can_make"], 2);

    let (status, _) = send(&app, test_request("GET", "/guilds/1/items/Bolt/production")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Dashboard and follow-ups
// =============================================================================

#[tokio::test]
async fn test_dashboard_set_twice_keeps_one_binding() {
    let (app, pool) = setup_app().await;
    create_project_with(&app, "P", "Widget", 100).await;

    let request = || json_request("POST", "/guilds/1/dashboard", json!({"project": "P", "channel_id": 77}));
    let (status, first) = send(&app, request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["action"], "published");

    let (_, second) = send(&app, request()).await;
    assert_eq!(second["action"], "edited");
    assert_eq!(second["message"], first["message"]);

    let bindings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dashboard_bindings")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(bindings, 1);
}

#[tokio::test]
async fn test_slow_command_is_acknowledged_then_followed_up() {
    let (app, pool) = setup_app().await;
    create_project_with(&app, "P", "Widget", 100).await;

    let impatient = app_on(pool, Duration::ZERO);
    let (status, ack) = send(&impatient, test_request("GET", "/guilds/1/projects/P/status")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(ack["state"], "pending");

    let (status, reply) = await_followup(&impatient, &ack).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["project"]["name"], "P");
}

#[tokio::test]
async fn test_created_status_survives_the_follow_up() {
    let (_app, pool) = setup_app().await;
    let impatient = app_on(pool, Duration::ZERO);

    let (status, ack) = send(&impatient, json_request("POST", "/guilds/1/projects", json!({"name": "Late"}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, project) = await_followup(&impatient, &ack).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(project["name"], "Late");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deposit_behind_held_write_lock_is_acknowledged() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("qm.db")).await.unwrap();
    let app = app_on(pool.clone(), Duration::from_millis(200));

    let mut blocker = pool.acquire().await.unwrap();
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *blocker).await.unwrap();

    let started = std::time::Instant::now();
    let (status, ack) = send(
        &app,
        json_request("POST", "/guilds/1/members/1/deposit", json!({"item": "Gold", "amount": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(started.elapsed() < Duration::from_millis(1000));

    tokio::time::sleep(Duration::from_millis(300)).await;
    sqlx::query("COMMIT").execute(&mut *blocker).await.unwrap();
    drop(blocker);

    let (status, change) = await_followup(&app, &ack).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["owner_quantity"], 5);
    assert_eq!(change["guild_total"], 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deposit_succeeds_while_publisher_is_down() {
    let pool = init_memory_database().await.unwrap();
    let project = projects::create_project(&pool, qm_common::db::GuildId(1), "P").await.unwrap();
    {
        let mut conn = pool.acquire().await.unwrap();
        let message = MessageRef {
            channel_id: ChannelId(10),
            message_id: MessageId(1),
        };
        bindings::upsert_binding(&mut conn, project.guild_id, message, project.id)
            .await
            .unwrap();
    }

    // Nothing listens on the discard port, so every edit fails
    let publisher = HttpPublisher::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
    let dashboard = Arc::new(DashboardSynchronizer::new(
        pool.clone(),
        Arc::new(publisher),
        Duration::from_millis(500),
    ));
    let events = EventBus::new(64);
    let worker = dashboard.clone().spawn_refresh_worker(&events, Duration::from_millis(20));
    let app = build_router(AppState::new(pool, events, dashboard, Duration::from_secs(5)));

    let (status, change) = deposit(&app, 1, "Widget", 10).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["guild_total"], 10);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!worker.is_finished(), "refresh failure must not stop the worker");

    let (status, _) = deposit(&app, 1, "Widget", 5).await;
    assert_eq!(status, StatusCode::OK);
    worker.abort();
}

#[tokio::test]
async fn test_unknown_followup_ticket() {
    let (app, _pool) = setup_app().await;
    let uri = format!("/followups/{}", uuid::Uuid::new_v4());
    let (status, _) = send(&app, test_request("GET", &uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
