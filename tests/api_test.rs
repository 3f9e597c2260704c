use atelier::config::Config;
use atelier::db;
use atelier::routes;
use atelier::state::AppState;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

fn test_app() -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    let pool = db::create_pool(&dir.path().join("api.db")).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");
    let app = routes::router(AppState::new(pool, Config::default()));
    (dir, app)
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register(app: &Router, email: &str, role: &str) -> (String, String) {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/users",
        None,
        Some(json!({ "email": email, "role": role })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    (
        body["user"]["id"].as_str().unwrap().to_string(),
        body["token"].as_str().unwrap().to_string(),
    )
}

/// Drives a project up to `completed_by_designer` and returns the proposal id.
async fn delivered_project(app: &Router, client: &str, designer: &str, price: i64) -> String {
    let (status, request) = call(
        app,
        Method::POST,
        "/api/requests",
        Some(client),
        Some(json!({ "title": "Bedroom makeover", "budget": price })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let request_id = request["id"].as_str().unwrap();

    let (status, proposal) = call(
        app,
        Method::POST,
        &format!("/api/requests/{}/proposals", request_id),
        Some(designer),
        Some(json!({ "price": price, "timeline_days": 10, "message": "Let's do it" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(proposal["status"], "pending");
    let proposal_id = proposal["id"].as_str().unwrap().to_string();

    let (status, accepted) = call(
        app,
        Method::POST,
        &format!("/api/proposals/{}/accept", proposal_id),
        Some(client),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["accepted"]["project_status"], "in_progress");

    let (status, delivered) = call(
        app,
        Method::POST,
        &format!("/api/proposals/{}/complete", proposal_id),
        Some(designer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivered["project_status"], "completed_by_designer");

    proposal_id
}

#[tokio::test]
async fn test_health() {
    let (_dir, app) = test_app();
    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_me_requires_authentication() {
    let (_dir, app) = test_app();
    let (status, body) = call(&app, Method::GET, "/api/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = call(&app, Method::GET, "/api/me", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_full_completion_flow_over_http() {
    let (_dir, app) = test_app();
    let (_, client) = register(&app, "client@example.com", "client").await;
    let (designer_id, designer) = register(&app, "designer@example.com", "designer").await;

    let (status, deposit) = call(
        &app,
        Method::POST,
        "/api/me/deposits",
        Some(&client),
        Some(json!({ "amount": 50000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deposit["balance"], 50000);
    assert_eq!(deposit["transaction"]["type"], "deposit");

    let proposal_id = delivered_project(&app, &client, &designer, 30000).await;

    let (status, receipt) = call(
        &app,
        Method::POST,
        &format!("/api/proposals/{}/confirm", proposal_id),
        Some(&client),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "confirm failed: {}", receipt);
    assert_eq!(receipt["client_balance"], 20000);
    assert_eq!(receipt["designer_balance"], 30000);
    assert_eq!(receipt["proposal"]["stage"], "completed");
    assert_eq!(receipt["proposal"]["project_status"], "completed");
    assert_eq!(receipt["transaction"]["type"], "project_payment");

    let (status, again) = call(
        &app,
        Method::POST,
        &format!("/api/proposals/{}/confirm", proposal_id),
        Some(&client),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(again["error"].is_string());

    let (status, rating) = call(
        &app,
        Method::POST,
        &format!("/api/proposals/{}/ratings", proposal_id),
        Some(&client),
        Some(json!({ "rating": 5, "comment": "Wonderful" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rating["rating_count"], 1);

    let (status, profile) = call(
        &app,
        Method::GET,
        &format!("/api/users/{}", designer_id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["rating_count"], 1);
    assert_eq!(profile["average_rating"], 5.0);
    assert!(profile.get("balance").is_none());

    let (status, count) = call(
        &app,
        Method::GET,
        "/api/notifications/unread-count",
        Some(&designer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(count["count"].as_i64().unwrap() >= 3);
}

#[tokio::test]
async fn test_confirm_without_funds_returns_402() {
    let (_dir, app) = test_app();
    let (_, client) = register(&app, "client@example.com", "client").await;
    let (_, designer) = register(&app, "designer@example.com", "designer").await;

    call(
        &app,
        Method::POST,
        "/api/me/deposits",
        Some(&client),
        Some(json!({ "amount": 10000 })),
    )
    .await;

    let proposal_id = delivered_project(&app, &client, &designer, 30000).await;

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/proposals/{}/confirm", proposal_id),
        Some(&client),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert!(body["error"].is_string());

    let (_, me) = call(&app, Method::GET, "/api/me", Some(&client), None).await;
    assert_eq!(me["balance"], 10000);

    let (_, proposal) = call(
        &app,
        Method::GET,
        &format!("/api/proposals/{}", proposal_id),
        Some(&client),
        None,
    )
    .await;
    assert_eq!(proposal["project_status"], "completed_by_designer");
}

#[tokio::test]
async fn test_designer_cannot_post_requests() {
    let (_dir, app) = test_app();
    let (_, designer) = register(&app, "designer@example.com", "designer").await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/requests",
        Some(&designer),
        Some(json!({ "title": "Not mine", "budget": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_proposal_is_404() {
    let (_dir, app) = test_app();
    let (_, client) = register(&app, "client@example.com", "client").await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/proposals/does-not-exist/confirm",
        Some(&client),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_logout_invalidates_token() {
    let (_dir, app) = test_app();
    let (_, client) = register(&app, "client@example.com", "client").await;

    let (status, _) = call(&app, Method::POST, "/api/logout", Some(&client), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&app, Method::GET, "/api/me", Some(&client), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_registering_a_taken_email_is_409() {
    let (_dir, app) = test_app();
    register(&app, "taken@example.com", "client").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/users",
        None,
        Some(json!({ "email": "Taken@Example.com", "role": "designer" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already in use"));
}
