mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use serde_json::json;

#[tokio::test]
async fn protected_routes_require_a_session() {
    let app = TestApp::new().await;

    for uri in ["/api/wishlist", "/api/addresses", "/api/orders/get?id=abc"] {
        let response = app.request(Method::GET, uri, None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }

    let body = response_json(app.request(Method::GET, "/api/wishlist", None, None).await).await;
    assert_eq!(body["error"]["code"], "AUTH_MISSING");
}

#[tokio::test]
async fn invalid_token_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/wishlist", None, Some("not-a-jwt"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["error"]["code"], "AUTH_INVALID_TOKEN");
}

#[tokio::test]
async fn customers_cannot_reach_admin_routes() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;

    for uri in [
        "/api/admin/orders/pending",
        "/api/admin/analytics",
        "/api/admin/settings",
        "/api/admin/products",
    ] {
        let response = app.request(Method::GET, uri, None, Some(&token)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);
    }

    let response = app
        .request(
            Method::POST,
            "/api/admin/orders/mark-paid",
            Some(json!({ "id": uuid::Uuid::new_v4() })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admins_reach_the_back_office() {
    let app = TestApp::new().await;
    let (_, token) = app.admin().await;

    let response = app
        .request(Method::GET, "/api/admin/orders/pending", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["orders"], json!([]));
}

#[tokio::test]
async fn token_without_profile_is_not_admin() {
    let app = TestApp::new().await;
    let token = app
        .state
        .auth
        .issue_token(uuid::Uuid::new_v4(), None, chrono::Duration::minutes(5))
        .unwrap();

    let response = app
        .request(Method::GET, "/api/admin/analytics", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn cron_endpoint_checks_shared_secret() {
    let app = TestApp::new().await;

    let missing = app
        .request(Method::POST, "/api/cron/auto-cancel-pending", None, None)
        .await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .request(
            Method::POST,
            "/api/cron/auto-cancel-pending",
            None,
            Some("not-the-secret"),
        )
        .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let ok = app
        .request(
            Method::POST,
            "/api/cron/auto-cancel-pending",
            None,
            Some(common::CRON_SECRET),
        )
        .await;
    assert_eq!(ok.status(), StatusCode::OK);
    let body = response_json(ok).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["cancelled"], 0);
}

#[tokio::test]
async fn cron_endpoint_is_closed_without_configured_secret() {
    let app = TestApp::with_config(|cfg| cfg.cron_secret = None).await;

    let response = app
        .request(
            Method::POST,
            "/api/cron/auto-cancel-pending",
            None,
            Some(common::CRON_SECRET),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
