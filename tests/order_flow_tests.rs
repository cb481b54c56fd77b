mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, wait_for, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::str::FromStr;
use uuid::Uuid;

fn decimal(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal string")).expect("decimal")
}

fn upi_order(order_number: &str, product_id: Uuid, quantity: i32) -> Value {
    json!({
        "orderNumber": order_number,
        "amount": "1",
        "shippingAddress": { "fullName": "Priya Sharma", "phone": "9876543210" },
        "items": [{ "product_id": product_id, "quantity": quantity, "price": "1" }]
    })
}

#[tokio::test]
async fn upi_order_is_priced_from_catalog_and_reserves_stock() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let saree = app.seed_product("Kanjivaram Silk", dec!(450), Some(5)).await;

    let response = app
        .request(
            Method::POST,
            "/api/orders/create-upi",
            Some(upi_order("SS-1001", saree.id, 2)),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    // 900 subtotal is below the free-shipping threshold
    assert_eq!(decimal(&body["amount"]), dec!(999));
    let link = body["upi"]["link"].as_str().unwrap();
    assert!(link.starts_with("upi://pay?"), "{}", link);
    assert!(link.contains("tr=SS-1001"), "{}", link);

    let order_id = body["orderId"].as_str().unwrap().to_string();
    let response = app
        .request(
            Method::GET,
            &format!("/api/orders/get?id={}", order_id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let order = response_json(response).await["order"].clone();
    assert_eq!(order["status"], "pending");
    assert_eq!(order["payment_status"], "pending");
    assert_eq!(order["items"].as_array().unwrap().len(), 1);
    assert_eq!(order["items"][0]["quantity"], 2);

    let product = response_json(
        app.request(Method::GET, &format!("/api/products/{}", saree.id), None, None)
            .await,
    )
    .await;
    assert_eq!(product["stock_quantity"], 3);
}

#[tokio::test]
async fn duplicate_order_number_conflicts() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let saree = app.seed_product("Banarasi", dec!(1200), None).await;

    let first = app
        .request(
            Method::POST,
            "/api/orders/create-upi",
            Some(upi_order("SS-2001", saree.id, 1)),
            Some(&token),
        )
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .request(
            Method::POST,
            "/api/orders/create-upi",
            Some(upi_order("SS-2001", saree.id, 1)),
            Some(&token),
        )
        .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn stock_and_availability_are_enforced() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let scarce = app.seed_product("Paithani", dec!(3000), Some(1)).await;

    let response = app
        .request(
            Method::POST,
            "/api/orders/create-upi",
            Some(upi_order("SS-3001", scarce.id, 2)),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            "/api/orders/create-upi",
            Some(upi_order("SS-3002", Uuid::new_v4(), 1)),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            "/api/orders/create-upi",
            Some(json!({ "orderNumber": "SS-3003", "items": [] })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Invalid payload");
}

#[tokio::test]
async fn orders_are_private_to_their_owner() {
    let app = TestApp::new().await;
    let (_, owner) = app.customer().await;
    let (_, stranger) = app.customer().await;
    let saree = app.seed_product("Chanderi", dec!(1500), None).await;
    let (order_id, _) = app.place_upi_order(&owner, &saree, 1).await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/orders/get?id={}", order_id),
            None,
            Some(&stranger),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(Method::GET, "/api/orders/get?id=not-a-uuid", None, Some(&owner))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(Method::GET, "/api/orders/get", None, Some(&owner))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_verifies_upi_payment() {
    let app = TestApp::new().await;
    let (_, customer) = app.customer().await;
    let (admin_id, admin) = app.admin().await;
    let saree = app.seed_product("Tussar", dec!(2500), None).await;
    let (order_id, _) = app.place_upi_order(&customer, &saree, 1).await;

    let pending = response_json(
        app.request(Method::GET, "/api/admin/orders/pending", None, Some(&admin))
            .await,
    )
    .await;
    let queued = pending["orders"].as_array().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0]["id"], order_id.to_string());

    let proof = app
        .request(
            Method::POST,
            "/api/orders/update-proof",
            Some(json!({ "id": order_id, "upi_transaction_id": "UPI123456" })),
            Some(&customer),
        )
        .await;
    assert_eq!(proof.status(), StatusCode::OK);

    for _ in 0..2 {
        let response = app
            .request(
                Method::POST,
                "/api/admin/orders/mark-paid",
                Some(json!({ "id": order_id, "upi_transaction_id": "UPI123456" })),
                Some(&admin),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let order = response_json(
        app.request(
            Method::GET,
            &format!("/api/orders/get?id={}", order_id),
            None,
            Some(&customer),
        )
        .await,
    )
    .await["order"]
        .clone();
    assert_eq!(order["payment_status"], "verified");
    assert_eq!(order["status"], "confirmed");
    assert_eq!(order["verified_by"], admin_id.to_string());

    let pending = response_json(
        app.request(Method::GET, "/api/admin/orders/pending", None, Some(&admin))
            .await,
    )
    .await;
    assert_eq!(pending["orders"], json!([]));

    // Settled orders cannot be cancelled
    let response = app
        .request(
            Method::POST,
            "/api/admin/orders/cancel",
            Some(json!({ "id": order_id })),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Placement and verification each send one e-mail to the shipping address
    let sent = wait_for(|| app.email.sent.lock().unwrap().len(), 2).await;
    assert!(sent >= 2, "expected two e-mails, saw {}", sent);
}

#[tokio::test]
async fn cancelled_order_cannot_be_marked_paid() {
    let app = TestApp::new().await;
    let (_, customer) = app.customer().await;
    let (_, admin) = app.admin().await;
    let saree = app.seed_product("Bandhani", dec!(800), Some(4)).await;
    let (order_id, _) = app.place_upi_order(&customer, &saree, 3).await;

    // Repeating a cancel is a no-op
    for _ in 0..2 {
        let response = app
            .request(
                Method::POST,
                "/api/admin/orders/cancel",
                Some(json!({ "id": order_id })),
                Some(&admin),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .request(
            Method::POST,
            "/api/admin/orders/mark-paid",
            Some(json!({ "id": order_id })),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            "/api/admin/orders/mark-paid",
            Some(json!({ "id": "" })),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn shipping_an_order_messages_the_customer() {
    let app = TestApp::new().await;
    let (_, customer) = app.customer().await;
    let (_, admin) = app.admin().await;
    let saree = app.seed_product("Kota Doria", dec!(1100), None).await;
    let (order_id, _) = app.place_upi_order(&customer, &saree, 1).await;

    app.request(
        Method::POST,
        "/api/admin/orders/mark-paid",
        Some(json!({ "id": order_id })),
        Some(&admin),
    )
    .await;

    let skipped = app
        .request(
            Method::POST,
            "/api/admin/orders/update-status",
            Some(json!({ "id": order_id, "status": "delivered" })),
            Some(&admin),
        )
        .await;
    assert_eq!(skipped.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            "/api/admin/orders/update-status",
            Some(json!({
                "id": order_id,
                "status": "shipped",
                "trackingNumber": "TRK-42",
                "estimatedDelivery": "3-5 days"
            })),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["order"]["status"], "shipped");
    assert_eq!(body["order"]["tracking_number"], "TRK-42");

    let sent = wait_for(|| app.whatsapp.texts.lock().unwrap().len(), 1).await;
    assert_eq!(sent, 1);
    let texts = app.whatsapp.texts.lock().unwrap();
    assert_eq!(texts[0].0, "919876543210");
    assert!(texts[0].1.contains("TRK-42"));
}

#[tokio::test]
async fn auto_cancel_ignores_fresh_orders() {
    let app = TestApp::new().await;
    let (_, customer) = app.customer().await;
    let saree = app.seed_product("Mysore Silk", dec!(5000), None).await;
    app.place_upi_order(&customer, &saree, 1).await;

    let response = app
        .request(
            Method::POST,
            "/api/cron/auto-cancel-pending",
            None,
            Some(common::CRON_SECRET),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["cancelled"], 0);
}

#[tokio::test]
async fn auto_cancel_sweeps_stale_orders() {
    let app = TestApp::with_config(|cfg| cfg.store.pending_order_timeout_mins = 0).await;
    let (_, customer) = app.customer().await;
    let (_, admin) = app.admin().await;
    let saree = app.seed_product("Pochampally", dec!(2200), None).await;
    let (order_id, _) = app.place_upi_order(&customer, &saree, 1).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let response = app
        .request(
            Method::POST,
            "/api/cron/auto-cancel-pending",
            None,
            Some(common::CRON_SECRET),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["cancelled"], 1);

    let listed = response_json(
        app.request(
            Method::GET,
            "/api/admin/orders?status=cancelled",
            None,
            Some(&admin),
        )
        .await,
    )
    .await;
    assert_eq!(listed["data"][0]["id"], order_id.to_string());
    assert_eq!(listed["data"][0]["payment_status"], "failed");
}
