//! HTTP surface tests through the full router and middleware stack.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

fn cart_body(product_id: Uuid, quantity: i32) -> Value {
    json!({
        "items": [{
            "product_id": product_id,
            "quantity": quantity,
            "name": "Alpaca wool scarf",
            "price": "90.00"
        }]
    })
}

fn submit_body(payment_method: &str) -> Value {
    json!({
        "customer": {"name": "Ana Quispe", "email": "ana@example.com", "phone": "987654321"},
        "address": {"line": "Av. Arequipa 1234, Lince", "district_code": "150116"},
        "shipping": {"rate_id": "lima-standard", "cost": "0.50"},
        "coupon": {"code": "HOLA10", "type": "percentage", "discount": "10"},
        "terms_accepted": true,
        "payment_method": payment_method
    })
}

fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .map(|s| s.parse().expect("decimal string"))
        .or_else(|| value.as_f64().and_then(|f| Decimal::try_from(f).ok()))
        .expect("decimal value")
}

#[tokio::test]
async fn health_reports_database_and_echoes_request_id() {
    let app = TestApp::new().await;

    let response = app
        .request_with_headers(Method::GET, "/health", None, &[("x-request-id", "req-health-1")])
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "req-health-1"
    );
    let body = response_json(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["database"]["status"], "up");
}

#[tokio::test]
async fn every_response_gets_a_request_id() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/api/v1/status-labels", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["order_status"].as_array().unwrap().len(), 6);
    assert_eq!(body["data"]["payment_status"].as_array().unwrap().len(), 4);
    assert_eq!(body["data"]["fulfillment_status"].as_array().unwrap().len(), 4);
    assert_eq!(body["data"]["order_status"][0]["value"], "pending");
    assert!(body["meta"]["request_id"].is_string());
}

#[tokio::test]
async fn storefront_checkout_to_paid_order_over_http() {
    let app = TestApp::new().await;
    let product = app.seed_stock(5).await;
    let session = Uuid::new_v4();
    let base = format!("/api/v1/checkout/sessions/{}", session);

    let response = app
        .request(Method::PUT, &format!("{}/cart", base), Some(cart_body(product, 2)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(app.request(Method::GET, &format!("{}/cart", base), None).await).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    let availability = app
        .request(Method::POST, &format!("{}/availability", base), None)
        .await;
    assert_eq!(availability.status(), StatusCode::OK);
    assert_eq!(response_json(availability).await["data"]["status"], "available");

    let response = app
        .request_with_headers(
            Method::POST,
            &format!("{}/submit", base),
            Some(submit_body("bank_transfer")),
            &[("idempotency-key", "http-flow-1")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = response_json(response).await;
    assert_eq!(created["data"]["route"]["kind"], "upload_proof");
    assert!(created["data"]["order_number"]
        .as_str()
        .unwrap()
        .starts_with("ORD-"));
    let order_id = created["data"]["order_id"].as_str().unwrap().to_string();
    let view_token = created["data"]["route"]["view_token"]
        .as_str()
        .unwrap()
        .to_string();

    let body = response_json(app.request(Method::GET, &format!("{}/cart", base), None).await).await;
    assert!(body["data"]["items"].as_array().unwrap().is_empty());

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/lookup",
            Some(json!({"view_token": view_token, "email": "Ana@Example.com"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let order = response_json(response).await;
    assert_eq!(decimal(&order["data"]["subtotal"]), dec!(180));
    assert_eq!(decimal(&order["data"]["shipping_cost"]), dec!(15));
    assert_eq!(decimal(&order["data"]["discount"]), dec!(18));
    assert_eq!(decimal(&order["data"]["total"]), dec!(177));
    assert_eq!(order["data"]["order_status"]["value"], "pending");

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/lookup/payment-proof",
            Some(json!({
                "view_token": view_token,
                "email": "ana@example.com",
                "proof_image_url": "https://cdn.example.com/proofs/op-1.png",
                "reference": "OP-1"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let proof = response_json(response).await;
    assert_eq!(
        proof["data"]["pending_payment"]["verification_status"]["value"],
        "under_review"
    );

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/admin/orders/{}/payment-proof/review", order_id),
            Some(json!({"approved": true})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let reviewed = response_json(response).await;
    assert_eq!(reviewed["data"]["payment_status"]["value"], "paid");

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/admin/orders/{}/refund", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let refunded = response_json(response).await;
    assert_eq!(refunded["message"], "Payment refunded");
    assert_eq!(refunded["data"]["payment_status"]["value"], "refunded");
    assert!(refunded["data"]["paid_at"].is_null());
}

#[tokio::test]
async fn invalid_form_names_the_field() {
    let app = TestApp::new().await;
    let product = app.seed_stock(5).await;
    let base = format!("/api/v1/checkout/sessions/{}", Uuid::new_v4());
    app.request(Method::PUT, &format!("{}/cart", base), Some(cart_body(product, 1)))
        .await;

    let mut body = submit_body("mobile_transfer");
    body["terms_accepted"] = json!(false);
    let response = app
        .request(Method::POST, &format!("{}/submit", base), Some(body))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = response_json(response).await;
    assert_eq!(error["field"], "terms");
    assert_eq!(error["message"], "You must accept the terms and conditions");
    assert!(error["request_id"].is_string());
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn empty_session_cannot_submit() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/sessions/{}/submit", Uuid::new_v4()),
            Some(submit_body("bank_transfer")),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(response).await["field"], "cart");
}

#[tokio::test]
async fn out_of_stock_is_a_conflict_with_details() {
    let app = TestApp::new().await;
    let product = app.seed_stock(1).await;
    let base = format!("/api/v1/checkout/sessions/{}", Uuid::new_v4());
    app.request(Method::PUT, &format!("{}/cart", base), Some(cart_body(product, 4)))
        .await;

    let response = app
        .request(Method::POST, &format!("{}/submit", base), Some(submit_body("bank_transfer")))
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let error = response_json(response).await;
    let unavailable = &error["details"]["unavailable"][0];
    assert_eq!(unavailable["requested"], 4);
    assert_eq!(unavailable["available"], 1);
}

#[tokio::test]
async fn card_submit_then_token_creates_paid_order() {
    let app = TestApp::new().await;
    let product = app.seed_stock(3).await;
    let base = format!("/api/v1/checkout/sessions/{}", Uuid::new_v4());
    app.request(Method::PUT, &format!("{}/cart", base), Some(cart_body(product, 1)))
        .await;

    let response = app
        .request(Method::POST, &format!("{}/submit", base), Some(submit_body("card")))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["route"]["kind"], "await_card_token");
    assert!(body["data"]["order_id"].is_null());

    let mut token_body = submit_body("card");
    token_body["token"] = json!("");
    let response = app
        .request(Method::POST, &format!("{}/card-token", base), Some(token_body.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    token_body["token"] = json!("tok_visa_4242");
    let response = app
        .request(Method::POST, &format!("{}/card-token", base), Some(token_body))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "paid");
    assert_eq!(app.gateway.charge_count(), 1);
    assert_eq!(app.available(product).await, 2);
}

#[tokio::test]
async fn declined_card_is_payment_required() {
    let app = TestApp::new().await;
    let product = app.seed_stock(3).await;
    let base = format!("/api/v1/checkout/sessions/{}", Uuid::new_v4());
    app.request(Method::PUT, &format!("{}/cart", base), Some(cart_body(product, 1)))
        .await;
    app.gateway.set_behavior(common::ChargeBehavior::Decline);

    let mut token_body = submit_body("card");
    token_body["token"] = json!("tok_declined");
    let response = app
        .request(Method::POST, &format!("{}/card-token", base), Some(token_body))
        .await;

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let error = response_json(response).await;
    assert_eq!(error["details"]["retry_with_new_token"], true);
}

#[tokio::test]
async fn refund_of_pending_order_is_a_conflict() {
    let app = TestApp::new().await;
    let product = app.seed_stock(3).await;
    let base = format!("/api/v1/checkout/sessions/{}", Uuid::new_v4());
    app.request(Method::PUT, &format!("{}/cart", base), Some(cart_body(product, 1)))
        .await;
    let created = response_json(
        app.request(Method::POST, &format!("{}/submit", base), Some(submit_body("bank_transfer")))
            .await,
    )
    .await;
    let order_id = created["data"]["order_id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/admin/orders/{}/refund", order_id),
            Some(json!({"admin_notes": "customer asked"})),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let error = response_json(response).await;
    assert_eq!(error["details"]["axis"], "payment");
    assert_eq!(error["details"]["guard"], "refund");
    assert_eq!(error["details"]["from"], "pending");
}

#[tokio::test]
async fn admin_patch_updates_several_axes() {
    let app = TestApp::new().await;
    let product = app.seed_stock(3).await;
    let base = format!("/api/v1/checkout/sessions/{}", Uuid::new_v4());
    app.request(Method::PUT, &format!("{}/cart", base), Some(cart_body(product, 1)))
        .await;
    let created = response_json(
        app.request(Method::POST, &format!("{}/submit", base), Some(submit_body("bank_transfer")))
            .await,
    )
    .await;
    let order_id = created["data"]["order_id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/admin/orders/{}", order_id),
            Some(json!({
                "order_status": "confirmed",
                "payment_status": "paid",
                "admin_notes": "Paid at the counter"
            })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["order_status"]["value"], "confirmed");
    assert_eq!(body["data"]["order_status"]["label"].as_str().map(str::is_empty), Some(false));
    assert_eq!(body["data"]["payment_status"]["value"], "paid");
    assert_eq!(body["data"]["admin_notes"], "Paid at the counter");
    assert_eq!(body["data"]["version"], 2);
}

#[tokio::test]
async fn customer_lookup_hides_admin_notes() {
    let app = TestApp::new().await;
    let product = app.seed_stock(3).await;
    let base = format!("/api/v1/checkout/sessions/{}", Uuid::new_v4());
    app.request(Method::PUT, &format!("{}/cart", base), Some(cart_body(product, 1)))
        .await;
    let created = response_json(
        app.request(Method::POST, &format!("{}/submit", base), Some(submit_body("bank_transfer")))
            .await,
    )
    .await;
    let order_id = created["data"]["order_id"].as_str().unwrap().to_string();
    let view_token = created["data"]["route"]["view_token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/admin/orders/{}", order_id),
            Some(json!({"admin_notes": "repeat buyer, flagged chargeback in 2023"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let customer = response_json(
        app.request(
            Method::POST,
            "/api/v1/orders/lookup",
            Some(json!({"view_token": view_token, "email": "ana@example.com"})),
        )
        .await,
    )
    .await;
    assert_eq!(customer["data"]["order_number"], created["data"]["order_number"]);
    assert!(customer["data"].get("admin_notes").is_none());

    let admin = response_json(
        app.request(Method::GET, &format!("/api/v1/admin/orders/{}", order_id), None)
            .await,
    )
    .await;
    assert_eq!(
        admin["data"]["admin_notes"],
        "repeat buyer, flagged chargeback in 2023"
    );
}

#[tokio::test]
async fn reading_an_unknown_session_does_not_create_it() {
    let app = TestApp::new().await;
    let sessions = &app.state.services.sessions;

    for _ in 0..3 {
        let uri = format!("/api/v1/checkout/sessions/{}/cart", Uuid::new_v4());
        let response = app.request(Method::GET, &uri, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert!(body["data"]["items"].as_array().unwrap().is_empty());
    }
    assert_eq!(sessions.len(), 0);

    let product = app.seed_stock(2).await;
    let uri = format!("/api/v1/checkout/sessions/{}/cart", Uuid::new_v4());
    app.request(Method::PUT, &uri, Some(cart_body(product, 1))).await;
    assert_eq!(sessions.len(), 1);
}

#[tokio::test]
async fn absurd_cart_prices_are_a_field_error() {
    let app = TestApp::new().await;
    let product = app.seed_stock(2).await;
    let base = format!("/api/v1/checkout/sessions/{}", Uuid::new_v4());
    let cart = json!({
        "items": [{
            "product_id": product,
            "quantity": 2,
            "name": "Alpaca wool scarf",
            "price": Decimal::MAX.to_string()
        }]
    });
    app.request(Method::PUT, &format!("{}/cart", base), Some(cart)).await;

    let response = app
        .request(Method::POST, &format!("{}/submit", base), Some(submit_body("bank_transfer")))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["field"], "cart");
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn unknown_orders_are_not_found() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/admin/orders/{}", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/lookup",
            Some(json!({"view_token": "nope", "email": "ana@example.com"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_and_openapi_are_served() {
    storefront_orders::metrics::register_metrics();
    let app = TestApp::new().await;
    let product = app.seed_stock(2).await;
    let base = format!("/api/v1/checkout/sessions/{}", Uuid::new_v4());
    app.request(Method::PUT, &format!("{}/cart", base), Some(cart_body(product, 1)))
        .await;
    let response = app
        .request(Method::POST, &format!("{}/submit", base), Some(submit_body("bank_transfer")))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.request(Method::GET, "/metrics", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("storefront_orders_created_total"));

    let response = app.request(Method::GET, "/api-docs/openapi.json", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = response_json(response).await;
    assert!(doc["paths"]
        .get("/api/v1/checkout/sessions/{session_id}/submit")
        .is_some());
    assert!(doc["paths"].get("/api/v1/admin/orders/{id}/cancel").is_some());
}
