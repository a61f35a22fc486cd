//! Order proxy against a mock orders API

mod common;

use std::sync::{Arc, Mutex};

use axum::{Json, Router, extract::State, routing::post};
use common::*;

type Captured = Arc<Mutex<Vec<Value>>>;

/// Mock backend answering every order with `status` and `reply`.
async fn mock_orders_api(status: StatusCode, reply: Value) -> (String, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));

    let router = Router::new()
        .route(
            "/api/checkout/create-session/",
            post(
                move |State(captured): State<Captured>, Json(body): Json<Value>| {
                    let reply = reply.clone();
                    async move {
                        captured.lock().unwrap().push(body);
                        (status, Json(reply))
                    }
                },
            ),
        )
        .with_state(captured.clone());

    (spawn_server(router).await, captured)
}

fn order_input() -> Value {
    json!({
        "event_id": 7,
        "category_id": 3,
        "quantity": 2,
        "name": " Ann Lee ",
        "email": "ann@example.com",
        "phone": "+1 555 0100",
        "comments": "Aisle seats"
    })
}

async fn place_order(ctx: &TestContext, body: &Value) -> (StatusCode, Value) {
    let response = ctx
        .app()
        .oneshot(post_json("/api/orders", body))
        .await
        .unwrap();
    let status = response.status();
    (status, json_body(response).await)
}

#[tokio::test]
async fn test_successful_order_is_forwarded_and_returned() {
    let (base, captured) = mock_orders_api(
        StatusCode::CREATED,
        json!({
            "order_id": 1234,
            "order_number": "WTA-0001",
            "checkout_url": "https://checkout.stripe.test/pay/cs_backend"
        }),
    )
    .await;
    let ctx = test_context_with_orders(&base);

    let (status, json) = place_order(&ctx, &order_input()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["order_id"], "1234");
    assert_eq!(json["order_number"], "WTA-0001");
    assert_eq!(json["checkout_url"], "https://checkout.stripe.test/pay/cs_backend");
    assert!(json.get("error").is_none());

    let sent = captured.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["name"], "Ann Lee");
    assert_eq!(
        sent[0]["items"],
        json!([{ "event_id": 7, "category_id": 3, "quantity": 2 }])
    );
}

#[tokio::test]
async fn test_nested_order_id_is_accepted() {
    let (base, _) = mock_orders_api(
        StatusCode::OK,
        json!({ "order": { "id": "ord_9", "order_number": "N-9" } }),
    )
    .await;
    let ctx = test_context_with_orders(&base);

    let (status, json) = place_order(&ctx, &order_input()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["order_id"], "ord_9");
    assert_eq!(json["order_number"], "N-9");
}

#[tokio::test]
async fn test_backend_field_errors_are_joined() {
    let (base, _) = mock_orders_api(
        StatusCode::BAD_REQUEST,
        json!({
            "email": ["Enter a valid email address."],
            "items": ["Category is sold out."]
        }),
    )
    .await;
    let ctx = test_context_with_orders(&base);

    let (status, json) = place_order(&ctx, &order_input()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    let error = json["error"].as_str().unwrap();
    assert!(error.contains("Enter a valid email address."));
    assert!(error.contains("Category is sold out."));
}

#[tokio::test]
async fn test_wrapped_validation_details_are_surfaced() {
    let (base, _) = mock_orders_api(
        StatusCode::BAD_REQUEST,
        json!({
            "error": "bad_request",
            "message": "Validation error",
            "details": { "email": ["Enter a valid email address."] }
        }),
    )
    .await;
    let ctx = test_context_with_orders(&base);

    let (status, json) = place_order(&ctx, &order_input()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Enter a valid email address.");
}

#[tokio::test]
async fn test_backend_non_field_and_detail_errors() {
    for (reply, expected) in [
        (json!({ "non_field_errors": ["Event is closed"] }), "Event is closed"),
        (json!({ "detail": "Not found." }), "Not found."),
        (json!({}), "Failed to create order"),
    ] {
        let (base, _) = mock_orders_api(StatusCode::BAD_REQUEST, reply).await;
        let ctx = test_context_with_orders(&base);

        let (status, json) = place_order(&ctx, &order_input()).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], expected);
    }
}

#[tokio::test]
async fn test_success_without_order_id_is_an_invalid_response() {
    let (base, _) = mock_orders_api(StatusCode::OK, json!({ "ok": true })).await;
    let ctx = test_context_with_orders(&base);

    let (status, json) = place_order(&ctx, &order_input()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Invalid order response");
}

#[tokio::test]
async fn test_unreachable_backend_is_connection_error() {
    // Nothing listens on the discard port.
    let ctx = test_context_with_orders("http://127.0.0.1:9");

    let (status, json) = place_order(&ctx, &order_input()).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Connection error");
}

#[tokio::test]
async fn test_invalid_input_never_reaches_backend() {
    let (base, captured) = mock_orders_api(StatusCode::OK, json!({ "order_id": 1 })).await;
    let ctx = test_context_with_orders(&base);

    let mut zero_quantity = order_input();
    zero_quantity["quantity"] = json!(0);
    let mut bad_email = order_input();
    bad_email["email"] = json!("not-an-email");
    let mut no_phone = order_input();
    no_phone["phone"] = json!("  ");

    for (body, expected) in [
        (zero_quantity, "Quantity must be between 1 and 10"),
        (bad_email, "Email address is invalid"),
        (no_phone, "Phone is required"),
    ] {
        let (status, json) = place_order(&ctx, &body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], expected);
    }

    assert!(captured.lock().unwrap().is_empty());
}
