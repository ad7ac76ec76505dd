mod common;

use chrono::{Duration, Utc};
use common::*;
use marketplace::{
    entities::{order::Status, user::Role},
    services::{
        cart as cart_store, checkout::ABANDONED_ORDER_GRACE_MINUTES, order as orders,
        payment::signature::sign,
    },
};
use reqwest::{header, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

async fn post_checkout(app: &TestApp, token: &str, payload: Value) -> reqwest::Response {
    app.client
        .post(app.url("/api/checkout"))
        .header(header::AUTHORIZATION, token)
        .json(&payload)
        .send()
        .await
        .expect("Failed to send checkout request")
}

async fn post_webhook(app: &TestApp, body: &Value, signature: Option<String>) -> reqwest::Response {
    let mut request = app
        .client
        .post(app.url("/api/webhooks/payment"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(serde_json::to_vec(body).unwrap());
    if let Some(signature) = signature {
        request = request.header("Stripe-Signature", signature);
    }
    request.send().await.expect("Failed to send webhook request")
}

fn signed(body: &Value) -> String {
    sign(&serde_json::to_vec(body).unwrap(), WEBHOOK_SECRET, Utc::now().timestamp())
}

fn session_completed(order_id: i64, intent: &str) -> Value {
    json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_test_1",
            "payment_intent": intent,
            "metadata": { "order_id": order_id.to_string() }
        } }
    })
}

#[tokio::test]
async fn test_checkout_then_paid_webhook() {
    let db = setup_db().await;
    let vendor = create_user(&db, "vendor", Role::Vendor).await;
    let shopper = create_user(&db, "shopper", Role::User).await;
    let shirt = create_product(
        &db,
        vendor.id,
        "Shirt",
        1000,
        vec![group("Size", vec![option("Large", 200, 5)])],
    )
    .await;
    cart_store::add_item(&db, shopper.id, shirt.id, vec![select("Size", "Large")], 2)
        .await
        .unwrap();
    let gateway = Arc::new(FakeGateway::default());
    let app = spawn_app(db, gateway.clone()).await;
    let token = bearer(&shopper);

    // Step 1: checkout
    let response = post_checkout(
        &app,
        &token,
        json!({ "shipping_address": address(), "coupon_code": null }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.json::<Value>().await.unwrap();
    let order_id = body["order_id"].as_i64().expect("order_id is missing");
    assert!(body["url"].as_str().unwrap().starts_with("https://pay.test/"));

    let request = gateway.last_request().await.unwrap();
    assert_eq!(
        request.success_url,
        format!("{}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}", ORIGIN)
    );

    // Step 2: the provider confirms payment, twice
    let event = session_completed(order_id, "pi_123");
    for _ in 0..2 {
        let response = post_webhook(&app, &event, Some(signed(&event))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.json::<Value>().await.unwrap(), json!({ "received": true }));
    }

    // Step 3: the order shows up as paid, stock taken once
    let orders = app
        .client
        .get(app.url("/api/orders"))
        .header(header::AUTHORIZATION, &token)
        .send()
        .await
        .expect("Failed to send orders request")
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(orders.as_array().unwrap().len(), 1);
    assert_eq!(orders[0]["status"], "paid");
    assert_eq!(orders[0]["total"], 2400);
    assert_eq!(orders[0]["items"][0]["unit_price"], 1200);

    let shirt = reload_product(app.db(), shirt.id).await;
    assert_eq!(option_stock(&shirt, "Size", "Large"), 3);
    assert!(cart_store::get_items(app.db(), shopper.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_checkout_errors_are_actionable() {
    let db = setup_db().await;
    let shopper = create_user(&db, "shopper", Role::User).await;
    let app = spawn_app(db, Arc::new(FakeGateway::default())).await;
    let token = bearer(&shopper);

    let response = post_checkout(
        &app,
        &token,
        json!({ "shipping_address": { "full_name": "Ada", "city": "London" } }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.json::<Value>().await.unwrap();
    assert_eq!(
        body["error"],
        "Complete shipping address is required (missing: street, state, zip, country)"
    );

    let response = post_checkout(&app, &token, json!({ "shipping_address": address() })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.json::<Value>().await.unwrap();
    assert_eq!(body["error"], "Cart is empty");
}

#[tokio::test]
async fn test_gateway_outage_is_bad_gateway() {
    let db = setup_db().await;
    let vendor = create_user(&db, "vendor", Role::Vendor).await;
    let shopper = create_user(&db, "shopper", Role::User).await;
    let mug = create_product(&db, vendor.id, "Mug", 1000, vec![]).await;
    cart_store::add_item(&db, shopper.id, mug.id, vec![], 1).await.unwrap();
    let app = spawn_app(db, Arc::new(FakeGateway::failing())).await;

    let response = post_checkout(&app, &bearer(&shopper), json!({ "shipping_address": address() })).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = response.json::<Value>().await.unwrap();
    assert_eq!(body["error"], "Payment provider is unavailable, please retry");
}

#[tokio::test]
async fn test_webhook_rejects_bad_signatures() {
    let db = setup_db().await;
    let vendor = create_user(&db, "vendor", Role::Vendor).await;
    let shopper = create_user(&db, "shopper", Role::User).await;
    let mug = create_product(&db, vendor.id, "Mug", 1000, vec![]).await;
    cart_store::add_item(&db, shopper.id, mug.id, vec![], 1).await.unwrap();
    let app = spawn_app(db, Arc::new(FakeGateway::default())).await;

    let body = post_checkout(&app, &bearer(&shopper), json!({ "shipping_address": address() }))
        .await
        .json::<Value>()
        .await
        .unwrap();
    let order_id = body["order_id"].as_i64().unwrap();
    let event = session_completed(order_id, "pi_forged");

    let stale = sign(
        &serde_json::to_vec(&event).unwrap(),
        WEBHOOK_SECRET,
        Utc::now().timestamp() - 3600,
    );
    let wrong_secret = sign(
        &serde_json::to_vec(&event).unwrap(),
        "whsec_other",
        Utc::now().timestamp(),
    );

    for signature in [None, Some("garbage".to_owned()), Some(stale), Some(wrong_secret)] {
        let response = post_webhook(&app, &event, signature).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
    assert_eq!(reload_order(app.db(), order_id as i32).await.status, Status::Pending);
}

#[tokio::test]
async fn test_webhook_acknowledges_what_it_cannot_apply() {
    let app = spawn_app(setup_db().await, Arc::new(FakeGateway::default())).await;

    let unknown_order = session_completed(4242, "pi_1");
    let unknown_type = json!({ "type": "customer.created", "data": { "object": {} } });

    for event in [unknown_order, unknown_type] {
        let response = post_webhook(&app, &event, Some(signed(&event))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.json::<Value>().await.unwrap(), json!({ "received": true }));
    }
}

#[tokio::test]
async fn test_order_views_are_scoped() {
    let db = setup_db().await;
    let potter = create_user(&db, "potter", Role::Vendor).await;
    let weaver = create_user(&db, "weaver", Role::Vendor).await;
    let shopper = create_user(&db, "shopper", Role::User).await;
    let stranger = create_user(&db, "stranger", Role::User).await;
    let mug = create_product(&db, potter.id, "Mug", 1000, vec![]).await;
    let rug = create_product(&db, weaver.id, "Rug", 7500, vec![]).await;
    cart_store::add_item(&db, shopper.id, mug.id, vec![], 1).await.unwrap();
    cart_store::add_item(&db, shopper.id, rug.id, vec![], 1).await.unwrap();
    let app = spawn_app(db, Arc::new(FakeGateway::default())).await;

    let body = post_checkout(&app, &bearer(&shopper), json!({ "shipping_address": address() }))
        .await
        .json::<Value>()
        .await
        .unwrap();
    let order_id = body["order_id"].as_i64().unwrap();

    let response = app
        .client
        .get(app.url(&format!("/api/orders/{}", order_id)))
        .header(header::AUTHORIZATION, bearer(&stranger))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .client
        .get(app.url("/api/vendor/orders"))
        .header(header::AUTHORIZATION, bearer(&shopper))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let vendor_view = app
        .client
        .get(app.url("/api/vendor/orders"))
        .header(header::AUTHORIZATION, bearer(&weaver))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    let items = vendor_view[0]["items"].as_array().unwrap();
    assert_eq!(vendor_view[0]["id"], order_id);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_id"], rug.id);
}

#[tokio::test]
async fn test_admin_coupons() {
    let db = setup_db().await;
    let admin = create_user(&db, "admin", Role::Admin).await;
    let shopper = create_user(&db, "shopper", Role::User).await;
    let app = spawn_app(db, Arc::new(FakeGateway::default())).await;
    let expires_at = Utc::now() + Duration::days(10);

    let payload = json!({
        "code": "spring-25",
        "discount_type": "percentage",
        "value": 25,
        "max_uses": 100,
        "expires_at": expires_at
    });

    let response = app
        .client
        .post(app.url("/api/admin/coupons"))
        .header(header::AUTHORIZATION, bearer(&shopper))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .client
        .post(app.url("/api/admin/coupons"))
        .header(header::AUTHORIZATION, bearer(&admin))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = response.json::<Value>().await.unwrap();
    assert_eq!(created["code"], "SPRING-25");
    assert_eq!(created["used_count"], 0);

    let response = app
        .client
        .post(app.url("/api/admin/coupons"))
        .header(header::AUTHORIZATION, bearer(&admin))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let invalid = [
        json!({ "code": "X", "discount_type": "fixed", "value": 100, "expires_at": expires_at }),
        json!({ "code": "TOOMUCH", "discount_type": "percentage", "value": 150, "expires_at": expires_at }),
        json!({ "code": "PAST", "discount_type": "fixed", "value": 100, "expires_at": Utc::now() - Duration::days(1) }),
        json!({ "code": "ZERO", "discount_type": "fixed", "value": 0, "expires_at": expires_at }),
    ];
    for payload in invalid {
        let response = app
            .client
            .post(app.url("/api/admin/coupons"))
            .header(header::AUTHORIZATION, bearer(&admin))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "payload: {}", payload);
    }

    let listed = app
        .client
        .get(app.url("/api/admin/coupons"))
        .header(header::AUTHORIZATION, bearer(&admin))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_admin_status_transitions_and_sweep() {
    let db = setup_db().await;
    let admin = create_user(&db, "admin", Role::Admin).await;
    let vendor = create_user(&db, "vendor", Role::Vendor).await;
    let shopper = create_user(&db, "shopper", Role::User).await;
    let mug = create_product(&db, vendor.id, "Mug", 1000, vec![]).await;
    cart_store::add_item(&db, shopper.id, mug.id, vec![], 1).await.unwrap();
    let gateway = Arc::new(FakeGateway::default());
    let app = spawn_app(db, gateway.clone()).await;
    let admin_token = bearer(&admin);

    let body = post_checkout(&app, &bearer(&shopper), json!({ "shipping_address": address() }))
        .await
        .json::<Value>()
        .await
        .unwrap();
    let order_id = body["order_id"].as_i64().unwrap();

    let patch_status = |status: &'static str| {
        app.client
            .patch(app.url(&format!("/api/admin/orders/{}", order_id)))
            .header(header::AUTHORIZATION, admin_token.clone())
            .json(&json!({ "status": status }))
            .send()
    };

    // only settlement can mark an order paid, and pending cannot skip ahead
    assert_eq!(patch_status("paid").await.unwrap().status(), StatusCode::BAD_REQUEST);
    assert_eq!(patch_status("shipped").await.unwrap().status(), StatusCode::CONFLICT);

    let event = session_completed(order_id, "pi_ship");
    post_webhook(&app, &event, Some(signed(&event))).await;

    for status in ["processing", "shipped", "delivered"] {
        let response = patch_status(status).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.json::<Value>().await.unwrap()["status"], status);
    }
    assert_eq!(patch_status("processing").await.unwrap().status(), StatusCode::CONFLICT);

    // an abandoned checkout for another cart
    gateway.set_failing(true);
    cart_store::add_item(app.db(), shopper.id, mug.id, vec![], 1).await.unwrap();
    let response = post_checkout(&app, &bearer(&shopper), json!({ "shipping_address": address() })).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let abandoned = orders::list_for_user(app.db(), shopper.id).await.unwrap()[0].order.id;

    let sweep = || {
        app.client
            .post(app.url("/api/admin/orders/sweep"))
            .header(header::AUTHORIZATION, admin_token.clone())
            .send()
    };

    // too fresh, its checkout may still be in flight
    let swept = sweep().await.unwrap().json::<Value>().await.unwrap();
    assert_eq!(swept, json!({ "cancelled": 0 }));

    backdate_order(app.db(), abandoned, ABANDONED_ORDER_GRACE_MINUTES + 1).await;
    let swept = sweep().await.unwrap().json::<Value>().await.unwrap();
    assert_eq!(swept, json!({ "cancelled": 1 }));
    assert_eq!(reload_order(app.db(), abandoned).await.status, Status::Cancelled);
    assert_eq!(reload_order(app.db(), order_id as i32).await.status, Status::Delivered);
}
