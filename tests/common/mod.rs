#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use marketplace::{
    api::create_api_router,
    config::Config,
    entities::{
        connect, coupon,
        coupon::DiscountType,
        order::{self, Entity as OrderEntity},
        product::{self, Entity as ProductEntity, VariantGroup, VariantGroups, VariantOption, VariantSelection},
        setup_schema,
        user::{self, Role},
    },
    middleware::auth::generate_token,
    services::{
        checkout::ShippingAddress,
        payment::{PaymentError, PaymentGateway, PaymentSession, PaymentSessionRequest},
    },
    AppState,
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::{Mutex, Notify};

pub const SECRET: &str = "test-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const ORIGIN: &str = "https://shop.test";

pub async fn setup_db() -> DatabaseConnection {
    let db = connect("sqlite::memory:").await.expect("Failed to open in-memory database");
    setup_schema(&db).await.expect("Failed to create schema");
    db
}

pub async fn create_user(db: &DatabaseConnection, username: &str, role: Role) -> user::Model {
    user::ActiveModel {
        username: Set(username.to_owned()),
        role: Set(role),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert user")
}

pub fn option(value: &str, price_modifier: i64, stock: i64) -> VariantOption {
    VariantOption {
        value: value.to_owned(),
        price_modifier,
        stock,
        sku: None,
    }
}

pub fn group(name: &str, options: Vec<VariantOption>) -> VariantGroup {
    VariantGroup {
        name: name.to_owned(),
        options,
    }
}

pub fn select(name: &str, value: &str) -> VariantSelection {
    VariantSelection {
        name: name.to_owned(),
        value: value.to_owned(),
    }
}

pub async fn create_product(
    db: &DatabaseConnection,
    vendor_id: i32,
    name: &str,
    base_price: i64,
    variants: Vec<VariantGroup>,
) -> product::Model {
    let total_stock = variants
        .iter()
        .flat_map(|group| group.options.iter())
        .map(|option| option.stock)
        .sum();
    product::ActiveModel {
        vendor_id: Set(vendor_id),
        name: Set(name.to_owned()),
        base_price: Set(base_price),
        variants: Set(VariantGroups(variants)),
        total_stock: Set(total_stock),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert product")
}

pub async fn reload_product(db: &DatabaseConnection, id: i32) -> product::Model {
    ProductEntity::find_by_id(id)
        .one(db)
        .await
        .expect("Failed to load product")
        .expect("Product is missing")
}

pub async fn reload_order(db: &DatabaseConnection, id: i32) -> order::Model {
    OrderEntity::find_by_id(id)
        .one(db)
        .await
        .expect("Failed to load order")
        .expect("Order is missing")
}

pub async fn reload_coupon(db: &DatabaseConnection, id: i32) -> coupon::Model {
    coupon::Entity::find_by_id(id)
        .one(db)
        .await
        .expect("Failed to load coupon")
        .expect("Coupon is missing")
}

pub fn option_stock(product: &product::Model, group: &str, value: &str) -> i64 {
    product
        .find_option(&select(group, value))
        .map(|option| option.stock)
        .expect("Option is missing")
}

pub struct NewCoupon {
    pub code: &'static str,
    pub discount_type: DiscountType,
    pub value: i64,
    pub min_order_amount: i64,
    pub max_uses: i64,
    pub used_count: i64,
}

impl NewCoupon {
    pub fn percentage(code: &'static str, value: i64) -> NewCoupon {
        NewCoupon {
            code,
            discount_type: DiscountType::Percentage,
            value,
            min_order_amount: 0,
            max_uses: 0,
            used_count: 0,
        }
    }

    pub fn fixed(code: &'static str, value: i64) -> NewCoupon {
        NewCoupon {
            discount_type: DiscountType::Fixed,
            ..NewCoupon::percentage(code, value)
        }
    }
}

pub async fn create_coupon(db: &DatabaseConnection, fields: NewCoupon) -> coupon::Model {
    let now = Utc::now();
    coupon::ActiveModel {
        code: Set(fields.code.to_owned()),
        discount_type: Set(fields.discount_type),
        value: Set(fields.value),
        min_order_amount: Set(fields.min_order_amount),
        max_uses: Set(fields.max_uses),
        used_count: Set(fields.used_count),
        vendor_id: Set(None),
        is_active: Set(true),
        expires_at: Set(now + Duration::days(7)),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert coupon")
}

pub fn address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Ada Lovelace".to_owned(),
        street: "12 Analytical Row".to_owned(),
        city: "London".to_owned(),
        state: "Greater London".to_owned(),
        zip: "N1 9GU".to_owned(),
        country: "GB".to_owned(),
    }
}

/// Records every session request. Fails while `failing` is set.
#[derive(Default)]
pub struct FakeGateway {
    pub requests: Mutex<Vec<PaymentSessionRequest>>,
    pub failing: std::sync::atomic::AtomicBool,
    counter: AtomicUsize,
}

impl FakeGateway {
    pub fn failing() -> FakeGateway {
        let gateway = FakeGateway::default();
        gateway.set_failing(true);
        gateway
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn last_request(&self) -> Option<PaymentSessionRequest> {
        self.requests.lock().await.last().cloned()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_session(
        &self,
        request: PaymentSessionRequest,
    ) -> Result<PaymentSession, PaymentError> {
        self.requests.lock().await.push(request);
        if self.failing.load(Ordering::SeqCst) {
            return Err(PaymentError::Rejected {
                status: 503,
                message: "provider unavailable".to_owned(),
            });
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentSession {
            id: format!("cs_test_{}", n),
            url: format!("https://pay.test/session/cs_test_{}", n),
        })
    }
}

/// Holds the first session request until [`HeldGateway::release`], so a second
/// checkout can run while the first one is still waiting on the provider.
#[derive(Default)]
pub struct HeldGateway {
    pub inner: FakeGateway,
    entered: Notify,
    released: Notify,
    calls: AtomicUsize,
}

impl HeldGateway {
    pub async fn wait_until_held(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[async_trait]
impl PaymentGateway for HeldGateway {
    async fn create_session(
        &self,
        request: PaymentSessionRequest,
    ) -> Result<PaymentSession, PaymentError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.entered.notify_one();
            self.released.notified().await;
        }
        self.inner.create_session(request).await
    }
}

/// Moves an order's creation time into the past.
pub async fn backdate_order(db: &DatabaseConnection, id: i32, minutes: i64) {
    let order = reload_order(db, id).await;
    let created_at = order.created_at - Duration::minutes(minutes);
    let mut active: order::ActiveModel = order.into();
    active.created_at = Set(created_at);
    active.update(db).await.expect("Failed to backdate order");
}

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_owned(),
        bind_addr: "127.0.0.1:0".to_owned(),
        jwt_secret: SECRET.to_owned(),
        stripe_secret_key: "sk_test".to_owned(),
        stripe_webhook_secret: WEBHOOK_SECRET.to_owned(),
        stripe_api_base: "http://127.0.0.1:9".to_owned(),
        app_origin: ORIGIN.to_owned(),
        currency: "usd".to_owned(),
        seed_demo_data: false,
    }
}

pub struct TestApp {
    pub base_url: String,
    pub state: AppState,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }
}

/// Serves the full router on an ephemeral local port.
pub async fn spawn_app(db: DatabaseConnection, gateway: Arc<FakeGateway>) -> TestApp {
    let state = AppState::new(db, gateway, test_config());
    let app = create_api_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    TestApp {
        base_url: format!("http://{}", addr),
        state,
        client: reqwest::Client::new(),
    }
}

pub fn bearer(user: &user::Model) -> String {
    let token = generate_token(user.id, user.role, SECRET).expect("Failed to generate token");
    format!("Bearer {}", token)
}
