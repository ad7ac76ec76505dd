//! Turns a user's cart into a priced `pending` order and a hosted payment session.
//!
//! Stages run strictly in sequence: validating, pricing, persisting, awaiting the
//! payment session. Any failure before persisting leaves nothing behind. A failure
//! while creating the payment session leaves a `pending` order without a session
//! id, which a later checkout attempt (or the admin sweep) cancels once it is
//! older than [`ABANDONED_ORDER_GRACE_MINUTES`].

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info};
use validator::Validate;

use crate::entities::{
    coupon,
    order::{self, Entity as OrderEntity, Status},
    order_part,
    product::{Entity as ProductEntity, Selections},
};
use crate::error::{ServiceError, ValidationError};
use crate::services::{
    cart as cart_store,
    coupon as coupons,
    inventory,
    payment::{PaymentGateway, PaymentLineItem, PaymentSessionRequest},
    pricing::{compute_order_totals, compute_unit_price, LineAmount, OrderTotals},
};

/// A checkout still waiting on the payment provider is never swept.
pub const ABANDONED_ORDER_GRACE_MINUTES: i64 = 15;

const ADDRESS_FIELDS: [&str; 6] = ["full_name", "street", "city", "state", "zip", "country"];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ShippingAddress {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub full_name: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub street: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub city: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub state: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub zip: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub country: String,
}

impl ShippingAddress {
    fn trimmed(&self) -> ShippingAddress {
        ShippingAddress {
            full_name: self.full_name.trim().to_owned(),
            street: self.street.trim().to_owned(),
            city: self.city.trim().to_owned(),
            state: self.state.trim().to_owned(),
            zip: self.zip.trim().to_owned(),
            country: self.country.trim().to_owned(),
        }
    }

    /// Trims every field and requires all of them. The error lists the missing
    /// fields in form order.
    pub fn normalized(&self) -> Result<ShippingAddress, ValidationError> {
        let address = self.trimmed();
        if let Err(errors) = address.validate() {
            let failed: Vec<String> = errors
                .field_errors()
                .keys()
                .map(|field| field.to_string())
                .collect();
            let missing = ADDRESS_FIELDS
                .iter()
                .filter(|field| failed.iter().any(|f| f.as_str() == **field))
                .map(|field| field.to_string())
                .collect();
            return Err(ValidationError::IncompleteAddress(missing));
        }
        Ok(address)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckoutStage {
    Validating,
    Pricing,
    Persisting,
    AwaitingPaymentSession,
}

impl fmt::Display for CheckoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            CheckoutStage::Validating => "validating",
            CheckoutStage::Pricing => "pricing",
            CheckoutStage::Persisting => "persisting",
            CheckoutStage::AwaitingPaymentSession => "awaiting_payment_session",
        };
        f.write_str(value)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: i32,
    pub shipping_address: ShippingAddress,
    pub coupon_code: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckoutSession {
    pub order_id: i32,
    pub session_id: String,
    pub url: String,
}

/// Line resolved against the current catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricedItem {
    pub product_id: i32,
    pub product_name: String,
    pub vendor_id: i32,
    pub selections: Selections,
    pub quantity: i32,
    pub unit_price: i64,
}

impl LineAmount for PricedItem {
    fn unit_price(&self) -> i64 {
        self.unit_price
    }

    fn quantity(&self) -> i64 {
        i64::from(self.quantity)
    }
}

pub struct CheckoutOrchestrator<'a> {
    db: &'a DatabaseConnection,
    gateway: &'a dyn PaymentGateway,
    app_origin: &'a str,
    currency: &'a str,
}

impl<'a> CheckoutOrchestrator<'a> {
    pub fn new(
        db: &'a DatabaseConnection,
        gateway: &'a dyn PaymentGateway,
        app_origin: &'a str,
        currency: &'a str,
    ) -> Self {
        CheckoutOrchestrator {
            db,
            gateway,
            app_origin,
            currency,
        }
    }

    pub async fn initiate(
        &self,
        request: CheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckoutSession, ServiceError> {
        let user_id = request.user_id;
        let mut stage = CheckoutStage::Validating;
        let result = self.run(request, now, &mut stage).await;
        match &result {
            Ok(session) => info!(user_id, order_id = session.order_id, "Checkout session created"),
            Err(ServiceError::Validation(err)) => {
                debug!(user_id, %stage, reason = %err, "Checkout rejected")
            }
            Err(err) => error!(user_id, %stage, error = %err, "Checkout failed"),
        }
        result
    }

    async fn run(
        &self,
        request: CheckoutRequest,
        now: DateTime<Utc>,
        stage: &mut CheckoutStage,
    ) -> Result<CheckoutSession, ServiceError> {
        let address = request.shipping_address.normalized()?;

        let cart = cart_store::get_items(self.db, request.user_id).await?;
        if cart.is_empty() {
            return Err(ValidationError::EmptyCart.into());
        }

        *stage = CheckoutStage::Pricing;
        let items = self.price_items(&cart).await?;
        let subtotal = compute_order_totals(&items, 0).subtotal;

        let coupon = match request.coupon_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                Some(coupons::validate(self.db, code, subtotal, now).await?)
            }
            _ => None,
        };
        let discount = coupon
            .as_ref()
            .map(|coupon| coupons::compute_discount(coupon, subtotal))
            .unwrap_or(0);
        let totals = compute_order_totals(&items, discount);

        *stage = CheckoutStage::Persisting;
        cancel_abandoned_orders(self.db, Some(request.user_id), now).await?;
        let order = self
            .persist_order(request.user_id, &address, &items, totals, coupon.as_ref(), now)
            .await?;

        *stage = CheckoutStage::AwaitingPaymentSession;
        let session_request = self.session_request(&order, &items);
        let session = match self.gateway.create_session(session_request).await {
            Ok(session) => session,
            Err(err) => {
                error!(
                    order_id = order.id,
                    user_id = order.user_id,
                    error = %err,
                    "Payment session creation failed; order left pending without a session"
                );
                return Err(err.into());
            }
        };

        let mut active: order::ActiveModel = order.into();
        active.payment_session_id = Set(Some(session.id.clone()));
        active.updated_at = Set(Utc::now());
        let order = active.update(self.db).await?;

        Ok(CheckoutSession {
            order_id: order.id,
            session_id: session.id,
            url: session.url,
        })
    }

    /// Re-reads every product: the cart is a list of intents, not a price source.
    async fn price_items(
        &self,
        cart: &[crate::entities::cart::Model],
    ) -> Result<Vec<PricedItem>, ServiceError> {
        let mut items = Vec::with_capacity(cart.len());
        for entry in cart {
            let product = ProductEntity::find_by_id(entry.product_id)
                .one(self.db)
                .await?
                .filter(|product| product.is_active)
                .ok_or(ValidationError::ProductUnavailable {
                    product_id: entry.product_id,
                })?;

            let unit_price = compute_unit_price(&product, &entry.variant_selections);
            inventory::check_availability(
                &product,
                &entry.variant_selections,
                i64::from(entry.quantity),
            )?;

            items.push(PricedItem {
                product_id: product.id,
                product_name: product.name,
                vendor_id: product.vendor_id,
                selections: entry.variant_selections.clone(),
                quantity: entry.quantity,
                unit_price,
            });
        }
        Ok(items)
    }

    async fn persist_order(
        &self,
        user_id: i32,
        address: &ShippingAddress,
        items: &[PricedItem],
        totals: OrderTotals,
        coupon: Option<&coupon::Model>,
        now: DateTime<Utc>,
    ) -> Result<order::Model, DbErr> {
        let txn = self.db.begin().await?;
        let order = order::ActiveModel {
            user_id: Set(user_id),
            status: Set(Status::Pending),
            subtotal: Set(totals.subtotal),
            discount: Set(totals.discount),
            total: Set(totals.total),
            coupon_id: Set(coupon.map(|coupon| coupon.id)),
            payment_session_id: Set(None),
            payment_intent_id: Set(None),
            ship_full_name: Set(address.full_name.clone()),
            ship_street: Set(address.street.clone()),
            ship_city: Set(address.city.clone()),
            ship_state: Set(address.state.clone()),
            ship_zip: Set(address.zip.clone()),
            ship_country: Set(address.country.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for item in items {
            order_part::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(item.product_id),
                vendor_id: Set(item.vendor_id),
                variant_selections: Set(item.selections.clone()),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                total_price: Set(item.line_total()),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }
        txn.commit().await?;
        Ok(order)
    }

    fn session_request(&self, order: &order::Model, items: &[PricedItem]) -> PaymentSessionRequest {
        let line_items = items
            .iter()
            .map(|item| PaymentLineItem {
                name: item.product_name.clone(),
                description: (!item.selections.is_empty()).then(|| item.selections.describe()),
                unit_amount: item.unit_price,
                quantity: item.quantity,
            })
            .collect();

        PaymentSessionRequest {
            order_id: order.id,
            user_id: order.user_id,
            currency: self.currency.to_owned(),
            line_items,
            discount: (order.discount > 0).then_some(order.discount),
            success_url: format!(
                "{}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}",
                self.app_origin
            ),
            cancel_url: format!("{}/checkout/cancel?order_id={}", self.app_origin, order.id),
        }
    }
}

/// Cancels `pending` orders that never received a payment session and were created
/// more than the grace window before `now`. Orders that do have a session are left
/// for the provider's expiry event.
pub async fn cancel_abandoned_orders<C>(
    db: &C,
    user_id: Option<i32>,
    now: DateTime<Utc>,
) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
{
    let cutoff = now - Duration::minutes(ABANDONED_ORDER_GRACE_MINUTES);
    let mut query = OrderEntity::update_many()
        .col_expr(order::Column::Status, Expr::value(Status::Cancelled))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Status.eq(Status::Pending))
        .filter(order::Column::PaymentSessionId.is_null())
        .filter(order::Column::CreatedAt.lt(cutoff));
    if let Some(user_id) = user_id {
        query = query.filter(order::Column::UserId.eq(user_id));
    }
    let swept = query.exec(db).await?.rows_affected;
    if swept > 0 {
        info!(swept, user_id = ?user_id, "Cancelled abandoned pending orders");
    }
    Ok(swept)
}
