//! Applies payment-provider events to orders. Every transition is conditioned on
//! the order's current status, so duplicated or reordered deliveries converge on
//! the same state as a single in-order delivery.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::entities::{
    order::{self, Entity as OrderEntity, Status},
    order_part::{self, Entity as OrderPartEntity},
    product::{self, Entity as ProductEntity},
};
use crate::error::ServiceError;
use crate::services::{cart as cart_store, coupon as coupons, inventory, payment::PaymentEvent};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// The event moved the order to `status`.
    Applied { order_id: i32, status: Status },
    /// Nothing to do: a replay, or an event that no longer applies to the order.
    Unchanged { order_id: i32, status: Status },
}

pub async fn reconcile(
    db: &DatabaseConnection,
    event: PaymentEvent,
) -> Result<SettlementOutcome, ServiceError> {
    match event {
        PaymentEvent::PaymentCompleted {
            order_id,
            payment_intent_id,
        } => complete_payment(db, order_id, payment_intent_id).await,
        PaymentEvent::PaymentSessionExpired { order_id } => expire_session(db, order_id).await,
        PaymentEvent::ChargeRefunded { payment_intent_id } => {
            refund_charge(db, &payment_intent_id).await
        }
    }
}

/// `pending -> paid`, then stock deduction, coupon usage and cart removal, all in
/// one transaction. The status flip is a conditional update, so a concurrent
/// duplicate finds zero rows affected and does nothing else.
///
/// A `cancelled` order is paid as well: the customer was charged, whether the
/// order was swept or its session reported expired first.
async fn complete_payment(
    db: &DatabaseConnection,
    order_id: i32,
    payment_intent_id: Option<String>,
) -> Result<SettlementOutcome, ServiceError> {
    let txn = db.begin().await?;

    let order = OrderEntity::find_by_id(order_id)
        .one(&txn)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("Order {}", order_id)))?;

    let previous = order.status;
    if previous.is_settled() {
        info!(order_id, status = %previous, "Duplicate payment confirmation absorbed");
        return Ok(SettlementOutcome::Unchanged {
            order_id,
            status: previous,
        });
    }
    if previous == Status::Cancelled {
        warn!(order_id, payment_intent_id = ?payment_intent_id, "Payment confirmed for a cancelled order; reinstating as paid");
    }

    let flipped = OrderEntity::update_many()
        .col_expr(order::Column::Status, Expr::value(Status::Paid))
        .col_expr(order::Column::PaymentIntentId, Expr::value(payment_intent_id.clone()))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::Status.is_in([Status::Pending, Status::Cancelled]))
        .exec(&txn)
        .await?;
    if flipped.rows_affected == 0 {
        info!(order_id, "Payment confirmation raced with another delivery; absorbed");
        return Ok(SettlementOutcome::Unchanged {
            order_id,
            status: Status::Paid,
        });
    }

    let parts = OrderPartEntity::find()
        .filter(order_part::Column::OrderId.eq(order_id))
        .all(&txn)
        .await?;
    for part in &parts {
        let Some(mut product) = ProductEntity::find_by_id(part.product_id).one(&txn).await? else {
            warn!(order_id, product_id = part.product_id, "Settled item refers to a missing product");
            continue;
        };
        if inventory::deduct(&mut product, &part.variant_selections, i64::from(part.quantity)) {
            let stock = product.total_stock;
            let mut active: product::ActiveModel = product.clone().into();
            active.variants = Set(product.variants);
            active.total_stock = Set(stock);
            active.update(&txn).await?;
        }
    }

    if let Some(coupon_id) = order.coupon_id {
        coupons::record_usage(&txn, coupon_id).await?;
    }

    let cleared = cart_store::clear(&txn, order.user_id).await?;
    txn.commit().await?;

    info!(
        order_id,
        user_id = order.user_id,
        %previous,
        items = parts.len(),
        cart_lines_cleared = cleared,
        "Order paid"
    );
    Ok(SettlementOutcome::Applied {
        order_id,
        status: Status::Paid,
    })
}

/// `pending -> cancelled`. Nothing was deducted for a pending order, so there is
/// nothing to restore.
async fn expire_session(
    db: &DatabaseConnection,
    order_id: i32,
) -> Result<SettlementOutcome, ServiceError> {
    let result = OrderEntity::update_many()
        .col_expr(order::Column::Status, Expr::value(Status::Cancelled))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::Status.eq(Status::Pending))
        .exec(db)
        .await?;
    if result.rows_affected > 0 {
        info!(order_id, "Order cancelled after payment session expired");
        return Ok(SettlementOutcome::Applied {
            order_id,
            status: Status::Cancelled,
        });
    }

    let order = OrderEntity::find_by_id(order_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("Order {}", order_id)))?;
    info!(order_id, status = %order.status, "Session expiry ignored");
    Ok(SettlementOutcome::Unchanged {
        order_id,
        status: order.status,
    })
}

/// Refunds override whatever status the order has. Stock is not restored.
async fn refund_charge(
    db: &DatabaseConnection,
    payment_intent_id: &str,
) -> Result<SettlementOutcome, ServiceError> {
    let order = OrderEntity::find()
        .filter(order::Column::PaymentIntentId.eq(payment_intent_id))
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("Order for payment {}", payment_intent_id)))?;

    let order_id = order.id;
    let previous = order.status;
    let result = OrderEntity::update_many()
        .col_expr(order::Column::Status, Expr::value(Status::Refunded))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::Status.ne(Status::Refunded))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Ok(SettlementOutcome::Unchanged {
            order_id,
            status: Status::Refunded,
        });
    }

    info!(order_id, %previous, "Order refunded");
    Ok(SettlementOutcome::Applied {
        order_id,
        status: Status::Refunded,
    })
}
