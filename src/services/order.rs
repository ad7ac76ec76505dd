//! Read views over placed orders and operator status changes.

use chrono::Utc;
use sea_orm::{sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

use crate::entities::{
    order::{self, Entity as OrderEntity, Status},
    order_part::{self, Entity as OrderPartEntity},
};
use crate::error::{ServiceError, ValidationError};

#[derive(Clone, Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_part::Model>,
}

async fn attach_items<C>(db: &C, orders: Vec<order::Model>) -> Result<Vec<OrderView>, ServiceError>
where
    C: ConnectionTrait,
{
    let ids: Vec<i32> = orders.iter().map(|order| order.id).collect();
    let mut by_order: BTreeMap<i32, Vec<order_part::Model>> = BTreeMap::new();
    if !ids.is_empty() {
        let parts = OrderPartEntity::find()
            .filter(order_part::Column::OrderId.is_in(ids))
            .order_by_asc(order_part::Column::Id)
            .all(db)
            .await?;
        for part in parts {
            by_order.entry(part.order_id).or_default().push(part);
        }
    }

    Ok(orders
        .into_iter()
        .map(|order| {
            let items = by_order.remove(&order.id).unwrap_or_default();
            OrderView { order, items }
        })
        .collect())
}

/// Newest first.
pub async fn list_for_user<C>(db: &C, user_id: i32) -> Result<Vec<OrderView>, ServiceError>
where
    C: ConnectionTrait,
{
    let orders = OrderEntity::find()
        .filter(order::Column::UserId.eq(user_id))
        .order_by_desc(order::Column::CreatedAt)
        .order_by_desc(order::Column::Id)
        .all(db)
        .await?;
    attach_items(db, orders).await
}

pub async fn get_for_user<C>(db: &C, user_id: i32, order_id: i32) -> Result<OrderView, ServiceError>
where
    C: ConnectionTrait,
{
    let order = OrderEntity::find_by_id(order_id)
        .filter(order::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("Order {}", order_id)))?;

    let mut views = attach_items(db, vec![order]).await?;
    views
        .pop()
        .ok_or_else(|| ServiceError::not_found(format!("Order {}", order_id)))
}

/// Orders holding at least one of the vendor's items; each view carries only
/// that vendor's items.
pub async fn list_for_vendor<C>(db: &C, vendor_id: i32) -> Result<Vec<OrderView>, ServiceError>
where
    C: ConnectionTrait,
{
    let parts = OrderPartEntity::find()
        .filter(order_part::Column::VendorId.eq(vendor_id))
        .order_by_asc(order_part::Column::Id)
        .all(db)
        .await?;
    if parts.is_empty() {
        return Ok(Vec::new());
    }

    let ids: HashSet<i32> = parts.iter().map(|part| part.order_id).collect();
    let orders = OrderEntity::find()
        .filter(order::Column::Id.is_in(ids))
        .order_by_desc(order::Column::CreatedAt)
        .order_by_desc(order::Column::Id)
        .all(db)
        .await?;

    let mut by_order: BTreeMap<i32, Vec<order_part::Model>> = BTreeMap::new();
    for part in parts {
        by_order.entry(part.order_id).or_default().push(part);
    }
    Ok(orders
        .into_iter()
        .map(|order| {
            let items = by_order.remove(&order.id).unwrap_or_default();
            OrderView { order, items }
        })
        .collect())
}

/// Operator transition. `paid` is reserved for settlement.
pub async fn update_status<C>(db: &C, order_id: i32, next: Status) -> Result<order::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let order = OrderEntity::find_by_id(order_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("Order {}", order_id)))?;
    transition_status(db, order_id, order.status, next).await
}

/// Moves the order from `expected` to `next`, but only if it is still `expected`
/// when the write lands. Anything else that changed the order first wins and the
/// caller gets a conflict.
pub async fn transition_status<C>(
    db: &C,
    order_id: i32,
    expected: Status,
    next: Status,
) -> Result<order::Model, ServiceError>
where
    C: ConnectionTrait,
{
    if next == Status::Paid {
        return Err(ValidationError::InvalidInput(
            "Orders become paid only through payment confirmation".to_owned(),
        )
        .into());
    }
    if expected.is_terminal() {
        return Err(ServiceError::Conflict(format!(
            "Order {} is already {}",
            order_id, expected
        )));
    }
    if !expected.can_transition_to(next) {
        return Err(ServiceError::Conflict(format!(
            "Order {} cannot move from {} to {}",
            order_id, expected, next
        )));
    }

    let result = OrderEntity::update_many()
        .col_expr(order::Column::Status, Expr::value(next))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::Status.eq(expected))
        .exec(db)
        .await?;
    let updated = OrderEntity::find_by_id(order_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("Order {}", order_id)))?;
    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(format!(
            "Order {} changed to {} before it could move to {}",
            order_id, updated.status, next
        )));
    }

    info!(order_id, previous = %expected, status = %next, "Order status changed by operator");
    Ok(updated)
}
