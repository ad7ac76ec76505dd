use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashSet;

use crate::entities::{
    cart::{self, Entity as CartEntity},
    product::{self, Entity as ProductEntity, Selections, VariantSelection},
};
use crate::error::{ServiceError, ValidationError};
use crate::services::pricing::{compute_order_totals, compute_unit_price};

#[derive(Clone, Debug, Serialize)]
pub struct CartView {
    pub items: Vec<cart::Model>,
    /// Sum of the add-time snapshots, which may lag behind current catalog prices.
    pub subtotal: i64,
}

pub async fn get_items<C>(db: &C, user_id: i32) -> Result<Vec<cart::Model>, DbErr>
where
    C: ConnectionTrait,
{
    CartEntity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .order_by_asc(cart::Column::Id)
        .all(db)
        .await
}

pub async fn get_cart<C>(db: &C, user_id: i32) -> Result<CartView, DbErr>
where
    C: ConnectionTrait,
{
    let items = get_items(db, user_id).await?;
    let subtotal = compute_order_totals(&items, 0).subtotal;
    Ok(CartView { items, subtotal })
}

/// Upper bound for a single cart line.
pub const MAX_LINE_QUANTITY: i32 = 10_000;

fn check_quantity(quantity: i32) -> Result<i32, ValidationError> {
    if (1..=MAX_LINE_QUANTITY).contains(&quantity) {
        Ok(quantity)
    } else {
        Err(ValidationError::InvalidQuantity)
    }
}

/// Selections must name existing options, exactly one for every group the
/// product defines.
fn validate_selections(
    product: &product::Model,
    selections: &[VariantSelection],
) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for selection in selections {
        if !seen.insert(selection.name.as_str()) {
            return Err(ValidationError::InvalidVariantSelection(format!(
                "{} selected more than once",
                selection.name
            )));
        }
        if product.find_option(selection).is_none() {
            return Err(ValidationError::InvalidVariantSelection(format!(
                "{}: {} is not offered for {}",
                selection.name, selection.value, product.name
            )));
        }
    }
    if let Some(group) = product
        .variants
        .0
        .iter()
        .find(|group| !group.options.is_empty() && !seen.contains(group.name.as_str()))
    {
        return Err(ValidationError::InvalidVariantSelection(format!(
            "{} must be selected for {}",
            group.name, product.name
        )));
    }
    Ok(())
}

/// Adds a line, merging into an existing line with the same product and selections.
/// The unit price is frozen at this moment.
pub async fn add_item<C>(
    db: &C,
    user_id: i32,
    product_id: i32,
    selections: Vec<VariantSelection>,
    quantity: i32,
) -> Result<cart::Model, ServiceError>
where
    C: ConnectionTrait + TransactionTrait,
{
    check_quantity(quantity)?;

    let txn = db.begin().await?;
    let product = ProductEntity::find_by_id(product_id)
        .one(&txn)
        .await?
        .filter(|product| product.is_active)
        .ok_or_else(|| ServiceError::not_found(format!("Product {}", product_id)))?;

    validate_selections(&product, &selections)?;
    let selections = Selections(selections);

    let existing = get_items(&txn, user_id)
        .await?
        .into_iter()
        .find(|item| item.product_id == product_id && item.variant_selections == selections);

    let saved = match existing {
        Some(entry) => {
            let quantity = entry
                .quantity
                .checked_add(quantity)
                .ok_or(ValidationError::InvalidQuantity)
                .and_then(check_quantity)?;
            let mut entry: cart::ActiveModel = entry.into();
            entry.quantity = Set(quantity);
            entry.update(&txn).await?
        }
        None => {
            let price_at_add = compute_unit_price(&product, &selections);
            cart::ActiveModel {
                user_id: Set(user_id),
                product_id: Set(product_id),
                variant_selections: Set(selections),
                quantity: Set(quantity),
                price_at_add: Set(price_at_add),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        }
    };
    txn.commit().await?;
    Ok(saved)
}

/// Quantity 0 (or less) removes the line.
pub async fn set_quantity<C>(
    db: &C,
    user_id: i32,
    item_id: i32,
    quantity: i32,
) -> Result<Option<cart::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    let entry = find_owned(db, user_id, item_id).await?;
    if quantity <= 0 {
        CartEntity::delete_by_id(entry.id).exec(db).await?;
        return Ok(None);
    }
    check_quantity(quantity)?;
    let mut entry: cart::ActiveModel = entry.into();
    entry.quantity = Set(quantity);
    Ok(Some(entry.update(db).await?))
}

pub async fn remove_item<C>(db: &C, user_id: i32, item_id: i32) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let entry = find_owned(db, user_id, item_id).await?;
    CartEntity::delete_by_id(entry.id).exec(db).await?;
    Ok(())
}

/// Deletes the whole cart. Returns the number of removed lines.
pub async fn clear<C>(db: &C, user_id: i32) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
{
    let result = CartEntity::delete_many()
        .filter(cart::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

async fn find_owned<C>(db: &C, user_id: i32, item_id: i32) -> Result<cart::Model, ServiceError>
where
    C: ConnectionTrait,
{
    CartEntity::find_by_id(item_id)
        .filter(cart::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("Cart entry {}", item_id)))
}
