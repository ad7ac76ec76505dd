//! Coupon rules. Validation never consumes a use; usage is recorded by settlement
//! only, through an atomic increment.

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
};
use serde::Serialize;

use crate::entities::coupon::{self, DiscountType, Entity as CouponEntity};
use crate::error::{ServiceError, ValidationError};

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Rule checks for an already-loaded coupon, in order: live (active and not
/// expired), usage cap, minimum order.
pub fn check(coupon: &coupon::Model, subtotal: i64, now: DateTime<Utc>) -> Result<(), ValidationError> {
    if !coupon.is_active || coupon.expires_at <= now {
        return Err(ValidationError::InvalidCoupon);
    }
    if coupon.max_uses > 0 && coupon.used_count >= coupon.max_uses {
        return Err(ValidationError::UsageExhausted);
    }
    if subtotal < coupon.min_order_amount {
        return Err(ValidationError::BelowMinimum {
            minimum: coupon.min_order_amount,
        });
    }
    Ok(())
}

pub async fn find_by_code<C>(db: &C, code: &str) -> Result<Option<coupon::Model>, DbErr>
where
    C: ConnectionTrait,
{
    CouponEntity::find()
        .filter(coupon::Column::Code.eq(normalize_code(code)))
        .one(db)
        .await
}

/// Looks the code up and applies [`check`]. An unknown code is reported the same
/// way as an inactive or expired one.
pub async fn validate<C>(
    db: &C,
    code: &str,
    subtotal: i64,
    now: DateTime<Utc>,
) -> Result<coupon::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let coupon = find_by_code(db, code)
        .await?
        .ok_or(ValidationError::InvalidCoupon)?;
    check(&coupon, subtotal, now)?;
    Ok(coupon)
}

/// Percentages round half up; the result is capped at the subtotal.
pub fn compute_discount(coupon: &coupon::Model, subtotal: i64) -> i64 {
    let subtotal = subtotal.max(0);
    let discount = match coupon.discount_type {
        DiscountType::Percentage => (subtotal * coupon.value.max(0) + 50) / 100,
        DiscountType::Fixed => coupon.value.max(0),
    };
    discount.min(subtotal)
}

/// `used_count = used_count + 1` in a single statement.
pub async fn record_usage<C>(db: &C, coupon_id: i32) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    let result = CouponEntity::update_many()
        .col_expr(
            coupon::Column::UsedCount,
            Expr::col(coupon::Column::UsedCount).add(1),
        )
        .filter(coupon::Column::Id.eq(coupon_id))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        tracing::warn!(coupon_id, "Coupon referenced by a settled order no longer exists");
    }
    Ok(())
}

#[derive(Clone, Debug, Serialize)]
pub struct CouponPreview {
    pub coupon: coupon::Model,
    pub discount: i64,
}

/// Cart-page preview. Same rules and rounding as checkout, no side effects.
pub async fn preview<C>(
    db: &C,
    code: &str,
    subtotal: i64,
    now: DateTime<Utc>,
) -> Result<CouponPreview, ServiceError>
where
    C: ConnectionTrait,
{
    let coupon = validate(db, code, subtotal, now).await?;
    let discount = compute_discount(&coupon, subtotal);
    Ok(CouponPreview { coupon, discount })
}
