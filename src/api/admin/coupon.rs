use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{ActiveModelTrait, DbErr, EntityTrait, QueryOrder, Set, SqlErr};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::entities::coupon::{self, DiscountType, Entity as CouponEntity};
use crate::error::{ServiceError, ValidationError};
use crate::middleware::logging::to_response;
use crate::services::coupon::{find_by_code, normalize_code};
use crate::AppState;

pub fn admin_coupon_router() -> Router {
    Router::new().route("/coupons", get(get_coupons).post(create_coupon))
}

async fn get_coupons(Extension(state): Extension<AppState>) -> Response {
    match CouponEntity::find()
        .order_by_desc(coupon::Column::CreatedAt)
        .all(&*state.db)
        .await
    {
        Ok(coupons) => to_response((StatusCode::OK, Json(coupons)), Ok(())),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

async fn create_coupon(
    Extension(state): Extension<AppState>,
    Json(mut payload): Json<CreateCoupon>,
) -> Response {
    payload.code = normalize_code(&payload.code);
    match insert_coupon(&state, payload, Utc::now()).await {
        Ok(created) => {
            info!(coupon_id = created.id, code = %created.code, "Coupon created");
            to_response((StatusCode::CREATED, Json(created)), Ok(()))
        }
        Err(err) => err.into_response(),
    }
}

async fn insert_coupon(
    state: &AppState,
    payload: CreateCoupon,
    now: DateTime<Utc>,
) -> Result<coupon::Model, ServiceError> {
    if let Err(errors) = payload.validate() {
        let fields: Vec<String> = errors
            .field_errors()
            .keys()
            .map(|field| field.to_string())
            .collect();
        return Err(ValidationError::InvalidInput(format!(
            "Invalid coupon fields: {}",
            fields.join(", ")
        ))
        .into());
    }
    if payload.discount_type == DiscountType::Percentage && payload.value > 100 {
        return Err(ValidationError::InvalidInput(
            "Percentage discount cannot exceed 100".to_owned(),
        )
        .into());
    }
    if payload.expires_at <= now {
        return Err(ValidationError::InvalidInput("Expiry must be in the future".to_owned()).into());
    }
    if find_by_code(&*state.db, &payload.code).await?.is_some() {
        return Err(duplicate(&payload.code));
    }

    let result = coupon::ActiveModel {
        code: Set(payload.code.clone()),
        discount_type: Set(payload.discount_type),
        value: Set(payload.value),
        min_order_amount: Set(payload.min_order_amount),
        max_uses: Set(payload.max_uses),
        used_count: Set(0),
        vendor_id: Set(payload.vendor_id),
        is_active: Set(payload.is_active.unwrap_or(true)),
        expires_at: Set(payload.expires_at),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&*state.db)
    .await;

    match result {
        Ok(created) => Ok(created),
        Err(err) if is_unique_violation(&err) => Err(duplicate(&payload.code)),
        Err(err) => Err(err.into()),
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn duplicate(code: &str) -> ServiceError {
    ServiceError::Conflict(format!("Coupon {} already exists", code))
}

#[derive(Deserialize, Validate, Debug)]
struct CreateCoupon {
    #[validate(regex(path = *COUPON_CODE_REGEX))]
    code: String,
    discount_type: DiscountType,
    #[validate(range(min = 1))]
    value: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    min_order_amount: i64,
    /// 0 means unlimited.
    #[serde(default)]
    #[validate(range(min = 0))]
    max_uses: i64,
    vendor_id: Option<i32>,
    is_active: Option<bool>,
    expires_at: DateTime<Utc>,
}

static COUPON_CODE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9_-]{3,32}$").unwrap());
