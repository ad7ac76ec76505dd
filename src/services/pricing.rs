//! Unit and order pricing. All amounts are integer minor currency units, so no
//! rounding happens here.

use serde::Serialize;

use crate::entities::{cart, order_part, product, product::VariantSelection};

/// Base price plus the modifier of every selected option.
///
/// A selection naming a group or option the product does not define is skipped
/// silently. Stale cart lines that reference a renamed option therefore price at
/// the remaining modifiers only.
pub fn compute_unit_price<'a, I>(product: &product::Model, selections: I) -> i64
where
    I: IntoIterator<Item = &'a VariantSelection>,
{
    selections
        .into_iter()
        .filter_map(|selection| product.find_option(selection))
        .fold(product.base_price, |price, option| price + option.price_modifier)
}

/// Anything that contributes `unit_price * quantity` to a subtotal.
pub trait LineAmount {
    fn unit_price(&self) -> i64;
    fn quantity(&self) -> i64;

    fn line_total(&self) -> i64 {
        self.unit_price() * self.quantity()
    }
}

impl LineAmount for order_part::Model {
    fn unit_price(&self) -> i64 {
        self.unit_price
    }

    fn quantity(&self) -> i64 {
        i64::from(self.quantity)
    }
}

/// Cart lines price at their add-time snapshot.
impl LineAmount for cart::Model {
    fn unit_price(&self) -> i64 {
        self.price_at_add
    }

    fn quantity(&self) -> i64 {
        i64::from(self.quantity)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
}

/// `total = subtotal - discount` with the discount clamped into `0..=subtotal`,
/// which is the same as `max(0, subtotal - discount)` for any non-negative discount.
pub fn compute_order_totals<'a, L, I>(items: I, discount: i64) -> OrderTotals
where
    L: LineAmount + 'a,
    I: IntoIterator<Item = &'a L>,
{
    let subtotal: i64 = items.into_iter().map(LineAmount::line_total).sum();
    let discount = discount.clamp(0, subtotal.max(0));
    OrderTotals {
        subtotal,
        discount,
        total: subtotal - discount,
    }
}
