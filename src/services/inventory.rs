//! Per-option stock. Availability is checked at checkout and stock is deducted at
//! settlement, with no hold in between: two checkouts may both pass the check and
//! the later settlement clamps at zero.

use crate::entities::product::{self, VariantSelection};
use crate::error::ValidationError;

/// Every matched option must hold at least `quantity`. Products without variants
/// track no stock and always pass.
pub fn check_availability<'a, I>(
    product: &product::Model,
    selections: I,
    quantity: i64,
) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = &'a VariantSelection>,
{
    if !product.has_variants() {
        return Ok(());
    }
    for selection in selections {
        if let Some(option) = product.find_option(selection) {
            if option.stock < quantity {
                return Err(ValidationError::InsufficientStock {
                    product_id: product.id,
                    product: product.name.clone(),
                    variant: selection.name.clone(),
                    value: selection.value.clone(),
                    requested: quantity,
                    available: option.stock,
                });
            }
        }
    }
    Ok(())
}

/// Subtracts `quantity` from each matched option, never below zero, then refreshes
/// the aggregate. Returns whether any option changed.
pub fn deduct<'a, I>(product: &mut product::Model, selections: I, quantity: i64) -> bool
where
    I: IntoIterator<Item = &'a VariantSelection>,
{
    let mut changed = false;
    for selection in selections {
        if let Some(option) = product.find_option_mut(selection) {
            option.stock = (option.stock - quantity).max(0);
            changed = true;
        }
    }
    product.recompute_total_stock();
    changed
}
