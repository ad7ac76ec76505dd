pub mod cart;
pub mod checkout;
pub mod coupon;
pub mod inventory;
pub mod order;
pub mod payment;
pub mod pricing;
pub mod settlement;
