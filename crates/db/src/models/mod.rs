//! Row models and insert/update DTOs, one module per table.

pub mod coupon;
pub mod invoice;
pub mod payment_method;
pub mod plan;
pub mod role;
pub mod session;
pub mod subscription;
pub mod user;
pub mod user_token;
