//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument. Multi-row operations that
//! must be atomic open their own transaction.

pub mod coupon_repo;
pub mod invoice_repo;
pub mod payment_method_repo;
pub mod plan_repo;
pub mod role_repo;
pub mod session_repo;
pub mod subscription_repo;
pub mod user_repo;
pub mod user_token_repo;

pub use coupon_repo::CouponRepo;
pub use invoice_repo::InvoiceRepo;
pub use payment_method_repo::PaymentMethodRepo;
pub use plan_repo::PlanRepo;
pub use role_repo::RoleRepo;
pub use session_repo::SessionRepo;
pub use subscription_repo::SubscriptionRepo;
pub use user_repo::UserRepo;
pub use user_token_repo::UserTokenRepo;
