//! Invoice entity model and DTOs.

use serde::Serialize;
use sqlx::FromRow;
use vitrine_core::billing::InvoiceStatus;
use vitrine_core::types::{DbId, Timestamp};

/// A row from the `invoices` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Invoice {
    pub id: DbId,
    pub user_id: DbId,
    pub subscription_id: Option<DbId>,
    pub plan_id: DbId,
    pub number: String,
    pub description: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub amount_due_cents: i64,
    pub currency: String,
    pub status: String,
    pub period_start: Timestamp,
    pub period_end: Timestamp,
    pub due_at: Timestamp,
    pub paid_at: Option<Timestamp>,
    pub payment_method_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Invoice {
    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::parse(&self.status).unwrap_or(InvoiceStatus::Void)
    }
}

/// DTO for issuing an invoice. The invoice number is assigned on insert.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub user_id: DbId,
    pub subscription_id: Option<DbId>,
    pub plan_id: DbId,
    pub description: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub amount_due_cents: i64,
    pub currency: String,
    pub period_start: Timestamp,
    pub period_end: Timestamp,
    pub due_at: Timestamp,
    pub payment_method_id: Option<DbId>,
}
