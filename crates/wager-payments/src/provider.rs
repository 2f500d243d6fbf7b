//! The payment provider abstraction — three logical calls, independent
//! of which concrete processor backs them.

use crate::error::PaymentResult;
use crate::types::{CreatedInvoice, InvoiceStatus};
use async_trait::async_trait;
use wager_types::{Cents, IntentPayload};

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates an invoice for `amount` of `asset`. `payload` is attached
    /// opaquely and must round-trip unchanged through `get_invoices`.
    async fn create_invoice(
        &self,
        asset: &str,
        amount: Cents,
        payload: &IntentPayload,
    ) -> PaymentResult<CreatedInvoice>;

    async fn get_invoices(&self, invoice_ids: &[i64]) -> PaymentResult<Vec<InvoiceStatus>>;

    /// Pays `amount` of `asset` out to `user_external_id`. `spend_id` is
    /// the provider-level idempotency key: replaying the same `spend_id`
    /// must never double-pay.
    async fn transfer(
        &self,
        user_external_id: &str,
        asset: &str,
        amount: Cents,
        spend_id: &str,
    ) -> PaymentResult<()>;
}
