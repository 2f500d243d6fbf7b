//! An in-memory payment provider for engine and daemon tests.

use crate::error::PaymentResult;
use crate::provider::PaymentProvider;
use crate::types::{CreatedInvoice, InvoiceState, InvoiceStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use wager_types::{Cents, IntentPayload};

#[derive(Debug, Clone)]
struct MockInvoice {
    state: InvoiceState,
}

/// Every invoice starts `active`; tests flip it to `paid` with
/// [`MockPaymentProvider::mark_paid`] to drive the reconciler.
#[derive(Default)]
pub struct MockPaymentProvider {
    next_invoice_id: AtomicI64,
    invoices: Mutex<HashMap<i64, MockInvoice>>,
    transfers: Mutex<Vec<(String, String, Cents, String)>>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self {
            next_invoice_id: AtomicI64::new(1),
            invoices: Mutex::new(HashMap::new()),
            transfers: Mutex::new(Vec::new()),
        }
    }

    pub fn mark_paid(&self, invoice_id: i64) {
        if let Some(invoice) = self.invoices.lock().unwrap().get_mut(&invoice_id) {
            invoice.state = InvoiceState::Paid;
        }
    }

    pub fn mark_expired(&self, invoice_id: i64) {
        if let Some(invoice) = self.invoices.lock().unwrap().get_mut(&invoice_id) {
            invoice.state = InvoiceState::Expired;
        }
    }

    pub fn transfers(&self) -> Vec<(String, String, Cents, String)> {
        self.transfers.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_invoice(
        &self,
        _asset: &str,
        _amount: Cents,
        _payload: &IntentPayload,
    ) -> PaymentResult<CreatedInvoice> {
        let invoice_id = self.next_invoice_id.fetch_add(1, Ordering::SeqCst);
        self.invoices.lock().unwrap().insert(
            invoice_id,
            MockInvoice {
                state: InvoiceState::Active,
            },
        );
        Ok(CreatedInvoice {
            invoice_id,
            pay_url: format!("https://pay.test/invoice/{invoice_id}"),
        })
    }

    async fn get_invoices(&self, invoice_ids: &[i64]) -> PaymentResult<Vec<InvoiceStatus>> {
        let invoices = self.invoices.lock().unwrap();
        Ok(invoice_ids
            .iter()
            .filter_map(|id| {
                invoices.get(id).map(|inv| InvoiceStatus {
                    invoice_id: *id,
                    state: inv.state,
                })
            })
            .collect())
    }

    async fn transfer(
        &self,
        user_external_id: &str,
        asset: &str,
        amount: Cents,
        spend_id: &str,
    ) -> PaymentResult<()> {
        let mut transfers = self.transfers.lock().unwrap();
        // Provider-side idempotency: replaying a spend_id is a no-op, not
        // a second payout.
        if transfers.iter().any(|(_, _, _, s)| s == spend_id) {
            return Ok(());
        }
        transfers.push((user_external_id.to_string(), asset.to_string(), amount, spend_id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transfer_is_idempotent_on_spend_id() {
        let provider = MockPaymentProvider::new();
        provider.transfer("tg:1", "USDT", Cents(1000), "payout:1").await.unwrap();
        provider.transfer("tg:1", "USDT", Cents(1000), "payout:1").await.unwrap();
        assert_eq!(provider.transfers().len(), 1);
    }
}
