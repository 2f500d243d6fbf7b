//! Applies paid invoices to deals.
//!
//! Two entry points share the same core: a slow background tick over
//! every open `InvoiceWait`, and a fast bounded poll a caller can run
//! right after creating an invoice so a payer who pays within a couple
//! of seconds doesn't have to wait for the next slow tick to see it land.

use crate::error::EngineResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use wager_payments::{InvoiceState, PaymentProvider};
use wager_storage::Storage;
use wager_types::{IntentPayload, InvoiceWait, StrandedRefund};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub applied: u32,
    pub stranded: u32,
    pub expired: u32,
}

pub struct Reconciler {
    storage: Arc<dyn Storage>,
    provider: Arc<dyn PaymentProvider>,
}

impl Reconciler {
    pub fn new(storage: Arc<dyn Storage>, provider: Arc<dyn PaymentProvider>) -> Self {
        Self { storage, provider }
    }

    /// One slow-loop tick: looks at every wait row, not just one.
    pub async fn reconcile_once(&self) -> EngineResult<ReconcileReport> {
        let waits = self.storage.list_invoice_waits().await?;
        if waits.is_empty() {
            return Ok(ReconcileReport::default());
        }
        let ids: Vec<i64> = waits.iter().map(|w| w.invoice_id).collect();
        let statuses = self.provider.get_invoices(&ids).await?;

        let mut report = ReconcileReport::default();
        for wait in waits {
            let state = statuses
                .iter()
                .find(|s| s.invoice_id == wait.invoice_id)
                .map(|s| s.state);
            self.apply_state(wait, state, &mut report).await?;
        }
        Ok(report)
    }

    /// Fast path for a single invoice, used right after it was issued.
    /// Returns `true` iff the invoice was found paid and applied.
    pub async fn poll_invoice_now(&self, invoice_id: i64) -> EngineResult<bool> {
        let Some(wait) = self.storage.get_invoice_wait(invoice_id).await? else {
            return Ok(false);
        };
        let statuses = self.provider.get_invoices(&[invoice_id]).await?;
        let state = statuses.first().map(|s| s.state);
        let mut report = ReconcileReport::default();
        self.apply_state(wait, state, &mut report).await?;
        Ok(report.applied > 0)
    }

    /// Polls a single invoice a bounded number of times with a delay in
    /// between, for the "did they already pay" fast path right after the
    /// invoice link was handed to the payer.
    pub async fn poll_until_settled(&self, invoice_id: i64, attempts: u32, delay: Duration) -> EngineResult<bool> {
        for attempt in 0..attempts {
            if self.poll_invoice_now(invoice_id).await? {
                return Ok(true);
            }
            if self.storage.get_invoice_wait(invoice_id).await?.is_none() {
                // Gone without being applied: expired or already handled.
                return Ok(false);
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(false)
    }

    async fn apply_state(
        &self,
        wait: InvoiceWait,
        state: Option<InvoiceState>,
        report: &mut ReconcileReport,
    ) -> EngineResult<()> {
        match state {
            Some(InvoiceState::Paid) => {
                self.apply_paid(&wait, report).await?;
                self.storage.delete_invoice_wait(wait.invoice_id).await?;
                report.applied += 1;
            }
            Some(InvoiceState::Expired) => {
                self.storage.delete_invoice_wait(wait.invoice_id).await?;
                report.expired += 1;
            }
            // Active, or the provider doesn't know about it yet: keep waiting.
            Some(InvoiceState::Active) | Some(InvoiceState::Other) | None => {}
        }
        Ok(())
    }

    async fn apply_paid(&self, wait: &InvoiceWait, report: &mut ReconcileReport) -> EngineResult<()> {
        match &wait.payload {
            IntentPayload::New {
                fight_id,
                side,
                amount_cents,
                payer_user_tag,
            } => {
                let user = self.storage.get_or_create_user(payer_user_tag, None).await?;
                self.storage
                    .apply_paid_new(*fight_id, *side, *amount_cents, user.id, wait.invoice_id)
                    .await?;
            }
            IntentPayload::Match {
                deal_id,
                side,
                amount_cents,
                payer_user_tag,
            } => {
                let user = self.storage.get_or_create_user(payer_user_tag, None).await?;
                let paired = self
                    .storage
                    .apply_paid_match(*deal_id, *side, *amount_cents, user.id, wait.invoice_id)
                    .await?;
                if !paired {
                    self.storage
                        .queue_stranded_refund(StrandedRefund {
                            invoice_id: wait.invoice_id,
                            payer_user_tag: payer_user_tag.clone(),
                            amount_cents: *amount_cents,
                            reason: "match target no longer eligible".into(),
                            created_at: wait.created_at,
                            resolved_at: None,
                        })
                        .await?;
                    report.stranded += 1;
                }
            }
        }
        Ok(())
    }
}

/// The slow batch path, driven purely by its tick interval. Per-intent
/// responsiveness comes from `Reconciler::poll_until_settled`, spawned
/// directly by the API layer right after an invoice is issued — this
/// loop has no "sync now" trigger to wire up.
pub struct ReconcilerLoop {
    reconciler: Arc<Reconciler>,
    interval: Duration,
}

impl ReconcilerLoop {
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        Self { reconciler, interval }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        match self.reconciler.reconcile_once().await {
            Ok(report) if report.applied > 0 || report.stranded > 0 || report.expired > 0 => {
                tracing::info!(
                    applied = report.applied,
                    stranded = report.stranded,
                    expired = report.expired,
                    "reconciliation tick complete"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "reconciliation tick failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wager_payments::MockPaymentProvider;
    use wager_storage::InMemoryStorage;
    use wager_types::{Cents, DealId, FightId, Side};

    fn new_reconciler() -> (Reconciler, Arc<dyn Storage>, Arc<MockPaymentProvider>) {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let provider = Arc::new(MockPaymentProvider::new());
        let reconciler = Reconciler::new(storage.clone(), provider.clone() as Arc<dyn PaymentProvider>);
        (reconciler, storage, provider)
    }

    #[tokio::test]
    async fn paid_new_intent_opens_an_awaiting_deal() {
        let (reconciler, storage, provider) = new_reconciler();
        let invoice = provider
            .create_invoice(
                "USDT",
                Cents(1000),
                &IntentPayload::New {
                    fight_id: FightId::new(1),
                    side: Side::One,
                    amount_cents: Cents(1000),
                    payer_user_tag: "tg:1".into(),
                },
            )
            .await
            .unwrap();
        storage
            .insert_invoice_wait(InvoiceWait::new(
                invoice.invoice_id,
                IntentPayload::New {
                    fight_id: FightId::new(1),
                    side: Side::One,
                    amount_cents: Cents(1000),
                    payer_user_tag: "tg:1".into(),
                },
            ))
            .await
            .unwrap();
        provider.mark_paid(invoice.invoice_id);

        let report = reconciler.reconcile_once().await.unwrap();
        assert_eq!(report.applied, 1);
        assert!(storage.list_invoice_waits().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replaying_an_already_applied_invoice_creates_no_duplicate_deal() {
        let (reconciler, storage, provider) = new_reconciler();
        let payload = IntentPayload::New {
            fight_id: FightId::new(7),
            side: Side::One,
            amount_cents: Cents(500),
            payer_user_tag: "tg:9".into(),
        };
        let invoice = provider.create_invoice("USDT", Cents(500), &payload).await.unwrap();
        storage
            .insert_invoice_wait(InvoiceWait::new(invoice.invoice_id, payload.clone()))
            .await
            .unwrap();
        provider.mark_paid(invoice.invoice_id);
        reconciler.reconcile_once().await.unwrap();

        let payer_id = storage.get_or_create_user("tg:9", None).await.unwrap().id;
        let deals_before = storage.list_my_active_deals(payer_id).await.unwrap();
        assert_eq!(deals_before.len(), 1);

        // Simulate a replay: the same invoice_id resurfaces as a wait row
        // (e.g. a crash-recovery re-enqueue) and gets reconciled again.
        storage
            .insert_invoice_wait(InvoiceWait::new(invoice.invoice_id, payload))
            .await
            .unwrap();
        reconciler.reconcile_once().await.unwrap();

        let deals_after = storage.list_my_active_deals(payer_id).await.unwrap();
        assert_eq!(deals_after.len(), 1, "replay must not open a second deal for the same invoice");
        assert_eq!(deals_after[0].id, deals_before[0].id);
    }

    #[tokio::test]
    async fn stale_match_payment_is_stranded_not_dropped() {
        let (reconciler, storage, provider) = new_reconciler();
        // The deal never existed (or was already voided) by the time this
        // MATCH payment is seen paid.
        let invoice = provider
            .create_invoice(
                "USDT",
                Cents(500),
                &IntentPayload::Match {
                    deal_id: DealId::new(999),
                    side: Side::Two,
                    amount_cents: Cents(500),
                    payer_user_tag: "tg:2".into(),
                },
            )
            .await
            .unwrap();
        storage
            .insert_invoice_wait(InvoiceWait::new(
                invoice.invoice_id,
                IntentPayload::Match {
                    deal_id: DealId::new(999),
                    side: Side::Two,
                    amount_cents: Cents(500),
                    payer_user_tag: "tg:2".into(),
                },
            ))
            .await
            .unwrap();
        provider.mark_paid(invoice.invoice_id);

        let report = reconciler.reconcile_once().await.unwrap();
        assert_eq!(report.stranded, 1);
        let refunds = storage.list_unresolved_stranded_refunds(10).await.unwrap();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].invoice_id, invoice.invoice_id);
    }

    #[tokio::test]
    async fn expired_invoice_is_dropped_without_a_refund() {
        let (reconciler, storage, provider) = new_reconciler();
        let invoice = provider
            .create_invoice(
                "USDT",
                Cents(500),
                &IntentPayload::New {
                    fight_id: FightId::new(1),
                    side: Side::One,
                    amount_cents: Cents(500),
                    payer_user_tag: "tg:3".into(),
                },
            )
            .await
            .unwrap();
        storage
            .insert_invoice_wait(InvoiceWait::new(
                invoice.invoice_id,
                IntentPayload::New {
                    fight_id: FightId::new(1),
                    side: Side::One,
                    amount_cents: Cents(500),
                    payer_user_tag: "tg:3".into(),
                },
            ))
            .await
            .unwrap();
        provider.mark_expired(invoice.invoice_id);

        let report = reconciler.reconcile_once().await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.applied, 0);
    }
}
