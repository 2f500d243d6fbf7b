//! Payout, refund, and stranded-refund passes.
//!
//! All three pull a claimed batch from storage (rows are locked and
//! immediately visible as no-longer-pending even if the transfer that
//! follows fails), then push money out through the payment provider
//! with a deterministic `spend_id` so a retried pass after a crash
//! never double-pays.

use crate::error::EngineResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use wager_payments::PaymentProvider;
use wager_storage::Storage;
use wager_types::Cents;

const BATCH_LIMIT: i64 = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SettlementReport {
    pub paid_out: u32,
    pub refunded: u32,
    pub stranded_resolved: u32,
}

pub struct SettlementEngine {
    storage: Arc<dyn Storage>,
    provider: Arc<dyn PaymentProvider>,
    default_asset: String,
    fee_pct: f64,
}

impl SettlementEngine {
    pub fn new(
        storage: Arc<dyn Storage>,
        provider: Arc<dyn PaymentProvider>,
        default_asset: impl Into<String>,
        fee_pct: f64,
    ) -> Self {
        Self {
            storage,
            provider,
            default_asset: default_asset.into(),
            fee_pct,
        }
    }

    pub async fn settle_once(&self) -> EngineResult<SettlementReport> {
        let mut report = SettlementReport::default();
        report.paid_out = self.run_payout_pass().await?;
        report.refunded = self.run_refund_pass().await?;
        report.stranded_resolved = self.run_stranded_refund_pass().await?;
        Ok(report)
    }

    /// Matched deals whose fight has a recorded winner: pays the winner
    /// the total stake minus the fee, then marks the deal settled.
    async fn run_payout_pass(&self) -> EngineResult<u32> {
        let candidates = self.storage.claim_payout_batch(BATCH_LIMIT).await?;
        let mut count = 0;
        for candidate in candidates {
            let deal = &candidate.deal;
            let Some(winner) = deal.winner(candidate.winner_side) else {
                continue;
            };
            let winner_external_id = self.external_id_for(winner).await?;
            let total = deal.total();
            let fee = total.floor_fraction(self.fee_pct);
            let payout = total - fee;
            let spend_id = format!("payout:{}", deal.id.as_i64());
            self.provider
                .transfer(&winner_external_id, &self.default_asset, payout, &spend_id)
                .await?;
            self.storage.mark_settled(deal.id).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Awaiting deals whose fight finished with no responder ever
    /// joining: the creator's stake goes back in full, no fee withheld.
    async fn run_refund_pass(&self) -> EngineResult<u32> {
        let orphans = self.storage.claim_refund_batch(BATCH_LIMIT).await?;
        let mut count = 0;
        for deal in orphans {
            let external_id = self.external_id_for(deal.user1).await?;
            let spend_id = format!("refund:{}", deal.id.as_i64());
            self.provider
                .transfer(&external_id, &self.default_asset, deal.amount1, &spend_id)
                .await?;
            self.storage.mark_void(deal.id).await?;
            count += 1;
        }
        Ok(count)
    }

    /// MATCH payments the reconciler could not apply to a live deal.
    async fn run_stranded_refund_pass(&self) -> EngineResult<u32> {
        let refunds = self.storage.list_unresolved_stranded_refunds(BATCH_LIMIT).await?;
        let mut count = 0;
        for refund in refunds {
            self.provider
                .transfer(&refund.payer_user_tag, &self.default_asset, refund.amount_cents, &refund.spend_id())
                .await?;
            self.storage.mark_stranded_resolved(refund.invoice_id).await?;
            count += 1;
        }
        Ok(count)
    }

    async fn external_id_for(&self, user: wager_types::UserId) -> EngineResult<String> {
        match self.storage.get_user(user).await? {
            Some(u) => Ok(u.external_id),
            None => Ok(String::new()),
        }
    }
}

pub struct SettlementLoop {
    engine: Arc<SettlementEngine>,
    interval: Duration,
    trigger_tx: mpsc::Sender<()>,
}

impl SettlementLoop {
    pub fn new(engine: Arc<SettlementEngine>, interval: Duration) -> (Self, mpsc::Receiver<()>) {
        let (trigger_tx, trigger_rx) = mpsc::channel(4);
        (
            Self {
                engine,
                interval,
                trigger_tx,
            },
            trigger_rx,
        )
    }

    pub fn trigger(&self) -> mpsc::Sender<()> {
        self.trigger_tx.clone()
    }

    pub async fn run(self, mut trigger_rx: mpsc::Receiver<()>) {
        let mut ticker = interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                Some(()) = trigger_rx.recv() => self.tick().await,
                else => break,
            }
        }
    }

    async fn tick(&self) {
        match self.engine.settle_once().await {
            Ok(report) if report.paid_out > 0 || report.refunded > 0 || report.stranded_resolved > 0 => {
                tracing::info!(
                    paid_out = report.paid_out,
                    refunded = report.refunded,
                    stranded_resolved = report.stranded_resolved,
                    "settlement tick complete"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "settlement tick failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wager_payments::MockPaymentProvider;
    use wager_storage::{DealStorage, FightStorage, InMemoryStorage, UserStorage};
    use wager_types::{FightStatus, FightUpsert, Side};

    async fn paired_deal(storage: &Arc<dyn Storage>) -> (wager_types::FightId, wager_types::DealId) {
        let fight = storage
            .upsert_fight(FightUpsert {
                external_id: Some("ext-1".into()),
                title: "Alpha vs Bravo".into(),
                participant1_name: "Alpha".into(),
                participant2_name: "Bravo".into(),
                image_url: None,
                description: None,
                starts_at: None,
                status: FightStatus::Upcoming,
                winner_side: None,
            })
            .await
            .unwrap();
        let u1 = storage.get_or_create_user("tg:1", None).await.unwrap();
        let u2 = storage.get_or_create_user("tg:2", None).await.unwrap();
        storage
            .apply_paid_new(fight.id, Side::One, Cents(1000), u1.id, 1)
            .await
            .unwrap();
        storage
            .apply_paid_new(fight.id, Side::Two, Cents(1000), u2.id, 2)
            .await
            .unwrap();
        let deal = storage.list_my_active_deals(u1.id).await.unwrap().remove(0);
        (fight.id, deal.id)
    }

    #[tokio::test]
    async fn payout_pass_pays_winner_total_minus_fee() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let provider = Arc::new(MockPaymentProvider::new());
        let (fight_id, _deal_id) = paired_deal(&storage).await;
        storage
            .upsert_fight(FightUpsert {
                external_id: Some("ext-1".into()),
                title: "Alpha vs Bravo".into(),
                participant1_name: "Alpha".into(),
                participant2_name: "Bravo".into(),
                image_url: None,
                description: None,
                starts_at: None,
                status: FightStatus::Done,
                winner_side: Some(Side::One),
            })
            .await
            .unwrap();
        let _ = fight_id;

        let engine = SettlementEngine::new(storage.clone(), provider.clone() as Arc<dyn PaymentProvider>, "USDT", 0.10);
        let report = engine.settle_once().await.unwrap();
        assert_eq!(report.paid_out, 1);
        let transfers = provider.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].0, "tg:1");
        assert_eq!(transfers[0].2, Cents(1800));
    }

    #[tokio::test]
    async fn refund_pass_returns_full_stake_for_orphaned_deal() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let provider = Arc::new(MockPaymentProvider::new());
        let fight = storage
            .upsert_fight(FightUpsert {
                external_id: Some("ext-2".into()),
                title: "Solo vs Ghost".into(),
                participant1_name: "Solo".into(),
                participant2_name: "Ghost".into(),
                image_url: None,
                description: None,
                starts_at: None,
                status: FightStatus::Upcoming,
                winner_side: None,
            })
            .await
            .unwrap();
        let u1 = storage.get_or_create_user("tg:9", None).await.unwrap();
        storage
            .apply_paid_new(fight.id, Side::One, Cents(700), u1.id, 5)
            .await
            .unwrap();
        storage
            .upsert_fight(FightUpsert {
                external_id: Some("ext-2".into()),
                title: "Solo vs Ghost".into(),
                participant1_name: "Solo".into(),
                participant2_name: "Ghost".into(),
                image_url: None,
                description: None,
                starts_at: None,
                status: FightStatus::Done,
                winner_side: None,
            })
            .await
            .unwrap();

        let engine = SettlementEngine::new(storage.clone(), provider.clone() as Arc<dyn PaymentProvider>, "USDT", 0.10);
        let report = engine.settle_once().await.unwrap();
        assert_eq!(report.refunded, 1);
        let transfers = provider.transfers();
        assert_eq!(transfers[0].2, Cents(700));
    }
}
