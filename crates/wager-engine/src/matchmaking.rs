//! The matchmaking façade: the one surface the presentation adapter
//! talks to. Everything here either reads storage directly or creates
//! an invoice and records an `InvoiceWait` — actually applying a paid
//! invoice to a deal is the reconciler's job, never this one's.

use crate::error::{EngineError, EngineResult};
use std::sync::Arc;
use wager_payments::PaymentProvider;
use wager_storage::Storage;
use wager_types::{Cents, Deal, Fight, FightId, IntentPayload, InvoiceWait, Side, UserId};

pub struct CreatedIntent {
    pub invoice_id: i64,
    pub pay_url: String,
}

pub struct MatchmakingEngine {
    storage: Arc<dyn Storage>,
    provider: Arc<dyn PaymentProvider>,
    default_asset: String,
}

impl MatchmakingEngine {
    pub fn new(storage: Arc<dyn Storage>, provider: Arc<dyn PaymentProvider>, default_asset: impl Into<String>) -> Self {
        Self {
            storage,
            provider,
            default_asset: default_asset.into(),
        }
    }

    /// Resolves an external chat identity to its internal user id,
    /// creating the user record on first sight. The presentation layer
    /// only ever knows external ids; everything past this point works
    /// in terms of `UserId`.
    pub async fn resolve_user(&self, external_id: &str, username: Option<&str>) -> EngineResult<UserId> {
        Ok(self.storage.get_or_create_user(external_id, username).await?.id)
    }

    pub async fn list_upcoming_fights(&self) -> EngineResult<Vec<Fight>> {
        Ok(self.storage.list_upcoming_fights().await?)
    }

    pub async fn get_fight(&self, id: FightId) -> EngineResult<Option<Fight>> {
        Ok(self.storage.get_fight(id).await?)
    }

    pub async fn list_open_deals(&self, fight_id: FightId, excluding_user: UserId) -> EngineResult<Vec<Deal>> {
        Ok(self.storage.list_open_for(fight_id, excluding_user).await?)
    }

    pub async fn list_my_active_deals(&self, user: UserId) -> EngineResult<Vec<Deal>> {
        Ok(self.storage.list_my_active_deals(user).await?)
    }

    pub async fn list_my_shareable_deals(&self, user: UserId) -> EngineResult<Vec<Deal>> {
        Ok(self.storage.list_my_shareable_deals(user).await?)
    }

    /// Opens a new wager: creates the payer's user record, asks the
    /// provider for an invoice, and records the wait row. The deal
    /// itself does not exist yet — it is created when the reconciler
    /// sees the invoice paid.
    pub async fn create_new_intent(
        &self,
        fight_id: FightId,
        side: Side,
        amount: Cents,
        payer_external_id: &str,
        payer_username: Option<&str>,
    ) -> EngineResult<CreatedIntent> {
        if amount.0 <= 0 {
            return Err(EngineError::InvalidInput("amount must be positive".into()));
        }
        let fight = self
            .storage
            .get_fight(fight_id)
            .await?
            .ok_or_else(|| EngineError::InvalidInput("unknown fight".into()))?;
        if fight.is_resolved() || fight.is_done_without_winner() {
            return Err(EngineError::InvalidInput("fight is no longer open for wagers".into()));
        }

        self.storage.get_or_create_user(payer_external_id, payer_username).await?;
        let payload = IntentPayload::New {
            fight_id,
            side,
            amount_cents: amount,
            payer_user_tag: payer_external_id.to_string(),
        };
        self.issue_invoice(amount, payload).await
    }

    /// Responds to an existing open deal. Rejects a self-match before
    /// ever talking to the payment provider.
    pub async fn create_match_intent(
        &self,
        deal_id: wager_types::DealId,
        payer_external_id: &str,
        payer_username: Option<&str>,
    ) -> EngineResult<CreatedIntent> {
        let deal = self
            .storage
            .get_deal(deal_id)
            .await?
            .ok_or_else(|| EngineError::InvalidInput("unknown deal".into()))?;
        if !deal.is_open_for_matching() {
            return Err(EngineError::InvalidInput("deal is no longer open".into()));
        }

        let payer = self.storage.get_or_create_user(payer_external_id, payer_username).await?;
        if payer.id == deal.user1 {
            return Err(EngineError::InvalidInput("cannot match your own deal".into()));
        }

        let payload = IntentPayload::Match {
            deal_id,
            side: deal.side1.opposite(),
            amount_cents: deal.amount1,
            payer_user_tag: payer_external_id.to_string(),
        };
        self.issue_invoice(deal.amount1, payload).await
    }

    async fn issue_invoice(&self, amount: Cents, payload: IntentPayload) -> EngineResult<CreatedIntent> {
        let created = self
            .provider
            .create_invoice(&self.default_asset, amount, &payload)
            .await?;
        self.storage
            .insert_invoice_wait(InvoiceWait::new(created.invoice_id, payload))
            .await?;
        Ok(CreatedIntent {
            invoice_id: created.invoice_id,
            pay_url: created.pay_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wager_payments::MockPaymentProvider;
    use wager_storage::InMemoryStorage;
    use wager_types::{FightStatus, FightUpsert};

    async fn engine_with_fight() -> (MatchmakingEngine, FightId) {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let provider: Arc<dyn PaymentProvider> = Arc::new(MockPaymentProvider::new());
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
        (MatchmakingEngine::new(storage, provider, "USDT"), fight.id)
    }

    #[tokio::test]
    async fn create_new_intent_records_invoice_wait() {
        let (engine, fight_id) = engine_with_fight().await;
        let intent = engine
            .create_new_intent(fight_id, Side::One, Cents(1000), "tg:1", None)
            .await
            .unwrap();
        assert!(intent.invoice_id > 0);
    }

    #[tokio::test]
    async fn rejects_negative_amount() {
        let (engine, fight_id) = engine_with_fight().await;
        let err = engine
            .create_new_intent(fight_id, Side::One, Cents(-1), "tg:1", None)
            .await;
        assert!(err.is_err());
    }
}
