//! In-memory storage for tests and local development.

use crate::error::{StorageError, StorageResult};
use crate::traits::*;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use wager_types::*;

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<UserId, User>,
    users_by_external: HashMap<String, UserId>,
    fights: HashMap<FightId, Fight>,
    deals: HashMap<DealId, Deal>,
    invoice_waits: HashMap<i64, InvoiceWait>,
    stranded: HashMap<i64, StrandedRefund>,
    transitions: Vec<DealTransition>,
}

/// In-memory storage, for development and engine tests.
pub struct InMemoryStorage {
    inner: Arc<RwLock<Inner>>,
    next_user_id: AtomicI64,
    next_fight_id: AtomicI64,
    next_deal_id: AtomicI64,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            next_user_id: AtomicI64::new(1),
            next_fight_id: AtomicI64::new(1),
            next_deal_id: AtomicI64::new(1),
        }
    }

    fn record(inner: &mut Inner, deal_id: DealId, from: Option<DealStatus>, to: DealStatus, reason: &str) {
        inner
            .transitions
            .push(DealTransition::new(deal_id, from, to, reason));
    }
}

#[async_trait]
impl UserStorage for InMemoryStorage {
    async fn get_or_create_user(
        &self,
        external_id: &str,
        username: Option<&str>,
    ) -> StorageResult<User> {
        let mut inner = self.inner.write().await;
        if let Some(id) = inner.users_by_external.get(external_id).copied() {
            return Ok(inner.users.get(&id).cloned().expect("indexed user exists"));
        }
        let id = UserId::new(self.next_user_id.fetch_add(1, Ordering::SeqCst));
        let user = User::new(id, external_id, username.map(str::to_string));
        inner.users.insert(id, user.clone());
        inner.users_by_external.insert(external_id.to_string(), id);
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> StorageResult<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }
}

#[async_trait]
impl FightStorage for InMemoryStorage {
    async fn get_fight(&self, id: FightId) -> StorageResult<Option<Fight>> {
        Ok(self.inner.read().await.fights.get(&id).cloned())
    }

    async fn get_fight_by_external_id(&self, external_id: &str) -> StorageResult<Option<Fight>> {
        Ok(self
            .inner
            .read()
            .await
            .fights
            .values()
            .find(|f| f.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn find_fight_by_names(
        &self,
        title: &str,
        participant1_name: &str,
        participant2_name: &str,
    ) -> StorageResult<Option<Fight>> {
        Ok(self
            .inner
            .read()
            .await
            .fights
            .values()
            .find(|f| {
                f.title == title
                    && f.participant1_name == participant1_name
                    && f.participant2_name == participant2_name
            })
            .cloned())
    }

    async fn list_fights(&self) -> StorageResult<Vec<Fight>> {
        let mut fights: Vec<_> = self.inner.read().await.fights.values().cloned().collect();
        fights.sort_by_key(|f| f.id);
        Ok(fights)
    }

    async fn list_upcoming_fights(&self) -> StorageResult<Vec<Fight>> {
        let mut fights: Vec<_> = self
            .inner
            .read()
            .await
            .fights
            .values()
            .filter(|f| matches!(f.status, FightStatus::Upcoming | FightStatus::Today))
            .cloned()
            .collect();
        fights.sort_by_key(|f| f.starts_at);
        Ok(fights)
    }

    async fn upsert_fight(&self, upsert: FightUpsert) -> StorageResult<Fight> {
        let mut inner = self.inner.write().await;

        let existing_id = if let Some(ext) = &upsert.external_id {
            inner
                .fights
                .values()
                .find(|f| f.external_id.as_deref() == Some(ext.as_str()))
                .map(|f| f.id)
        } else {
            inner
                .fights
                .values()
                .find(|f| {
                    f.title == upsert.title
                        && f.participant1_name == upsert.participant1_name
                        && f.participant2_name == upsert.participant2_name
                })
                .map(|f| f.id)
        };

        let now = Utc::now();
        if let Some(id) = existing_id {
            let fight = inner.fights.get_mut(&id).expect("indexed fight exists");
            fight.title = upsert.title;
            fight.participant1_name = upsert.participant1_name;
            fight.participant2_name = upsert.participant2_name;
            fight.image_url = upsert.image_url;
            fight.description = upsert.description;
            fight.starts_at = upsert.starts_at;
            fight.status = upsert.status;
            fight.winner_side = upsert.winner_side;
            fight.updated_at = now;
            return Ok(fight.clone());
        }

        let id = FightId::new(self.next_fight_id.fetch_add(1, Ordering::SeqCst));
        let fight = Fight {
            id,
            external_id: upsert.external_id,
            title: upsert.title,
            participant1_name: upsert.participant1_name,
            participant2_name: upsert.participant2_name,
            image_url: upsert.image_url,
            description: upsert.description,
            starts_at: upsert.starts_at,
            status: upsert.status,
            winner_side: upsert.winner_side,
            created_at: now,
            updated_at: now,
        };
        inner.fights.insert(id, fight.clone());
        Ok(fight)
    }

    async fn list_all_external_ids(&self) -> StorageResult<Vec<String>> {
        Ok(self
            .inner
            .read()
            .await
            .fights
            .values()
            .filter_map(|f| f.external_id.clone())
            .collect())
    }

    async fn delete_fight_if_terminal(&self, id: FightId) -> StorageResult<DeleteOutcome> {
        let mut inner = self.inner.write().await;
        let has_non_terminal = inner
            .deals
            .values()
            .any(|d| d.fight_id == id && !d.status.is_terminal());
        if has_non_terminal {
            return Ok(DeleteOutcome::SkippedNonTerminalDeals);
        }
        inner.fights.remove(&id);
        Ok(DeleteOutcome::Deleted)
    }

    async fn list_fights_awaiting_result(
        &self,
        started_before: chrono::DateTime<Utc>,
        limit: i64,
    ) -> StorageResult<Vec<Fight>> {
        let mut fights: Vec<_> = self
            .inner
            .read()
            .await
            .fights
            .values()
            .filter(|f| {
                !matches!(f.status, FightStatus::Canceled)
                    && f.winner_side.is_none()
                    && f.starts_at.map(|s| s <= started_before).unwrap_or(false)
            })
            .cloned()
            .collect();
        fights.sort_by_key(|f| f.starts_at);
        fights.truncate(limit.max(0) as usize);
        Ok(fights)
    }
}

#[async_trait]
impl DealStorage for InMemoryStorage {
    async fn get_deal(&self, id: DealId) -> StorageResult<Option<Deal>> {
        Ok(self.inner.read().await.deals.get(&id).cloned())
    }

    async fn list_open_for(
        &self,
        fight_id: FightId,
        excluding_user: UserId,
    ) -> StorageResult<Vec<Deal>> {
        let mut deals: Vec<_> = self
            .inner
            .read()
            .await
            .deals
            .values()
            .filter(|d| d.fight_id == fight_id && d.is_open_for_matching() && d.user1 != excluding_user)
            .cloned()
            .collect();
        deals.sort_by_key(|d| d.id);
        Ok(deals)
    }

    async fn list_my_active_deals(&self, user: UserId) -> StorageResult<Vec<Deal>> {
        let mut deals: Vec<_> = self
            .inner
            .read()
            .await
            .deals
            .values()
            .filter(|d| {
                (d.user1 == user || d.user2 == Some(user))
                    && matches!(d.status, DealStatus::AwaitingMatch | DealStatus::Matched)
            })
            .cloned()
            .collect();
        deals.sort_by_key(|d| d.id);
        Ok(deals)
    }

    async fn list_my_shareable_deals(&self, user: UserId) -> StorageResult<Vec<Deal>> {
        let mut deals: Vec<_> = self
            .inner
            .read()
            .await
            .deals
            .values()
            .filter(|d| d.user1 == user && d.is_open_for_matching())
            .cloned()
            .collect();
        deals.sort_by_key(|d| d.id);
        Ok(deals)
    }

    async fn apply_paid_new(
        &self,
        fight_id: FightId,
        side: Side,
        amount: Cents,
        payer: UserId,
        invoice_id: i64,
    ) -> StorageResult<MatchOutcome> {
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner
            .deals
            .values()
            .find(|d| d.invoice1_id == invoice_id || d.invoice2_id == Some(invoice_id))
        {
            // Same invoice already applied: replaying it must not open or
            // pair a second deal leg.
            return Ok(if existing.status == DealStatus::Matched {
                MatchOutcome::Paired(existing.id)
            } else {
                MatchOutcome::CreatedAwaiting(existing.id)
            });
        }

        let candidate_id = {
            let mut candidates: Vec<&Deal> = inner
                .deals
                .values()
                .filter(|d| {
                    d.fight_id == fight_id
                        && d.is_open_for_matching()
                        && d.side1 == side.opposite()
                        && d.amount1 == amount
                        && d.user1 != payer
                })
                .collect();
            candidates.sort_by_key(|d| d.id);
            candidates.first().map(|d| d.id)
        };

        if let Some(id) = candidate_id {
            let deal = inner.deals.get_mut(&id).expect("indexed deal exists");
            deal.user2 = Some(payer);
            deal.side2 = Some(side);
            deal.amount2 = Some(amount);
            deal.paid2 = true;
            deal.invoice2_id = Some(invoice_id);
            deal.status = DealStatus::Matched;
            deal.updated_at = Utc::now();
            Self::record(
                &mut inner,
                id,
                Some(DealStatus::AwaitingMatch),
                DealStatus::Matched,
                "pair-on-pay",
            );
            return Ok(MatchOutcome::Paired(id));
        }

        let id = DealId::new(self.next_deal_id.fetch_add(1, Ordering::SeqCst));
        let now = Utc::now();
        let deal = Deal {
            id,
            fight_id,
            user1: payer,
            side1: side,
            amount1: amount,
            paid1: true,
            invoice1_id: invoice_id,
            user2: None,
            side2: None,
            amount2: None,
            paid2: false,
            invoice2_id: None,
            status: DealStatus::AwaitingMatch,
            created_at: now,
            updated_at: now,
        };
        inner.deals.insert(id, deal);
        Self::record(&mut inner, id, None, DealStatus::AwaitingMatch, "new intent paid");
        Ok(MatchOutcome::CreatedAwaiting(id))
    }

    async fn apply_paid_match(
        &self,
        deal_id: DealId,
        side: Side,
        amount: Cents,
        payer: UserId,
        invoice_id: i64,
    ) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;

        if let Some(deal) = inner.deals.get(&deal_id) {
            if deal.invoice2_id == Some(invoice_id) {
                return Ok(true);
            }
        }

        let eligible = inner
            .deals
            .get(&deal_id)
            .map(|d| d.is_open_for_matching() && d.user1 != payer && d.amount1 == amount)
            .unwrap_or(false);
        if !eligible {
            return Ok(false);
        }
        let deal = inner.deals.get_mut(&deal_id).expect("checked above");
        deal.user2 = Some(payer);
        deal.side2 = Some(side);
        deal.amount2 = Some(amount);
        deal.paid2 = true;
        deal.invoice2_id = Some(invoice_id);
        deal.status = DealStatus::Matched;
        deal.updated_at = Utc::now();
        Self::record(
            &mut inner,
            deal_id,
            Some(DealStatus::AwaitingMatch),
            DealStatus::Matched,
            "match intent paid",
        );
        Ok(true)
    }

    async fn claim_payout_batch(&self, limit: i64) -> StorageResult<Vec<PayoutCandidate>> {
        let inner = self.inner.read().await;
        let mut out = Vec::new();
        let mut matched: Vec<&Deal> = inner
            .deals
            .values()
            .filter(|d| matches!(d.status, DealStatus::Matched))
            .collect();
        matched.sort_by_key(|d| d.id);
        for deal in matched {
            if out.len() as i64 >= limit {
                break;
            }
            let Some(fight) = inner.fights.get(&deal.fight_id) else {
                continue;
            };
            if let Some(winner_side) = fight.winner_side.filter(|_| fight.is_resolved()) {
                out.push(PayoutCandidate {
                    deal: deal.clone(),
                    winner_side,
                });
            }
        }
        Ok(out)
    }

    async fn mark_settled(&self, id: DealId) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let deal = inner
            .deals
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("deal {id}")))?;
        deal.status = DealStatus::Settled;
        deal.updated_at = Utc::now();
        Self::record(&mut inner, id, Some(DealStatus::Matched), DealStatus::Settled, "payout issued");
        Ok(())
    }

    async fn claim_refund_batch(&self, limit: i64) -> StorageResult<Vec<Deal>> {
        let inner = self.inner.read().await;
        let mut out = Vec::new();
        let mut candidates: Vec<&Deal> = inner
            .deals
            .values()
            .filter(|d| {
                matches!(d.status, DealStatus::AwaitingMatch) && d.paid1 && d.user2.is_none()
            })
            .collect();
        candidates.sort_by_key(|d| d.id);
        for deal in candidates.drain(..) {
            if out.len() as i64 >= limit {
                break;
            }
            if let Some(fight) = inner.fights.get(&deal.fight_id) {
                if matches!(fight.status, FightStatus::Done) {
                    out.push(deal.clone());
                }
            }
        }
        Ok(out)
    }

    async fn mark_void(&self, id: DealId) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let deal = inner
            .deals
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("deal {id}")))?;
        deal.status = DealStatus::Void;
        deal.updated_at = Utc::now();
        Self::record(&mut inner, id, Some(DealStatus::AwaitingMatch), DealStatus::Void, "orphan refund");
        Ok(())
    }
}

#[async_trait]
impl InvoiceWaitStorage for InMemoryStorage {
    async fn insert_invoice_wait(&self, wait: InvoiceWait) -> StorageResult<()> {
        self.inner.write().await.invoice_waits.insert(wait.invoice_id, wait);
        Ok(())
    }

    async fn get_invoice_wait(&self, invoice_id: i64) -> StorageResult<Option<InvoiceWait>> {
        Ok(self.inner.read().await.invoice_waits.get(&invoice_id).cloned())
    }

    async fn delete_invoice_wait(&self, invoice_id: i64) -> StorageResult<Option<InvoiceWait>> {
        Ok(self.inner.write().await.invoice_waits.remove(&invoice_id))
    }

    async fn list_invoice_waits(&self) -> StorageResult<Vec<InvoiceWait>> {
        Ok(self.inner.read().await.invoice_waits.values().cloned().collect())
    }
}

#[async_trait]
impl StrandedRefundStorage for InMemoryStorage {
    async fn queue_stranded_refund(&self, refund: StrandedRefund) -> StorageResult<()> {
        self.inner.write().await.stranded.insert(refund.invoice_id, refund);
        Ok(())
    }

    async fn list_unresolved_stranded_refunds(&self, limit: i64) -> StorageResult<Vec<StrandedRefund>> {
        let mut out: Vec<_> = self
            .inner
            .read()
            .await
            .stranded
            .values()
            .filter(|r| r.resolved_at.is_none())
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn mark_stranded_resolved(&self, invoice_id: i64) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(r) = inner.stranded.get_mut(&invoice_id) {
            r.resolved_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl TransitionLogStorage for InMemoryStorage {
    async fn record_transition(&self, transition: DealTransition) -> StorageResult<()> {
        self.inner.write().await.transitions.push(transition);
        Ok(())
    }

    async fn list_transitions_for_deal(&self, deal_id: DealId) -> StorageResult<Vec<DealTransition>> {
        Ok(self
            .inner
            .read()
            .await
            .transitions
            .iter()
            .filter(|t| t.deal_id == deal_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pair_on_pay_matches_opposite_side_same_amount() {
        let storage = InMemoryStorage::new();
        let a = storage.get_or_create_user("tg:1", None).await.unwrap();
        let b = storage.get_or_create_user("tg:2", None).await.unwrap();
        let fight_id = FightId::new(1);

        let outcome = storage
            .apply_paid_new(fight_id, Side::One, Cents(1000), a.id, 101)
            .await
            .unwrap();
        let deal_id = match outcome {
            MatchOutcome::CreatedAwaiting(id) => id,
            other => panic!("expected CreatedAwaiting, got {other:?}"),
        };

        let outcome2 = storage
            .apply_paid_new(fight_id, Side::Two, Cents(1000), b.id, 102)
            .await
            .unwrap();
        assert_eq!(outcome2, MatchOutcome::Paired(deal_id));

        let deal = storage.get_deal(deal_id).await.unwrap().unwrap();
        assert_eq!(deal.status, DealStatus::Matched);
        assert_eq!(deal.user2, Some(b.id));
        assert!(deal.legs_are_consistent());
        assert!(deal.no_self_match());
    }

    #[tokio::test]
    async fn apply_paid_match_rejects_self_match() {
        let storage = InMemoryStorage::new();
        let a = storage.get_or_create_user("tg:1", None).await.unwrap();
        let fight_id = FightId::new(1);
        let outcome = storage
            .apply_paid_new(fight_id, Side::One, Cents(500), a.id, 1)
            .await
            .unwrap();
        let deal_id = match outcome {
            MatchOutcome::CreatedAwaiting(id) => id,
            _ => unreachable!(),
        };

        let matched = storage
            .apply_paid_match(deal_id, Side::Two, Cents(500), a.id, 2)
            .await
            .unwrap();
        assert!(!matched, "creator must not be able to match their own deal");
    }

    #[tokio::test]
    async fn delete_fight_blocked_while_non_terminal_deal_exists() {
        let storage = InMemoryStorage::new();
        let a = storage.get_or_create_user("tg:1", None).await.unwrap();
        let fight = storage
            .upsert_fight(FightUpsert {
                external_id: Some("ext-1".into()),
                title: "A vs B".into(),
                participant1_name: "A".into(),
                participant2_name: "B".into(),
                image_url: None,
                description: None,
                starts_at: None,
                status: FightStatus::Upcoming,
                winner_side: None,
            })
            .await
            .unwrap();
        storage
            .apply_paid_new(fight.id, Side::One, Cents(100), a.id, 1)
            .await
            .unwrap();

        let outcome = storage.delete_fight_if_terminal(fight.id).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::SkippedNonTerminalDeals);
        assert!(storage.get_fight(fight.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_opposite_side_payments_pair_exactly_once() {
        let storage = Arc::new(InMemoryStorage::new());
        let a = storage.get_or_create_user("tg:1", None).await.unwrap();
        let b = storage.get_or_create_user("tg:2", None).await.unwrap();
        let fight_id = FightId::new(1);

        let s1 = storage.clone();
        let t1 = tokio::spawn(async move { s1.apply_paid_new(fight_id, Side::One, Cents(1000), a.id, 201).await });
        let s2 = storage.clone();
        let t2 = tokio::spawn(async move { s2.apply_paid_new(fight_id, Side::Two, Cents(1000), b.id, 202).await });

        let (r1, r2) = tokio::join!(t1, t2);
        let outcomes = [r1.unwrap().unwrap(), r2.unwrap().unwrap()];

        let paired = outcomes.iter().filter(|o| matches!(o, MatchOutcome::Paired(_))).count();
        let awaiting = outcomes.iter().filter(|o| matches!(o, MatchOutcome::CreatedAwaiting(_))).count();
        assert_eq!(paired, 1, "exactly one side must observe the pairing");
        assert_eq!(awaiting, 1, "exactly one side must have created the awaiting deal");

        let deal_ids: Vec<DealId> = outcomes
            .iter()
            .map(|o| match o {
                MatchOutcome::Paired(id) | MatchOutcome::CreatedAwaiting(id) => *id,
            })
            .collect();
        assert_eq!(deal_ids[0], deal_ids[1], "both payments must resolve to the same deal");

        let deal = storage.get_deal(deal_ids[0]).await.unwrap().unwrap();
        assert_eq!(deal.status, DealStatus::Matched);
        assert_eq!(storage.list_open_for(fight_id, a.id).await.unwrap().len(), 0);
    }
}
