//! Storage trait definitions.
//!
//! Operations that must be atomic (pair-on-pay, MATCH application,
//! settlement batches) are first-class trait methods rather than exposed
//! row locks — the transaction boundary lives inside the Postgres
//! implementation, so every guard predicate is evaluated inside the same
//! transaction that applies its effect.

use crate::error::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use wager_types::{
    Cents, Deal, DealId, DealTransition, Fight, FightId, FightUpsert, IntentPayload, InvoiceWait,
    Side, StrandedRefund, User, UserId,
};

/// Outcome of applying a paid NEW intent.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Paired with an existing awaiting deal; it is now `matched`.
    Paired(DealId),
    /// No candidate found; a brand-new `awaiting_match` deal was created.
    CreatedAwaiting(DealId),
}

/// Outcome of running the catalog synchronizer's prune step against one
/// fight id absent from the latest sync tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    SkippedNonTerminalDeals,
}

/// A matched deal ready for the payout pass, joined with its fight's
/// winner side.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutCandidate {
    pub deal: Deal,
    pub winner_side: Side,
}

#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Lazily creates the user on first interaction; idempotent on
    /// `external_id`.
    async fn get_or_create_user(
        &self,
        external_id: &str,
        username: Option<&str>,
    ) -> StorageResult<User>;

    async fn get_user(&self, id: UserId) -> StorageResult<Option<User>>;
}

#[async_trait]
pub trait FightStorage: Send + Sync {
    async fn get_fight(&self, id: FightId) -> StorageResult<Option<Fight>>;

    async fn get_fight_by_external_id(&self, external_id: &str) -> StorageResult<Option<Fight>>;

    async fn find_fight_by_names(
        &self,
        title: &str,
        participant1_name: &str,
        participant2_name: &str,
    ) -> StorageResult<Option<Fight>>;

    async fn list_fights(&self) -> StorageResult<Vec<Fight>>;

    async fn list_upcoming_fights(&self) -> StorageResult<Vec<Fight>>;

    /// Upserts by `external_id` when present, else by the
    /// (title, participant1_name, participant2_name) triple. Returns the
    /// resulting row.
    async fn upsert_fight(&self, upsert: FightUpsert) -> StorageResult<Fight>;

    /// All external ids currently stored, for the sync tick's
    /// touched-vs-stored diff.
    async fn list_all_external_ids(&self) -> StorageResult<Vec<String>>;

    /// Deletes the fight unless it has non-terminal deals. This check and
    /// the delete happen in the same transaction.
    async fn delete_fight_if_terminal(&self, id: FightId) -> StorageResult<DeleteOutcome>;

    /// Fights that started more than `older_than` ago with no recorded
    /// winner yet — feeds the admin result reminder.
    async fn list_fights_awaiting_result(
        &self,
        started_before: DateTime<Utc>,
        limit: i64,
    ) -> StorageResult<Vec<Fight>>;
}

#[async_trait]
pub trait DealStorage: Send + Sync {
    async fn get_deal(&self, id: DealId) -> StorageResult<Option<Deal>>;

    /// Deals awaiting a match: paid1, no responder yet, excluding the
    /// given user's own deals, ordered by id ascending.
    async fn list_open_for(&self, fight_id: FightId, excluding_user: UserId)
        -> StorageResult<Vec<Deal>>;

    /// Deals where the caller is leg 1 or leg 2 and the deal is not yet
    /// terminal.
    async fn list_my_active_deals(&self, user: UserId) -> StorageResult<Vec<Deal>>;

    /// The caller's own still-open (awaiting responder) deals, i.e. the
    /// ones worth sharing a link to.
    async fn list_my_shareable_deals(&self, user: UserId) -> StorageResult<Vec<Deal>>;

    /// Pair-on-pay: finds an eligible opposite-side awaiting deal and
    /// completes it, or opens a new one, inside a single transaction.
    async fn apply_paid_new(
        &self,
        fight_id: FightId,
        side: Side,
        amount: Cents,
        payer: UserId,
        invoice_id: i64,
    ) -> StorageResult<MatchOutcome>;

    /// Conditional update inside a single transaction: completes the
    /// named deal's second leg iff it is still open and the payer isn't
    /// its own creator. Returns `true` iff the deal is now `matched`.
    async fn apply_paid_match(
        &self,
        deal_id: DealId,
        side: Side,
        amount: Cents,
        payer: UserId,
        invoice_id: i64,
    ) -> StorageResult<bool>;

    /// Claims up to `limit` matched deals whose fight has a recorded
    /// winner, with `FOR UPDATE SKIP LOCKED`, leaving them `matched` (the
    /// caller marks them settled after a successful transfer).
    async fn claim_payout_batch(&self, limit: i64) -> StorageResult<Vec<PayoutCandidate>>;

    async fn mark_settled(&self, id: DealId) -> StorageResult<()>;

    /// Claims up to `limit` orphaned awaiting deals whose fight is done,
    /// `FOR UPDATE SKIP LOCKED`.
    async fn claim_refund_batch(&self, limit: i64) -> StorageResult<Vec<Deal>>;

    async fn mark_void(&self, id: DealId) -> StorageResult<()>;
}

#[async_trait]
pub trait InvoiceWaitStorage: Send + Sync {
    async fn insert_invoice_wait(&self, wait: InvoiceWait) -> StorageResult<()>;

    async fn get_invoice_wait(&self, invoice_id: i64) -> StorageResult<Option<InvoiceWait>>;

    async fn delete_invoice_wait(&self, invoice_id: i64) -> StorageResult<Option<InvoiceWait>>;

    async fn list_invoice_waits(&self) -> StorageResult<Vec<InvoiceWait>>;
}

#[async_trait]
pub trait StrandedRefundStorage: Send + Sync {
    async fn queue_stranded_refund(&self, refund: StrandedRefund) -> StorageResult<()>;

    async fn list_unresolved_stranded_refunds(&self, limit: i64) -> StorageResult<Vec<StrandedRefund>>;

    async fn mark_stranded_resolved(&self, invoice_id: i64) -> StorageResult<()>;
}

#[async_trait]
pub trait TransitionLogStorage: Send + Sync {
    async fn record_transition(&self, transition: DealTransition) -> StorageResult<()>;

    async fn list_transitions_for_deal(&self, deal_id: DealId) -> StorageResult<Vec<DealTransition>>;
}

/// Combined storage trait implemented by every backend.
pub trait Storage:
    UserStorage
    + FightStorage
    + DealStorage
    + InvoiceWaitStorage
    + StrandedRefundStorage
    + TransitionLogStorage
    + Send
    + Sync
{
}

impl<T> Storage for T where
    T: UserStorage
        + FightStorage
        + DealStorage
        + InvoiceWaitStorage
        + StrandedRefundStorage
        + TransitionLogStorage
        + Send
        + Sync
{
}
