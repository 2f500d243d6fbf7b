//! Append-only audit log of deal state transitions.
//!
//! This is observability only — per spec, no in-memory or secondary
//! ledger may be the source of truth for funds. `wager-storage` writes a
//! row here in the same transaction as every status-changing update, but
//! nothing ever reads it back to decide behavior.

use crate::deal::DealStatus;
use crate::ids::DealId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealTransition {
    pub deal_id: DealId,
    pub from_status: Option<DealStatus>,
    pub to_status: DealStatus,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

impl DealTransition {
    pub fn new(
        deal_id: DealId,
        from_status: Option<DealStatus>,
        to_status: DealStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            deal_id,
            from_status,
            to_status,
            reason: reason.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// A MATCH payment that arrived for a deal no longer eligible to receive
/// it (already matched by a racing payer, or already voided). Queued for
/// an explicit compensating refund rather than silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrandedRefund {
    pub invoice_id: i64,
    pub payer_user_tag: String,
    pub amount_cents: crate::money::Cents,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl StrandedRefund {
    pub fn spend_id(&self) -> String {
        format!("refund_stranded:{}", self.invoice_id)
    }
}
