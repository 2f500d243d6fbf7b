//! `InvoiceWait` is the reconciliation spine: presence of a row means a
//! payment has been seen as "invoiced" but not yet applied to a deal.

use crate::fight::Side;
use crate::ids::{DealId, FightId};
use crate::money::Cents;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    New,
    Match,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::New => "NEW",
            IntentKind::Match => "MATCH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "NEW" => IntentKind::New,
            "MATCH" => IntentKind::Match,
            _ => return None,
        })
    }
}

/// The structured payload stored (as JSON) alongside an invoice, and
/// handed unchanged to the payment provider as the invoice's own
/// `payload` field so it round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum IntentPayload {
    #[serde(rename = "NEW")]
    New {
        fight_id: FightId,
        side: Side,
        amount_cents: Cents,
        payer_user_tag: String,
    },
    #[serde(rename = "MATCH")]
    Match {
        deal_id: DealId,
        side: Side,
        amount_cents: Cents,
        payer_user_tag: String,
    },
}

impl IntentPayload {
    pub fn kind(&self) -> IntentKind {
        match self {
            IntentPayload::New { .. } => IntentKind::New,
            IntentPayload::Match { .. } => IntentKind::Match,
        }
    }

    pub fn amount_cents(&self) -> Cents {
        match self {
            IntentPayload::New { amount_cents, .. } => *amount_cents,
            IntentPayload::Match { amount_cents, .. } => *amount_cents,
        }
    }

    pub fn payer_user_tag(&self) -> &str {
        match self {
            IntentPayload::New { payer_user_tag, .. } => payer_user_tag,
            IntentPayload::Match { payer_user_tag, .. } => payer_user_tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceWait {
    pub invoice_id: i64,
    pub payload: IntentPayload,
    pub created_at: DateTime<Utc>,
}

impl InvoiceWait {
    pub fn new(invoice_id: i64, payload: IntentPayload) -> Self {
        Self {
            invoice_id,
            payload,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trips_through_json() {
        let payload = IntentPayload::New {
            fight_id: FightId::new(5),
            side: Side::One,
            amount_cents: Cents(1000),
            payer_user_tag: "tg:123".into(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        let back: IntentPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload, back);
    }

    #[test]
    fn kind_matches_variant() {
        let payload = IntentPayload::Match {
            deal_id: DealId::new(1),
            side: Side::Two,
            amount_cents: Cents(500),
            payer_user_tag: "tg:9".into(),
        };
        assert_eq!(payload.kind(), IntentKind::Match);
    }
}
