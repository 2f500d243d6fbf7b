//! The central entity: a (possibly still pending) wager pairing up to two
//! legs on opposite sides of a fight for equal stakes.

use crate::fight::Side;
use crate::ids::{DealId, FightId, UserId};
use crate::money::Cents;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    AwaitingMatch,
    Matched,
    Settled,
    Void,
}

impl DealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealStatus::AwaitingMatch => "awaiting_match",
            DealStatus::Matched => "matched",
            DealStatus::Settled => "settled",
            DealStatus::Void => "void",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "awaiting_match" => DealStatus::AwaitingMatch,
            "matched" => DealStatus::Matched,
            "settled" => DealStatus::Settled,
            "void" => DealStatus::Void,
            _ => return None,
        })
    }

    /// Terminal states have no legal outgoing transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DealStatus::Settled | DealStatus::Void)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub fight_id: FightId,

    // Leg 1 - creator, always present.
    pub user1: UserId,
    pub side1: Side,
    pub amount1: Cents,
    pub paid1: bool,
    pub invoice1_id: i64,

    // Leg 2 - responder, absent until matched.
    pub user2: Option<UserId>,
    pub side2: Option<Side>,
    pub amount2: Option<Cents>,
    pub paid2: bool,
    pub invoice2_id: Option<i64>,

    pub status: DealStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    /// Visible to matching candidates only when still open: the creator's
    /// leg is paid and no responder has claimed it yet.
    pub fn is_open_for_matching(&self) -> bool {
        matches!(self.status, DealStatus::AwaitingMatch) && self.paid1 && self.user2.is_none()
    }

    /// Full equal-stake invariant once matched: opposite sides, equal
    /// amounts, both legs paid.
    pub fn legs_are_consistent(&self) -> bool {
        if !matches!(self.status, DealStatus::Matched | DealStatus::Settled) {
            return true;
        }
        self.user2.is_some()
            && self.paid1
            && self.paid2
            && self.side2.map(|s| s != self.side1).unwrap_or(false)
            && self.amount2 == Some(self.amount1)
    }

    /// A user can never be both legs of the same deal.
    pub fn no_self_match(&self) -> bool {
        self.user2.map(|u2| u2 != self.user1).unwrap_or(true)
    }

    pub fn winner(&self, winner_side: Side) -> Option<UserId> {
        if self.side1 == winner_side {
            Some(self.user1)
        } else if self.side2 == Some(winner_side) {
            self.user2
        } else {
            None
        }
    }

    pub fn total(&self) -> Cents {
        self.amount1 + self.amount2.unwrap_or(Cents(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_deal() -> Deal {
        Deal {
            id: DealId::new(1),
            fight_id: FightId::new(1),
            user1: UserId::new(1),
            side1: Side::One,
            amount1: Cents(1000),
            paid1: true,
            invoice1_id: 10,
            user2: None,
            side2: None,
            amount2: None,
            paid2: false,
            invoice2_id: None,
            status: DealStatus::AwaitingMatch,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn awaiting_unpaid_leg2_is_open() {
        let d = base_deal();
        assert!(d.is_open_for_matching());
    }

    #[test]
    fn matched_deal_requires_equal_stakes() {
        let mut d = base_deal();
        d.status = DealStatus::Matched;
        d.user2 = Some(UserId::new(2));
        d.side2 = Some(Side::Two);
        d.amount2 = Some(Cents(1000));
        d.paid2 = true;
        assert!(d.legs_are_consistent());

        d.amount2 = Some(Cents(999));
        assert!(!d.legs_are_consistent());
    }

    #[test]
    fn winner_resolves_to_correct_leg() {
        let mut d = base_deal();
        d.status = DealStatus::Matched;
        d.user2 = Some(UserId::new(2));
        d.side2 = Some(Side::Two);
        d.amount2 = Some(Cents(1000));
        d.paid2 = true;

        assert_eq!(d.winner(Side::One), Some(UserId::new(1)));
        assert_eq!(d.winner(Side::Two), Some(UserId::new(2)));
    }
}
