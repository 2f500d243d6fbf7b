//! A fight is a matchup between two participants, synchronized from an
//! external spreadsheet catalog (see `wager-catalog`).

use crate::ids::FightId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FightStatus {
    Upcoming,
    Today,
    Live,
    Done,
    Canceled,
}

impl FightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FightStatus::Upcoming => "upcoming",
            FightStatus::Today => "today",
            FightStatus::Live => "live",
            FightStatus::Done => "done",
            FightStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "upcoming" => FightStatus::Upcoming,
            "today" => FightStatus::Today,
            "live" => FightStatus::Live,
            "done" => FightStatus::Done,
            "canceled" => FightStatus::Canceled,
            _ => return None,
        })
    }
}

/// Which leg of a deal a side corresponds to. `1` or `2`, never anything
/// else — enforced at construction, not by the type itself, since the
/// value round-trips through Postgres as a plain smallint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    One,
    Two,
}

impl Side {
    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            1 => Some(Side::One),
            2 => Some(Side::Two),
            _ => None,
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            Side::One => 1,
            Side::Two => 2,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Side::One => Side::Two,
            Side::Two => Side::One,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fight {
    pub id: FightId,
    /// Unique catalog key; `None` means local-only (no spreadsheet row).
    pub external_id: Option<String>,
    pub title: String,
    pub participant1_name: String,
    pub participant2_name: String,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub status: FightStatus,
    /// Set only when `status == Done`.
    pub winner_side: Option<Side>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Fight {
    /// `status = done` and a winner has actually been recorded — the
    /// predicate the Settlement Engine gates on.
    pub fn is_resolved(&self) -> bool {
        matches!(self.status, FightStatus::Done) && self.winner_side.is_some()
    }

    /// `status = done` but no winner was ever recorded — orphan-refund
    /// territory, not payout territory.
    pub fn is_done_without_winner(&self) -> bool {
        matches!(self.status, FightStatus::Done) && self.winner_side.is_none()
    }
}

/// The upsert payload produced by a catalog source (see `wager-catalog`)
/// and consumed by `FightStorage::upsert_fight`. Absent/blank cells are
/// permitted for every field but the three identity fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FightUpsert {
    pub external_id: Option<String>,
    pub title: String,
    pub participant1_name: String,
    pub participant2_name: String,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub status: FightStatus,
    pub winner_side: Option<Side>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_opposite_is_involutive() {
        assert_eq!(Side::One.opposite(), Side::Two);
        assert_eq!(Side::Two.opposite().opposite(), Side::Two);
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            FightStatus::Upcoming,
            FightStatus::Today,
            FightStatus::Live,
            FightStatus::Done,
            FightStatus::Canceled,
        ] {
            assert_eq!(FightStatus::parse(s.as_str()), Some(s));
        }
    }
}
