//! The row shape read off the external tabular source, before it becomes
//! a `FightUpsert`.

use crate::error::{CatalogError, CatalogResult};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use wager_types::{FightStatus, FightUpsert, Side};

/// Raw CSV row. Every column is a plain string; blank cells are legal
/// everywhere except the three identity columns.
#[derive(Debug, Clone, Deserialize)]
pub struct CsvRow {
    pub external_id: String,
    #[serde(default)]
    pub title: String,
    pub side1_name: String,
    pub side2_name: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub starts_at: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub winner: String,
}

fn blank_to_none(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl CsvRow {
    pub fn into_upsert(self) -> CatalogResult<FightUpsert> {
        let external_id = blank_to_none(&self.external_id)
            .ok_or_else(|| CatalogError::InvalidRow("external_id".into()))?;
        let participant1_name = blank_to_none(&self.side1_name)
            .ok_or_else(|| CatalogError::InvalidRow("side1_name".into()))?;
        let participant2_name = blank_to_none(&self.side2_name)
            .ok_or_else(|| CatalogError::InvalidRow("side2_name".into()))?;
        let title = blank_to_none(&self.title)
            .unwrap_or_else(|| format!("{participant1_name} vs {participant2_name}"));

        let starts_at = blank_to_none(&self.starts_at).and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        });

        let status = blank_to_none(&self.status)
            .and_then(|s| FightStatus::parse(&s.to_lowercase()))
            .unwrap_or(FightStatus::Upcoming);

        let winner_side = blank_to_none(&self.winner).and_then(|w| match w.as_str() {
            "1" => Some(Side::One),
            "2" => Some(Side::Two),
            _ => None,
        });

        Ok(FightUpsert {
            external_id: Some(external_id),
            title,
            participant1_name,
            participant2_name,
            image_url: blank_to_none(&self.image_url),
            description: blank_to_none(&self.description),
            starts_at,
            status,
            winner_side,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(external_id: &str, status: &str, winner: &str) -> CsvRow {
        CsvRow {
            external_id: external_id.to_string(),
            title: "".to_string(),
            side1_name: "Alpha".to_string(),
            side2_name: "Bravo".to_string(),
            image_url: "".to_string(),
            starts_at: "".to_string(),
            status: status.to_string(),
            description: "".to_string(),
            winner: winner.to_string(),
        }
    }

    #[test]
    fn blank_title_defaults_to_matchup() {
        let upsert = row("ext-1", "done", "1").into_upsert().unwrap();
        assert_eq!(upsert.title, "Alpha vs Bravo");
        assert_eq!(upsert.winner_side, Some(Side::One));
    }

    #[test]
    fn missing_external_id_is_rejected() {
        let mut r = row("", "upcoming", "");
        r.external_id = "".into();
        assert!(r.into_upsert().is_err());
    }

    #[test]
    fn unknown_status_defaults_to_upcoming() {
        let upsert = row("ext-2", "garbage", "").into_upsert().unwrap();
        assert_eq!(upsert.status, FightStatus::Upcoming);
    }
}
