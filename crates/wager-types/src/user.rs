//! A user is a stable internal identity mapped 1:1 from an external chat
//! identity. Lazily created on first interaction, never deleted.

use crate::ids::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// The chat platform's own identity string (e.g. a Telegram user id).
    pub external_id: String,
    /// Display-only; never used for identity comparisons.
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: UserId, external_id: impl Into<String>, username: Option<String>) -> Self {
        Self {
            id,
            external_id: external_id.into(),
            username,
            created_at: Utc::now(),
        }
    }
}
