//! Strongly-typed identifiers for wager-exchange entities.
//!
//! All primary keys are `BIGSERIAL` in Postgres, so every ID wraps an
//! `i64` rather than a UUID, but still gets a newtype for type safety at
//! the component boundary (no bare `i64` gets passed where a `DealId` is
//! meant).

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", $prefix, self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(UserId, "user");
id_type!(FightId, "fight");
id_type!(DealId, "deal");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_prefix() {
        assert_eq!(DealId::new(42).to_string(), "deal:42");
        assert_eq!(UserId::new(7).to_string(), "user:7");
    }

    #[test]
    fn ordering_is_by_underlying_value() {
        assert!(DealId::new(1) < DealId::new(2));
    }
}
