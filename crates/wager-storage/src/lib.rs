//! Storage layer for the wager exchange engine.
//!
//! Provides persistent storage for users, fights, deals, in-flight
//! invoice waits, stranded refunds, and the deal transition audit log.

mod error;
mod memory;
mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
pub use traits::{
    DealStorage, DeleteOutcome, FightStorage, InvoiceWaitStorage, MatchOutcome, PayoutCandidate,
    Storage, StrandedRefundStorage, TransitionLogStorage, UserStorage,
};
