//! Domain records for the wager exchange engine.
//!
//! Every entity that crosses a component boundary (storage, payment
//! provider, catalog sync, presentation adapter) is a named record here —
//! no free-form JSON/dictionary shapes at the boundary.

pub mod deal;
pub mod fight;
pub mod ids;
pub mod invoice;
pub mod money;
pub mod transition;
pub mod user;

pub use deal::{Deal, DealStatus};
pub use fight::{Fight, FightStatus, FightUpsert, Side};
pub use ids::{DealId, FightId, UserId};
pub use invoice::{IntentKind, IntentPayload, InvoiceWait};
pub use money::{Cents, MoneyError};
pub use transition::{DealTransition, StrandedRefund};
pub use user::User;
