//! API request handlers.

mod deals;
mod fights;
mod intents;

pub use deals::*;
pub use fights::*;
pub use intents::*;
