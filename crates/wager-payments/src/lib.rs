//! Outbound payment provider client: invoice creation, status polling,
//! and payouts, behind a provider-agnostic trait.

mod cryptopay;
mod error;
mod mock;
mod provider;
mod types;

pub use cryptopay::CryptoPayClient;
pub use error::{PaymentError, PaymentResult};
pub use mock::MockPaymentProvider;
pub use provider::PaymentProvider;
pub use types::{CreatedInvoice, InvoiceState, InvoiceStatus};
