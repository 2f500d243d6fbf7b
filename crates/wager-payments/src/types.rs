//! Provider-facing DTOs.

use serde::{Deserialize, Serialize};

/// Result of a successful `createInvoice` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedInvoice {
    pub invoice_id: i64,
    /// The link the chat surface sends the payer; named `pay_url` here
    /// regardless of which of the provider's own aliases it arrived under.
    pub pay_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceState {
    Active,
    Paid,
    Expired,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceStatus {
    pub invoice_id: i64,
    pub state: InvoiceState,
}
