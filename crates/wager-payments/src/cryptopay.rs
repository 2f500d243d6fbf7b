//! Crypto Pay client.
//!
//! Authenticates with the `Crypto-Pay-API-Token` header and wraps the
//! provider's `{ok, result}` / `{ok, error}` response envelope.

use crate::error::{PaymentError, PaymentResult};
use crate::provider::PaymentProvider;
use crate::types::{CreatedInvoice, InvoiceState, InvoiceStatus};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use wager_types::{Cents, IntentPayload};

const DEFAULT_BASE_URL: &str = "https://pay.crypt.bot/api";

pub struct CryptoPayClient {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct CreateInvoiceRequest {
    asset: String,
    amount: String,
    description: String,
    payload: String,
    allow_comments: bool,
    allow_anonymous: bool,
}

#[derive(Debug, Deserialize)]
struct ProviderInvoice {
    invoice_id: i64,
    #[serde(alias = "pay_url", alias = "bot_invoice_url")]
    pay_url: String,
}

#[derive(Debug, Deserialize)]
struct ProviderInvoiceStatus {
    invoice_id: i64,
    status: String,
}

#[derive(Debug, Deserialize)]
struct GetInvoicesResult {
    items: Vec<ProviderInvoiceStatus>,
}

#[derive(Debug, Serialize)]
struct TransferRequest {
    user_id: String,
    asset: String,
    amount: String,
    spend_id: String,
}

impl CryptoPayClient {
    pub fn new(token: impl Into<String>) -> PaymentResult<Self> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> PaymentResult<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(PaymentError::Unauthenticated);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(PaymentError::from)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, method: &str, body: &B) -> PaymentResult<T> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .header("Crypto-Pay-API-Token", &self.token)
            .json(body)
            .send()
            .await?;
        self.unwrap_envelope(method, response).await
    }

    async fn get<T: DeserializeOwned>(&self, method: &str) -> PaymentResult<T> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .client
            .get(&url)
            .header("Crypto-Pay-API-Token", &self.token)
            .send()
            .await?;
        self.unwrap_envelope(method, response).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        &self,
        method: &str,
        response: reqwest::Response,
    ) -> PaymentResult<T> {
        let status = response.status();
        if status.is_server_error() {
            return Err(PaymentError::Transient(format!("{method} returned {status}")));
        }
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
        if !envelope.ok {
            let message = envelope
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no error detail".to_string());
            return Err(PaymentError::Rejected {
                method: method.to_string(),
                message,
            });
        }
        envelope
            .result
            .ok_or_else(|| PaymentError::InvalidResponse(format!("{method} had no result")))
    }
}

#[async_trait]
impl PaymentProvider for CryptoPayClient {
    async fn create_invoice(
        &self,
        asset: &str,
        amount: Cents,
        payload: &IntentPayload,
    ) -> PaymentResult<CreatedInvoice> {
        let payload_json = serde_json::to_string(payload)
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
        let req = CreateInvoiceRequest {
            asset: asset.to_string(),
            amount: amount.to_decimal_string(),
            description: format!("wager {}", payload.kind().as_str().to_lowercase()),
            payload: payload_json,
            allow_comments: true,
            allow_anonymous: false,
        };
        let created: ProviderInvoice = self.post("createInvoice", &req).await?;
        Ok(CreatedInvoice {
            invoice_id: created.invoice_id,
            pay_url: created.pay_url,
        })
    }

    async fn get_invoices(&self, invoice_ids: &[i64]) -> PaymentResult<Vec<InvoiceStatus>> {
        if invoice_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids_csv = invoice_ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let result: GetInvoicesResult = self
            .get(&format!("getInvoices?invoice_ids={ids_csv}"))
            .await?;
        Ok(result
            .items
            .into_iter()
            .map(|item| InvoiceStatus {
                invoice_id: item.invoice_id,
                state: match item.status.as_str() {
                    "active" => InvoiceState::Active,
                    "paid" => InvoiceState::Paid,
                    "expired" => InvoiceState::Expired,
                    _ => InvoiceState::Other,
                },
            })
            .collect())
    }

    async fn transfer(
        &self,
        user_external_id: &str,
        asset: &str,
        amount: Cents,
        spend_id: &str,
    ) -> PaymentResult<()> {
        let req = TransferRequest {
            user_id: user_external_id.to_string(),
            asset: asset.to_string(),
            amount: amount.to_decimal_string(),
            spend_id: spend_id.to_string(),
        };
        let _: serde_json::Value = self.post("transfer", &req).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_token() {
        assert!(matches!(
            CryptoPayClient::new(""),
            Err(PaymentError::Unauthenticated)
        ));
    }

    #[test]
    fn strips_trailing_slash_from_base_url() {
        let client = CryptoPayClient::with_base_url("tok", "https://example.test/").unwrap();
        assert_eq!(client.base_url, "https://example.test");
    }
}
