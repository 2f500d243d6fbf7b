//! The catalog source abstraction. The spec names one concrete source (a
//! published spreadsheet exported as CSV); the trait exists so sync and
//! tests don't depend on reqwest reaching a real URL.

use crate::error::{CatalogError, CatalogResult};
use crate::row::CsvRow;
use async_trait::async_trait;
use wager_types::FightUpsert;

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self) -> CatalogResult<Vec<FightUpsert>>;
}

fn parse_csv(body: &str) -> CatalogResult<Vec<FightUpsert>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(body.as_bytes());
    let mut upserts = Vec::new();
    for record in reader.deserialize::<CsvRow>() {
        let row = record.map_err(|e| CatalogError::InvalidRow(e.to_string()))?;
        match row.into_upsert() {
            Ok(upsert) => upserts.push(upsert),
            Err(e) => tracing::warn!(error = %e, "skipping catalog row"),
        }
    }
    Ok(upserts)
}

/// Fetches a published spreadsheet's CSV export over HTTP.
pub struct SheetCatalogSource {
    client: reqwest::Client,
    csv_url: String,
}

impl SheetCatalogSource {
    pub fn new(csv_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            csv_url: csv_url.into(),
        }
    }
}

#[async_trait]
impl CatalogSource for SheetCatalogSource {
    async fn fetch(&self) -> CatalogResult<Vec<FightUpsert>> {
        let response = self
            .client
            .get(&self.csv_url)
            .send()
            .await
            .map_err(|e| CatalogError::Fetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CatalogError::Fetch(format!(
                "catalog source returned {}",
                response.status()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| CatalogError::Fetch(e.to_string()))?;
        parse_csv(&body)
    }
}

/// A fixed in-memory source, for tests and local runs without a
/// spreadsheet.
pub struct StaticCatalogSource {
    rows: Vec<FightUpsert>,
}

impl StaticCatalogSource {
    pub fn new(rows: Vec<FightUpsert>) -> Self {
        Self { rows }
    }

    pub fn from_csv(body: &str) -> CatalogResult<Self> {
        Ok(Self {
            rows: parse_csv(body)?,
        })
    }
}

#[async_trait]
impl CatalogSource for StaticCatalogSource {
    async fn fetch(&self) -> CatalogResult<Vec<FightUpsert>> {
        Ok(self.rows.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_parses_embedded_csv() {
        let csv = "external_id,title,side1_name,side2_name,image_url,starts_at,status,description,winner\n\
                    ext-1,,Alpha,Bravo,,,,,\n";
        let source = StaticCatalogSource::from_csv(csv).unwrap();
        let rows = source.fetch().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Alpha vs Bravo");
    }
}
