//! Background sync loop: ticks on an interval, plus an explicit trigger
//! channel for "sync now" requests from the presentation layer.

use crate::source::CatalogSource;
use crate::sync::sync_once;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use wager_storage::Storage;

pub struct CatalogSyncLoop {
    storage: Arc<dyn Storage>,
    source: Arc<dyn CatalogSource>,
    interval: Duration,
    trigger_tx: mpsc::Sender<()>,
}

impl CatalogSyncLoop {
    pub fn new(storage: Arc<dyn Storage>, source: Arc<dyn CatalogSource>, interval: Duration) -> (Self, mpsc::Receiver<()>) {
        let (trigger_tx, trigger_rx) = mpsc::channel(4);
        (
            Self {
                storage,
                source,
                interval,
                trigger_tx,
            },
            trigger_rx,
        )
    }

    pub fn trigger(&self) -> mpsc::Sender<()> {
        self.trigger_tx.clone()
    }

    pub async fn run(self, mut trigger_rx: mpsc::Receiver<()>) {
        let mut ticker = interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                Some(()) = trigger_rx.recv() => self.tick().await,
                else => break,
            }
        }
    }

    async fn tick(&self) {
        match sync_once(self.storage.as_ref(), self.source.as_ref()).await {
            Ok(report) => {
                if report.upserted > 0 || report.deleted > 0 {
                    tracing::info!(
                        upserted = report.upserted,
                        deleted = report.deleted,
                        skipped_non_terminal = report.skipped_non_terminal,
                        "catalog sync tick complete"
                    );
                }
            }
            Err(e) => tracing::error!(error = %e, "catalog sync tick failed"),
        }
    }
}
