//! Upsert-and-prune synchronization.

use crate::error::CatalogResult;
use crate::source::CatalogSource;
use std::collections::HashSet;
use wager_storage::{DeleteOutcome, Storage};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub upserted: usize,
    pub deleted: usize,
    pub skipped_non_terminal: usize,
}

/// Upserts every row from `source`, then deletes stored fights whose
/// `external_id` was absent from this tick — unless they still have a
/// non-terminal deal, or the fetch came back empty. An empty fetch never
/// triggers deletions: a source that returns nothing is far more likely
/// to be down than genuinely empty, and pruning on that signal would
/// wipe the catalog.
pub async fn sync_once(storage: &(dyn Storage), source: &(dyn CatalogSource)) -> CatalogResult<SyncReport> {
    let rows = source.fetch().await?;
    let mut report = SyncReport::default();

    if rows.is_empty() {
        tracing::warn!("catalog source returned no rows; skipping prune pass");
        return Ok(report);
    }

    let mut touched: HashSet<String> = HashSet::with_capacity(rows.len());
    for row in rows {
        if let Some(external_id) = row.external_id.clone() {
            touched.insert(external_id);
        }
        storage.upsert_fight(row).await?;
        report.upserted += 1;
    }

    let stored_ids = storage.list_all_external_ids().await?;
    for external_id in stored_ids {
        if touched.contains(&external_id) {
            continue;
        }
        let Some(fight) = storage.get_fight_by_external_id(&external_id).await? else {
            continue;
        };
        match storage.delete_fight_if_terminal(fight.id).await? {
            DeleteOutcome::Deleted => report.deleted += 1,
            DeleteOutcome::SkippedNonTerminalDeals => report.skipped_non_terminal += 1,
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticCatalogSource;
    use wager_storage::{DealStorage, FightStorage, InMemoryStorage, UserStorage};
    use wager_types::{FightUpsert, Side};

    fn upsert(external_id: &str) -> FightUpsert {
        FightUpsert {
            external_id: Some(external_id.to_string()),
            title: "Alpha vs Bravo".into(),
            participant1_name: "Alpha".into(),
            participant2_name: "Bravo".into(),
            image_url: None,
            description: None,
            starts_at: None,
            status: wager_types::FightStatus::Upcoming,
            winner_side: None,
        }
    }

    #[tokio::test]
    async fn prunes_fights_absent_from_latest_fetch() {
        let storage = InMemoryStorage::new();
        let first = StaticCatalogSource::new(vec![upsert("a"), upsert("b")]);
        sync_once(&storage, &first).await.unwrap();
        assert_eq!(storage.list_fights().await.unwrap().len(), 2);

        let second = StaticCatalogSource::new(vec![upsert("a")]);
        let report = sync_once(&storage, &second).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(storage.list_fights().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn never_prunes_on_empty_fetch() {
        let storage = InMemoryStorage::new();
        let first = StaticCatalogSource::new(vec![upsert("a")]);
        sync_once(&storage, &first).await.unwrap();

        let empty = StaticCatalogSource::new(vec![]);
        let report = sync_once(&storage, &empty).await.unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(storage.list_fights().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn skips_deletion_when_deal_is_active() {
        let storage = InMemoryStorage::new();
        let first = StaticCatalogSource::new(vec![upsert("a")]);
        sync_once(&storage, &first).await.unwrap();
        let fight = storage.get_fight_by_external_id("a").await.unwrap().unwrap();

        let user = storage.get_or_create_user("tg:1", None).await.unwrap();
        storage
            .apply_paid_new(fight.id, Side::One, wager_types::Cents(100), user.id, 1)
            .await
            .unwrap();

        let second = StaticCatalogSource::new(vec![upsert("b")]);
        let report = sync_once(&storage, &second).await.unwrap();
        assert_eq!(report.skipped_non_terminal, 1);
        assert!(storage.get_fight(fight.id).await.unwrap().is_some());
    }
}
