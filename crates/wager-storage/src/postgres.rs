//! PostgreSQL storage implementation.
//!
//! Composite operations that must be atomic run inside a single
//! transaction and use `FOR UPDATE` / `FOR UPDATE ... SKIP LOCKED` to
//! serialize concurrent payers against the same row without blocking
//! unrelated ones.

use crate::error::{StorageError, StorageResult};
use crate::traits::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use wager_types::*;

#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let storage = Self { pool };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    async fn initialize_schema(&self) -> StorageResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                external_id TEXT NOT NULL UNIQUE,
                username TEXT,
                created_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS fights (
                id BIGSERIAL PRIMARY KEY,
                external_id TEXT UNIQUE,
                title TEXT NOT NULL,
                participant1_name TEXT NOT NULL,
                participant2_name TEXT NOT NULL,
                image_url TEXT,
                description TEXT,
                starts_at TIMESTAMPTZ,
                status TEXT NOT NULL,
                winner_side SMALLINT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS fights_starts_at ON fights(starts_at);"#,
            r#"
            CREATE TABLE IF NOT EXISTS deals (
                id BIGSERIAL PRIMARY KEY,
                fight_id BIGINT NOT NULL REFERENCES fights(id),
                user1 BIGINT NOT NULL,
                side1 SMALLINT NOT NULL,
                amount1 BIGINT NOT NULL,
                paid1 BOOLEAN NOT NULL,
                invoice1_id BIGINT NOT NULL,
                user2 BIGINT,
                side2 SMALLINT,
                amount2 BIGINT,
                paid2 BOOLEAN NOT NULL,
                invoice2_id BIGINT,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS deals_fight_id ON deals(fight_id);"#,
            r#"CREATE INDEX IF NOT EXISTS deals_open_candidates ON deals(fight_id, side1, amount1) WHERE status = 'awaiting_match' AND user2 IS NULL;"#,
            r#"
            CREATE TABLE IF NOT EXISTS invoice_waits (
                invoice_id BIGINT PRIMARY KEY,
                payload JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS stranded_refunds (
                invoice_id BIGINT PRIMARY KEY,
                payer_user_tag TEXT NOT NULL,
                amount_cents BIGINT NOT NULL,
                reason TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                resolved_at TIMESTAMPTZ
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS deal_transitions (
                id BIGSERIAL PRIMARY KEY,
                deal_id BIGINT NOT NULL,
                from_status TEXT,
                to_status TEXT NOT NULL,
                reason TEXT NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS deal_transitions_deal_id ON deal_transitions(deal_id);"#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        Ok(())
    }

    fn fight_from_row(row: &sqlx::postgres::PgRow) -> StorageResult<Fight> {
        let status_str: String = row.try_get("status")?;
        let status = FightStatus::parse(&status_str)
            .ok_or_else(|| StorageError::InvalidData(format!("unknown fight status {status_str}")))?;
        let winner_side: Option<i16> = row.try_get("winner_side")?;
        Ok(Fight {
            id: FightId::new(row.try_get::<i64, _>("id")?),
            external_id: row.try_get("external_id")?,
            title: row.try_get("title")?,
            participant1_name: row.try_get("participant1_name")?,
            participant2_name: row.try_get("participant2_name")?,
            image_url: row.try_get("image_url")?,
            description: row.try_get("description")?,
            starts_at: row.try_get("starts_at")?,
            status,
            winner_side: winner_side.and_then(Side::from_i16),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn deal_from_row(row: &sqlx::postgres::PgRow) -> StorageResult<Deal> {
        let status_str: String = row.try_get("status")?;
        let status = DealStatus::parse(&status_str)
            .ok_or_else(|| StorageError::InvalidData(format!("unknown deal status {status_str}")))?;
        let side1: i16 = row.try_get("side1")?;
        let side2: Option<i16> = row.try_get("side2")?;
        let user2: Option<i64> = row.try_get("user2")?;
        let amount2: Option<i64> = row.try_get("amount2")?;
        Ok(Deal {
            id: DealId::new(row.try_get::<i64, _>("id")?),
            fight_id: FightId::new(row.try_get::<i64, _>("fight_id")?),
            user1: UserId::new(row.try_get::<i64, _>("user1")?),
            side1: Side::from_i16(side1)
                .ok_or_else(|| StorageError::InvalidData("invalid side1".into()))?,
            amount1: Cents(row.try_get::<i64, _>("amount1")?),
            paid1: row.try_get("paid1")?,
            invoice1_id: row.try_get("invoice1_id")?,
            user2: user2.map(UserId::new),
            side2: side2.and_then(Side::from_i16),
            amount2: amount2.map(Cents),
            paid2: row.try_get("paid2")?,
            invoice2_id: row.try_get("invoice2_id")?,
            status,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn user_from_row(row: &sqlx::postgres::PgRow) -> StorageResult<User> {
        Ok(User {
            id: UserId::new(row.try_get::<i64, _>("id")?),
            external_id: row.try_get("external_id")?,
            username: row.try_get("username")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn record_transition_tx(
        tx: &mut Transaction<'_, Postgres>,
        deal_id: DealId,
        from_status: Option<DealStatus>,
        to_status: DealStatus,
        reason: &str,
    ) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO deal_transitions (deal_id, from_status, to_status, reason, occurred_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(deal_id.as_i64())
        .bind(from_status.map(|s| s.as_str()))
        .bind(to_status.as_str())
        .bind(reason)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl UserStorage for PostgresStorage {
    async fn get_or_create_user(
        &self,
        external_id: &str,
        username: Option<&str>,
    ) -> StorageResult<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (external_id, username, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (external_id) DO UPDATE SET external_id = EXCLUDED.external_id
            RETURNING id, external_id, username, created_at
            "#,
        )
        .bind(external_id)
        .bind(username)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        Self::user_from_row(&row)
    }

    async fn get_user(&self, id: UserId) -> StorageResult<Option<User>> {
        let row = sqlx::query("SELECT id, external_id, username, created_at FROM users WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        row.as_ref().map(Self::user_from_row).transpose()
    }
}

#[async_trait]
impl FightStorage for PostgresStorage {
    async fn get_fight(&self, id: FightId) -> StorageResult<Option<Fight>> {
        let row = sqlx::query("SELECT * FROM fights WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        row.as_ref().map(Self::fight_from_row).transpose()
    }

    async fn get_fight_by_external_id(&self, external_id: &str) -> StorageResult<Option<Fight>> {
        let row = sqlx::query("SELECT * FROM fights WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        row.as_ref().map(Self::fight_from_row).transpose()
    }

    async fn find_fight_by_names(
        &self,
        title: &str,
        participant1_name: &str,
        participant2_name: &str,
    ) -> StorageResult<Option<Fight>> {
        let row = sqlx::query(
            "SELECT * FROM fights WHERE title = $1 AND participant1_name = $2 AND participant2_name = $3",
        )
        .bind(title)
        .bind(participant1_name)
        .bind(participant2_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        row.as_ref().map(Self::fight_from_row).transpose()
    }

    async fn list_fights(&self) -> StorageResult<Vec<Fight>> {
        let rows = sqlx::query("SELECT * FROM fights ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        rows.iter().map(Self::fight_from_row).collect()
    }

    async fn list_upcoming_fights(&self) -> StorageResult<Vec<Fight>> {
        let rows = sqlx::query(
            "SELECT * FROM fights WHERE status IN ('upcoming', 'today') ORDER BY starts_at ASC NULLS LAST",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        rows.iter().map(Self::fight_from_row).collect()
    }

    async fn upsert_fight(&self, upsert: FightUpsert) -> StorageResult<Fight> {
        let now = Utc::now();
        let winner_side = upsert.winner_side.map(Side::as_i16);

        if let Some(external_id) = &upsert.external_id {
            let row = sqlx::query(
                r#"
                INSERT INTO fights (
                    external_id, title, participant1_name, participant2_name,
                    image_url, description, starts_at, status, winner_side,
                    created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
                ON CONFLICT (external_id) DO UPDATE SET
                    title = EXCLUDED.title,
                    participant1_name = EXCLUDED.participant1_name,
                    participant2_name = EXCLUDED.participant2_name,
                    image_url = EXCLUDED.image_url,
                    description = EXCLUDED.description,
                    starts_at = EXCLUDED.starts_at,
                    status = EXCLUDED.status,
                    winner_side = EXCLUDED.winner_side,
                    updated_at = EXCLUDED.updated_at
                RETURNING *
                "#,
            )
            .bind(external_id)
            .bind(&upsert.title)
            .bind(&upsert.participant1_name)
            .bind(&upsert.participant2_name)
            .bind(&upsert.image_url)
            .bind(&upsert.description)
            .bind(upsert.starts_at)
            .bind(upsert.status.as_str())
            .bind(winner_side)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
            return Self::fight_from_row(&row);
        }

        let existing = self
            .find_fight_by_names(&upsert.title, &upsert.participant1_name, &upsert.participant2_name)
            .await?;
        if let Some(existing) = existing {
            let row = sqlx::query(
                r#"
                UPDATE fights SET
                    image_url = $1, description = $2, starts_at = $3,
                    status = $4, winner_side = $5, updated_at = $6
                WHERE id = $7
                RETURNING *
                "#,
            )
            .bind(&upsert.image_url)
            .bind(&upsert.description)
            .bind(upsert.starts_at)
            .bind(upsert.status.as_str())
            .bind(winner_side)
            .bind(now)
            .bind(existing.id.as_i64())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
            return Self::fight_from_row(&row);
        }

        let row = sqlx::query(
            r#"
            INSERT INTO fights (
                external_id, title, participant1_name, participant2_name,
                image_url, description, starts_at, status, winner_side,
                created_at, updated_at
            )
            VALUES (NULL, $1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *
            "#,
        )
        .bind(&upsert.title)
        .bind(&upsert.participant1_name)
        .bind(&upsert.participant2_name)
        .bind(&upsert.image_url)
        .bind(&upsert.description)
        .bind(upsert.starts_at)
        .bind(upsert.status.as_str())
        .bind(winner_side)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        Self::fight_from_row(&row)
    }

    async fn list_all_external_ids(&self) -> StorageResult<Vec<String>> {
        let rows = sqlx::query("SELECT external_id FROM fights WHERE external_id IS NOT NULL")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        rows.into_iter()
            .map(|row| row.try_get::<String, _>("external_id").map_err(StorageError::from))
            .collect()
    }

    async fn delete_fight_if_terminal(&self, id: FightId) -> StorageResult<DeleteOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| StorageError::Query(e.to_string()))?;

        let blocking = sqlx::query(
            "SELECT id FROM deals WHERE fight_id = $1 AND status NOT IN ('settled', 'void') FOR UPDATE",
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        if blocking.is_some() {
            tx.rollback().await.map_err(|e| StorageError::Query(e.to_string()))?;
            return Ok(DeleteOutcome::SkippedNonTerminalDeals);
        }

        sqlx::query("DELETE FROM fights WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        tx.commit().await.map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(DeleteOutcome::Deleted)
    }

    async fn list_fights_awaiting_result(
        &self,
        started_before: DateTime<Utc>,
        limit: i64,
    ) -> StorageResult<Vec<Fight>> {
        let rows = sqlx::query(
            "SELECT * FROM fights WHERE status <> 'canceled' AND winner_side IS NULL \
             AND starts_at IS NOT NULL AND starts_at <= $1 ORDER BY starts_at ASC LIMIT $2",
        )
        .bind(started_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        rows.iter().map(Self::fight_from_row).collect()
    }
}

#[async_trait]
impl DealStorage for PostgresStorage {
    async fn get_deal(&self, id: DealId) -> StorageResult<Option<Deal>> {
        let row = sqlx::query("SELECT * FROM deals WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        row.as_ref().map(Self::deal_from_row).transpose()
    }

    async fn list_open_for(&self, fight_id: FightId, excluding_user: UserId) -> StorageResult<Vec<Deal>> {
        let rows = sqlx::query(
            "SELECT * FROM deals WHERE fight_id = $1 AND status = 'awaiting_match' \
             AND paid1 = true AND user2 IS NULL AND user1 <> $2 ORDER BY id ASC",
        )
        .bind(fight_id.as_i64())
        .bind(excluding_user.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        rows.iter().map(Self::deal_from_row).collect()
    }

    async fn list_my_active_deals(&self, user: UserId) -> StorageResult<Vec<Deal>> {
        let rows = sqlx::query(
            "SELECT * FROM deals WHERE (user1 = $1 OR user2 = $1) \
             AND status IN ('awaiting_match', 'matched') ORDER BY id ASC",
        )
        .bind(user.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        rows.iter().map(Self::deal_from_row).collect()
    }

    async fn list_my_shareable_deals(&self, user: UserId) -> StorageResult<Vec<Deal>> {
        let rows = sqlx::query(
            "SELECT * FROM deals WHERE user1 = $1 AND status = 'awaiting_match' \
             AND paid1 = true AND user2 IS NULL ORDER BY id ASC",
        )
        .bind(user.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        rows.iter().map(Self::deal_from_row).collect()
    }

    async fn apply_paid_new(
        &self,
        fight_id: FightId,
        side: Side,
        amount: Cents,
        payer: UserId,
        invoice_id: i64,
    ) -> StorageResult<MatchOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| StorageError::Query(e.to_string()))?;

        // Same invoice already applied: replaying it must not open or pair
        // a second deal leg.
        if let Some(row) = sqlx::query("SELECT * FROM deals WHERE invoice1_id = $1 OR invoice2_id = $1")
            .bind(invoice_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?
        {
            let existing = Self::deal_from_row(&row)?;
            tx.rollback().await.map_err(|e| StorageError::Query(e.to_string()))?;
            return Ok(if existing.status == DealStatus::Matched {
                MatchOutcome::Paired(existing.id)
            } else {
                MatchOutcome::CreatedAwaiting(existing.id)
            });
        }

        let candidate = sqlx::query(
            "SELECT * FROM deals WHERE fight_id = $1 AND status = 'awaiting_match' \
             AND paid1 = true AND user2 IS NULL AND side1 = $2 AND amount1 = $3 AND user1 <> $4 \
             ORDER BY id ASC FOR UPDATE SKIP LOCKED LIMIT 1",
        )
        .bind(fight_id.as_i64())
        .bind(side.opposite().as_i16())
        .bind(amount.0)
        .bind(payer.as_i64())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        if let Some(row) = candidate {
            let deal_id = DealId::new(row.try_get::<i64, _>("id")?);
            sqlx::query(
                "UPDATE deals SET user2 = $1, side2 = $2, amount2 = $3, paid2 = true, \
                 invoice2_id = $4, status = 'matched', updated_at = $5 WHERE id = $6",
            )
            .bind(payer.as_i64())
            .bind(side.as_i16())
            .bind(amount.0)
            .bind(invoice_id)
            .bind(Utc::now())
            .bind(deal_id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
            Self::record_transition_tx(
                &mut tx,
                deal_id,
                Some(DealStatus::AwaitingMatch),
                DealStatus::Matched,
                "pair-on-pay",
            )
            .await?;
            tx.commit().await.map_err(|e| StorageError::Query(e.to_string()))?;
            return Ok(MatchOutcome::Paired(deal_id));
        }

        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO deals (
                fight_id, user1, side1, amount1, paid1, invoice1_id,
                user2, side2, amount2, paid2, invoice2_id,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, true, $5, NULL, NULL, NULL, false, NULL, 'awaiting_match', $6, $6)
            RETURNING id
            "#,
        )
        .bind(fight_id.as_i64())
        .bind(payer.as_i64())
        .bind(side.as_i16())
        .bind(amount.0)
        .bind(invoice_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        let deal_id = DealId::new(row.try_get::<i64, _>("id")?);
        Self::record_transition_tx(&mut tx, deal_id, None, DealStatus::AwaitingMatch, "new intent paid").await?;
        tx.commit().await.map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(MatchOutcome::CreatedAwaiting(deal_id))
    }

    async fn apply_paid_match(
        &self,
        deal_id: DealId,
        side: Side,
        amount: Cents,
        payer: UserId,
        invoice_id: i64,
    ) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await.map_err(|e| StorageError::Query(e.to_string()))?;

        let row = sqlx::query("SELECT * FROM deals WHERE id = $1 FOR UPDATE")
            .bind(deal_id.as_i64())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        let Some(row) = row else {
            tx.rollback().await.map_err(|e| StorageError::Query(e.to_string()))?;
            return Ok(false);
        };
        let deal = Self::deal_from_row(&row)?;
        if deal.invoice2_id == Some(invoice_id) {
            tx.rollback().await.map_err(|e| StorageError::Query(e.to_string()))?;
            return Ok(true);
        }
        if !deal.is_open_for_matching() || deal.user1 == payer || deal.amount1 != amount {
            tx.rollback().await.map_err(|e| StorageError::Query(e.to_string()))?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE deals SET user2 = $1, side2 = $2, amount2 = $3, paid2 = true, \
             invoice2_id = $4, status = 'matched', updated_at = $5 WHERE id = $6",
        )
        .bind(payer.as_i64())
        .bind(side.as_i16())
        .bind(amount.0)
        .bind(invoice_id)
        .bind(Utc::now())
        .bind(deal_id.as_i64())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        Self::record_transition_tx(
            &mut tx,
            deal_id,
            Some(DealStatus::AwaitingMatch),
            DealStatus::Matched,
            "match intent paid",
        )
        .await?;
        tx.commit().await.map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(true)
    }

    async fn claim_payout_batch(&self, limit: i64) -> StorageResult<Vec<PayoutCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT d.*, f.winner_side AS fight_winner_side
            FROM deals d
            JOIN fights f ON f.id = d.fight_id
            WHERE d.status = 'matched' AND f.status = 'done' AND f.winner_side IS NOT NULL
            ORDER BY d.id ASC
            LIMIT $1
            FOR UPDATE OF d SKIP LOCKED
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let deal = Self::deal_from_row(row)?;
                let winner_side: i16 = row.try_get("fight_winner_side")?;
                let winner_side = Side::from_i16(winner_side)
                    .ok_or_else(|| StorageError::InvalidData("invalid fight winner_side".into()))?;
                Ok(PayoutCandidate { deal, winner_side })
            })
            .collect()
    }

    async fn mark_settled(&self, id: DealId) -> StorageResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| StorageError::Query(e.to_string()))?;
        sqlx::query("UPDATE deals SET status = 'settled', updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Self::record_transition_tx(&mut tx, id, Some(DealStatus::Matched), DealStatus::Settled, "payout issued")
            .await?;
        tx.commit().await.map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn claim_refund_batch(&self, limit: i64) -> StorageResult<Vec<Deal>> {
        let rows = sqlx::query(
            r#"
            SELECT d.*
            FROM deals d
            JOIN fights f ON f.id = d.fight_id
            WHERE d.status = 'awaiting_match' AND d.paid1 = true AND d.user2 IS NULL
              AND f.status = 'done'
            ORDER BY d.id ASC
            LIMIT $1
            FOR UPDATE OF d SKIP LOCKED
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        rows.iter().map(Self::deal_from_row).collect()
    }

    async fn mark_void(&self, id: DealId) -> StorageResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| StorageError::Query(e.to_string()))?;
        sqlx::query("UPDATE deals SET status = 'void', updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Self::record_transition_tx(&mut tx, id, Some(DealStatus::AwaitingMatch), DealStatus::Void, "orphan refund")
            .await?;
        tx.commit().await.map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl InvoiceWaitStorage for PostgresStorage {
    async fn insert_invoice_wait(&self, wait: InvoiceWait) -> StorageResult<()> {
        let payload: Value = serde_json::to_value(&wait.payload)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
        sqlx::query(
            "INSERT INTO invoice_waits (invoice_id, payload, created_at) VALUES ($1, $2, $3) \
             ON CONFLICT (invoice_id) DO NOTHING",
        )
        .bind(wait.invoice_id)
        .bind(payload)
        .bind(wait.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get_invoice_wait(&self, invoice_id: i64) -> StorageResult<Option<InvoiceWait>> {
        let row = sqlx::query("SELECT invoice_id, payload, created_at FROM invoice_waits WHERE invoice_id = $1")
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        match row {
            None => Ok(None),
            Some(row) => {
                let payload: Value = row.try_get("payload")?;
                let payload = serde_json::from_value(payload)
                    .map_err(|e| StorageError::InvalidData(e.to_string()))?;
                Ok(Some(InvoiceWait {
                    invoice_id: row.try_get("invoice_id")?,
                    payload,
                    created_at: row.try_get("created_at")?,
                }))
            }
        }
    }

    async fn delete_invoice_wait(&self, invoice_id: i64) -> StorageResult<Option<InvoiceWait>> {
        let existing = self.get_invoice_wait(invoice_id).await?;
        if existing.is_some() {
            sqlx::query("DELETE FROM invoice_waits WHERE invoice_id = $1")
                .bind(invoice_id)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }
        Ok(existing)
    }

    async fn list_invoice_waits(&self) -> StorageResult<Vec<InvoiceWait>> {
        let rows = sqlx::query("SELECT invoice_id, payload, created_at FROM invoice_waits ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        rows.into_iter()
            .map(|row| {
                let payload: Value = row.try_get("payload")?;
                let payload = serde_json::from_value(payload)
                    .map_err(|e| StorageError::InvalidData(e.to_string()))?;
                Ok(InvoiceWait {
                    invoice_id: row.try_get("invoice_id")?,
                    payload,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl StrandedRefundStorage for PostgresStorage {
    async fn queue_stranded_refund(&self, refund: StrandedRefund) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO stranded_refunds (invoice_id, payer_user_tag, amount_cents, reason, created_at, resolved_at) \
             VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (invoice_id) DO NOTHING",
        )
        .bind(refund.invoice_id)
        .bind(&refund.payer_user_tag)
        .bind(refund.amount_cents.0)
        .bind(&refund.reason)
        .bind(refund.created_at)
        .bind(refund.resolved_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn list_unresolved_stranded_refunds(&self, limit: i64) -> StorageResult<Vec<StrandedRefund>> {
        let rows = sqlx::query(
            "SELECT * FROM stranded_refunds WHERE resolved_at IS NULL ORDER BY created_at ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        rows.into_iter()
            .map(|row| {
                Ok(StrandedRefund {
                    invoice_id: row.try_get("invoice_id")?,
                    payer_user_tag: row.try_get("payer_user_tag")?,
                    amount_cents: Cents(row.try_get::<i64, _>("amount_cents")?),
                    reason: row.try_get("reason")?,
                    created_at: row.try_get("created_at")?,
                    resolved_at: row.try_get("resolved_at")?,
                })
            })
            .collect()
    }

    async fn mark_stranded_resolved(&self, invoice_id: i64) -> StorageResult<()> {
        sqlx::query("UPDATE stranded_refunds SET resolved_at = $1 WHERE invoice_id = $2")
            .bind(Utc::now())
            .bind(invoice_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl TransitionLogStorage for PostgresStorage {
    async fn record_transition(&self, transition: DealTransition) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO deal_transitions (deal_id, from_status, to_status, reason, occurred_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(transition.deal_id.as_i64())
        .bind(transition.from_status.map(|s| s.as_str()))
        .bind(transition.to_status.as_str())
        .bind(&transition.reason)
        .bind(transition.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn list_transitions_for_deal(&self, deal_id: DealId) -> StorageResult<Vec<DealTransition>> {
        let rows = sqlx::query(
            "SELECT deal_id, from_status, to_status, reason, occurred_at FROM deal_transitions \
             WHERE deal_id = $1 ORDER BY id ASC",
        )
        .bind(deal_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        rows.into_iter()
            .map(|row| {
                let from_status: Option<String> = row.try_get("from_status")?;
                let to_status: String = row.try_get("to_status")?;
                Ok(DealTransition {
                    deal_id: DealId::new(row.try_get::<i64, _>("deal_id")?),
                    from_status: from_status.and_then(|s| DealStatus::parse(&s)),
                    to_status: DealStatus::parse(&to_status)
                        .ok_or_else(|| StorageError::InvalidData(format!("unknown status {to_status}")))?,
                    reason: row.try_get("reason")?,
                    occurred_at: row.try_get("occurred_at")?,
                })
            })
            .collect()
    }
}
