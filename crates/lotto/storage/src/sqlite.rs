//! SQLite adapter for lotto storage.
//!
//! This adapter is the durable source of truth for the prediction
//! ledger. Tickets, metadata, and per-ticket match counts are stored as
//! JSON text columns; the UNIQUE constraint on
//! `lotto_results.prediction_id` plus the resolve transaction is what
//! makes double evaluation impossible rather than merely unlikely.

use crate::model::{OutcomeAppend, PredictionAppend, WeightAppend};
use crate::traits::{PredictionStore, WeightStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use lotto_types::{
    EvaluationOutcome, Prediction, PredictionId, Ticket, WeightMixture, WeightSnapshot,
    WeightState,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::Path;

/// SQLite-backed storage adapter.
#[derive(Clone)]
pub struct SqliteLottoStorage {
    pool: SqlitePool,
}

impl SqliteLottoStorage {
    /// Open (creating if missing) a database file and initialize the
    /// schema.
    pub async fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to open sqlite: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS lotto_predictions (
                prediction_id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                target_draw_date TEXT NOT NULL,
                strategy_name TEXT NOT NULL,
                model_version TEXT NOT NULL,
                portfolio_size INTEGER NOT NULL,
                tickets TEXT NOT NULL,
                metadata TEXT NOT NULL,
                resolved INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS lotto_results (
                result_id INTEGER PRIMARY KEY AUTOINCREMENT,
                prediction_id INTEGER NOT NULL UNIQUE
                    REFERENCES lotto_predictions(prediction_id),
                actual_numbers TEXT NOT NULL,
                evaluated_at TEXT NOT NULL,
                best_match INTEGER NOT NULL,
                total_matches INTEGER NOT NULL,
                prize_value INTEGER NOT NULL,
                ticket_matches TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS lotto_weights (
                weight_id INTEGER PRIMARY KEY AUTOINCREMENT,
                updated_at TEXT NOT NULL,
                strategy_name TEXT NOT NULL,
                weight_type TEXT NOT NULL,
                weight_value REAL NOT NULL,
                performance_score REAL NOT NULL,
                n_observations INTEGER NOT NULL DEFAULT 0
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl PredictionStore for SqliteLottoStorage {
    async fn create_prediction(&self, append: PredictionAppend) -> StorageResult<Prediction> {
        let tickets_json = to_json(&append.tickets)?;
        let metadata_json = to_json(&append.metadata)?;

        let result = sqlx::query(
            r#"
            INSERT INTO lotto_predictions
                (created_at, target_draw_date, strategy_name, model_version,
                 portfolio_size, tickets, metadata, resolved)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(append.created_at)
        .bind(append.target_draw_date)
        .bind(&append.strategy_name)
        .bind(&append.model_version)
        .bind(append.tickets.len() as i64)
        .bind(tickets_json)
        .bind(metadata_json)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(Prediction {
            id: PredictionId(result.last_insert_rowid()),
            created_at: append.created_at,
            target_draw_date: append.target_draw_date,
            strategy_name: append.strategy_name,
            model_version: append.model_version,
            tickets: append.tickets,
            metadata: append.metadata,
            resolved: false,
        })
    }

    async fn get_prediction(&self, id: PredictionId) -> StorageResult<Option<Prediction>> {
        let row = sqlx::query(
            r#"
            SELECT prediction_id, created_at, target_draw_date, strategy_name,
                   model_version, tickets, metadata, resolved
              FROM lotto_predictions
             WHERE prediction_id = ?
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(prediction_row_to_record).transpose()
    }

    async fn list_unresolved(&self) -> StorageResult<Vec<Prediction>> {
        let rows = sqlx::query(
            r#"
            SELECT prediction_id, created_at, target_draw_date, strategy_name,
                   model_version, tickets, metadata, resolved
              FROM lotto_predictions
             WHERE resolved = 0
             ORDER BY target_draw_date ASC, prediction_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(prediction_row_to_record).collect()
    }

    async fn resolve_prediction(
        &self,
        id: PredictionId,
        outcome: OutcomeAppend,
    ) -> StorageResult<EvaluationOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let row = sqlx::query(
            "SELECT portfolio_size, resolved FROM lotto_predictions WHERE prediction_id = ?",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| StorageError::NotFound(format!("prediction {} not found", id)))?;

        let portfolio_size: i64 = row.get("portfolio_size");
        let resolved: bool = row.get("resolved");
        if resolved {
            return Err(StorageError::Conflict(format!(
                "prediction {} is already resolved",
                id
            )));
        }
        if outcome.ticket_matches.len() as i64 != portfolio_size {
            return Err(StorageError::InvalidInput(format!(
                "outcome has {} match counts for a portfolio of {}",
                outcome.ticket_matches.len(),
                portfolio_size
            )));
        }

        let actual_json = to_json(&outcome.actual_numbers)?;
        let matches_json = to_json(&outcome.ticket_matches)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO lotto_results
                (prediction_id, actual_numbers, evaluated_at, best_match,
                 total_matches, prize_value, ticket_matches)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.0)
        .bind(actual_json)
        .bind(outcome.evaluated_at)
        .bind(outcome.best_match as i64)
        .bind(outcome.total_matches as i64)
        .bind(outcome.prize_value as i64)
        .bind(matches_json)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_conflict)?;

        let flipped = sqlx::query(
            "UPDATE lotto_predictions SET resolved = 1 WHERE prediction_id = ? AND resolved = 0",
        )
        .bind(id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        if flipped.rows_affected() == 0 {
            return Err(StorageError::Conflict(format!(
                "prediction {} was resolved concurrently",
                id
            )));
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(EvaluationOutcome {
            result_id: inserted.last_insert_rowid(),
            prediction_id: id,
            actual_numbers: outcome.actual_numbers,
            evaluated_at: outcome.evaluated_at,
            ticket_matches: outcome.ticket_matches,
            best_match: outcome.best_match,
            total_matches: outcome.total_matches,
            prize_value: outcome.prize_value,
        })
    }

    async fn list_outcomes(
        &self,
        strategy_name: &str,
        limit: usize,
    ) -> StorageResult<Vec<EvaluationOutcome>> {
        let base = r#"
            SELECT r.result_id, r.prediction_id, r.actual_numbers, r.evaluated_at,
                   r.best_match, r.total_matches, r.prize_value, r.ticket_matches
              FROM lotto_results r
              JOIN lotto_predictions p ON p.prediction_id = r.prediction_id
             WHERE p.strategy_name = ?
             ORDER BY r.evaluated_at DESC, r.result_id DESC
        "#;

        let rows = if limit == 0 {
            sqlx::query(base)
                .bind(strategy_name)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            let with_limit = format!("{base} LIMIT ?");
            sqlx::query(&with_limit)
                .bind(strategy_name)
                .bind(to_i64(limit)?)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        rows.into_iter().map(outcome_row_to_record).collect()
    }
}

#[async_trait]
impl WeightStore for SqliteLottoStorage {
    async fn append_weights(&self, append: WeightAppend) -> StorageResult<Vec<WeightSnapshot>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut stored = Vec::with_capacity(append.entries.len());
        for (weight_name, value) in &append.entries {
            let result = sqlx::query(
                r#"
                INSERT INTO lotto_weights
                    (updated_at, strategy_name, weight_type, weight_value,
                     performance_score, n_observations)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(append.updated_at)
            .bind(&append.strategy_name)
            .bind(weight_name)
            .bind(value)
            .bind(append.performance_score)
            .bind(append.n_observations as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

            stored.push(WeightSnapshot {
                sequence: result.last_insert_rowid() as u64,
                updated_at: append.updated_at,
                strategy_name: append.strategy_name.clone(),
                weight_name: weight_name.clone(),
                value: *value,
                performance_score: append.performance_score,
                n_observations: append.n_observations,
            });
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(stored)
    }

    async fn current_weights(
        &self,
        strategy_name: &str,
    ) -> StorageResult<BTreeMap<String, WeightState>> {
        let rows = sqlx::query(
            r#"
            SELECT weight_type, weight_value, performance_score, n_observations
              FROM lotto_weights
             WHERE strategy_name = ?
             ORDER BY weight_id DESC
            "#,
        )
        .bind(strategy_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut current = BTreeMap::new();
        for row in rows {
            let name: String = row.get("weight_type");
            // Rows come newest-first; keep the first value seen per name.
            current.entry(name).or_insert(WeightState {
                value: row.get("weight_value"),
                performance_score: row.get("performance_score"),
                n_observations: row.get::<i64, _>("n_observations") as u32,
            });
        }
        Ok(current)
    }

    async fn weight_history(&self, strategy_name: &str) -> StorageResult<Vec<WeightSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT weight_id, updated_at, strategy_name, weight_type,
                   weight_value, performance_score, n_observations
              FROM lotto_weights
             WHERE strategy_name = ?
             ORDER BY weight_id ASC
            "#,
        )
        .bind(strategy_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| WeightSnapshot {
                sequence: row.get::<i64, _>("weight_id") as u64,
                updated_at: row.get("updated_at"),
                strategy_name: row.get("strategy_name"),
                weight_name: row.get("weight_type"),
                value: row.get("weight_value"),
                performance_score: row.get("performance_score"),
                n_observations: row.get::<i64, _>("n_observations") as u32,
            })
            .collect())
    }
}

fn prediction_row_to_record(row: SqliteRow) -> StorageResult<Prediction> {
    let tickets: Vec<Ticket> = from_json(row.get("tickets"))?;
    let metadata: WeightMixture = from_json(row.get("metadata"))?;
    Ok(Prediction {
        id: PredictionId(row.get::<i64, _>("prediction_id")),
        created_at: row.get("created_at"),
        target_draw_date: row.get("target_draw_date"),
        strategy_name: row.get("strategy_name"),
        model_version: row.get("model_version"),
        tickets,
        metadata,
        resolved: row.get("resolved"),
    })
}

fn outcome_row_to_record(row: SqliteRow) -> StorageResult<EvaluationOutcome> {
    let actual_numbers: Ticket = from_json(row.get("actual_numbers"))?;
    let ticket_matches: Vec<u8> = from_json(row.get("ticket_matches"))?;
    Ok(EvaluationOutcome {
        result_id: row.get::<i64, _>("result_id"),
        prediction_id: PredictionId(row.get::<i64, _>("prediction_id")),
        actual_numbers,
        evaluated_at: row.get("evaluated_at"),
        ticket_matches,
        best_match: row.get::<i64, _>("best_match") as u8,
        total_matches: row.get::<i64, _>("total_matches") as u32,
        prize_value: row.get::<i64, _>("prize_value") as u64,
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: String) -> StorageResult<T> {
    serde_json::from_str(&raw).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}

fn to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value).map_err(|_| StorageError::InvalidInput("limit too large".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn memory_store() -> SqliteLottoStorage {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteLottoStorage::from_pool(pool).await.unwrap()
    }

    fn sample_append() -> PredictionAppend {
        PredictionAppend {
            created_at: Utc::now(),
            target_draw_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 6).unwrap(),
            strategy_name: "hybrid_v1".to_string(),
            model_version: "1.0".to_string(),
            tickets: vec![
                Ticket::new([1, 2, 3, 4, 5, 6, 7]).unwrap(),
                Ticket::new([10, 20, 30, 40, 41, 42, 43]).unwrap(),
            ],
            metadata: WeightMixture::from([("frequency_ratio".to_string(), 0.7)]),
        }
    }

    #[tokio::test]
    async fn round_trips_a_prediction() {
        let storage = memory_store().await;
        let created = storage.create_prediction(sample_append()).await.unwrap();

        let fetched = storage.get_prediction(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.tickets, created.tickets);
        assert_eq!(fetched.metadata, created.metadata);
        assert!(!fetched.resolved);
    }

    #[tokio::test]
    async fn unique_constraint_rejects_second_result() {
        let storage = memory_store().await;
        let created = storage.create_prediction(sample_append()).await.unwrap();

        let outcome = OutcomeAppend {
            actual_numbers: Ticket::new([1, 2, 3, 8, 9, 10, 11]).unwrap(),
            evaluated_at: Utc::now(),
            ticket_matches: vec![3, 0],
            best_match: 3,
            total_matches: 3,
            prize_value: 20,
        };
        storage
            .resolve_prediction(created.id, outcome.clone())
            .await
            .unwrap();
        let second = storage.resolve_prediction(created.id, outcome).await;
        assert!(matches!(second, Err(StorageError::Conflict(_))));

        let fetched = storage.get_prediction(created.id).await.unwrap().unwrap();
        assert!(fetched.resolved);
    }

    #[tokio::test]
    async fn outcomes_join_parent_strategy() {
        let storage = memory_store().await;
        let created = storage.create_prediction(sample_append()).await.unwrap();
        storage
            .resolve_prediction(
                created.id,
                OutcomeAppend {
                    actual_numbers: Ticket::new([1, 2, 3, 8, 9, 10, 11]).unwrap(),
                    evaluated_at: Utc::now(),
                    ticket_matches: vec![3, 0],
                    best_match: 3,
                    total_matches: 3,
                    prize_value: 20,
                },
            )
            .await
            .unwrap();

        assert_eq!(storage.list_outcomes("hybrid_v1", 0).await.unwrap().len(), 1);
        assert!(storage.list_outcomes("other", 0).await.unwrap().is_empty());
    }
}
