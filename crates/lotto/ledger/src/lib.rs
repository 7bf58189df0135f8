//! Prediction ledger - validated append/query surface over lotto storage.
//!
//! The ledger owns predictions, evaluation outcomes, and weight
//! snapshots exclusively; every other component of the feedback loop
//! reads and writes them through this facade. Writes are append-only:
//! a prediction is mutated exactly once (resolved flips to true when
//! its outcome lands) and nothing is ever deleted, so the full audit
//! trail of what was predicted, what happened, and how the weights
//! moved is preserved.

#![deny(unsafe_code)]

use chrono::{DateTime, NaiveDate, Utc};
use lotto_storage::memory::InMemoryLottoStorage;
use lotto_storage::{LottoStorage, PredictionAppend, StorageError, WeightAppend};
use lotto_types::{
    EvaluationOutcome, Prediction, PredictionId, Ticket, WeightMixture, WeightSnapshot,
    WeightState,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub use lotto_storage::OutcomeAppend as OutcomeDraft;

/// Tolerance for the "mixture sums to 1.0" invariant.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// The prediction ledger facade.
#[derive(Clone)]
pub struct PredictionLedger {
    storage: Arc<dyn LottoStorage>,
}

impl PredictionLedger {
    /// Ledger backed by in-memory storage.
    pub fn new_in_memory() -> Self {
        Self {
            storage: Arc::new(InMemoryLottoStorage::new()),
        }
    }

    /// Ledger backed by an explicit storage adapter.
    pub fn with_storage(storage: Arc<dyn LottoStorage>) -> Self {
        Self { storage }
    }

    /// Record a new prediction for a future draw.
    ///
    /// Ticket-level invariants (7 distinct numbers in range) are
    /// enforced by `Ticket`'s constructor; the ledger rejects only the
    /// portfolio-level case of an empty ticket list.
    pub async fn create_prediction(
        &self,
        target_draw_date: NaiveDate,
        strategy_name: impl Into<String>,
        tickets: Vec<Ticket>,
        model_version: impl Into<String>,
        metadata: WeightMixture,
    ) -> Result<Prediction, LedgerError> {
        if tickets.is_empty() {
            return Err(LedgerError::Validation(
                "portfolio must contain at least one ticket".to_string(),
            ));
        }

        let prediction = self
            .storage
            .create_prediction(PredictionAppend {
                created_at: Utc::now(),
                target_draw_date,
                strategy_name: strategy_name.into(),
                model_version: model_version.into(),
                tickets,
                metadata,
            })
            .await
            .map_err(LedgerError::from)?;

        info!(
            prediction_id = prediction.id.0,
            target_draw_date = %prediction.target_draw_date,
            strategy = %prediction.strategy_name,
            portfolio_size = prediction.portfolio_size(),
            "prediction recorded"
        );
        Ok(prediction)
    }

    /// Get one prediction by id.
    pub async fn get_prediction(
        &self,
        id: PredictionId,
    ) -> Result<Option<Prediction>, LedgerError> {
        self.storage
            .get_prediction(id)
            .await
            .map_err(LedgerError::from)
    }

    /// Attach an evaluation outcome to a prediction and mark it
    /// resolved, atomically. A second attempt for the same prediction
    /// fails with `AlreadyResolved` and leaves the original outcome
    /// unchanged.
    pub async fn record_result(
        &self,
        id: PredictionId,
        outcome: OutcomeDraft,
    ) -> Result<EvaluationOutcome, LedgerError> {
        let stored = self
            .storage
            .resolve_prediction(id, outcome)
            .await
            .map_err(LedgerError::from)?;
        info!(
            prediction_id = id.0,
            best_match = stored.best_match,
            prize_value = stored.prize_value,
            "prediction resolved"
        );
        Ok(stored)
    }

    /// Unresolved predictions, target draw date ascending.
    pub async fn list_unresolved(&self) -> Result<Vec<Prediction>, LedgerError> {
        self.storage
            .list_unresolved()
            .await
            .map_err(LedgerError::from)
    }

    /// Resolved outcomes for a strategy, newest-first, truncated to
    /// `limit` (0 means unbounded).
    pub async fn query_results(
        &self,
        strategy_name: &str,
        limit: usize,
    ) -> Result<Vec<EvaluationOutcome>, LedgerError> {
        self.storage
            .list_outcomes(strategy_name, limit)
            .await
            .map_err(LedgerError::from)
    }

    /// Append one snapshot per weight name. The mapping must sum to
    /// 1.0 within tolerance; mixtures are rejected whole, never
    /// partially persisted.
    pub async fn append_weights(
        &self,
        strategy_name: impl Into<String>,
        mapping: WeightMixture,
        performance_score: f64,
        n_observations: u32,
        updated_at: DateTime<Utc>,
    ) -> Result<Vec<WeightSnapshot>, LedgerError> {
        let total: f64 = mapping.values().sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(LedgerError::Validation(format!(
                "weight mixture sums to {total}, expected 1.0"
            )));
        }
        for (name, value) in &mapping {
            if !(0.0..=1.0).contains(value) {
                return Err(LedgerError::Validation(format!(
                    "weight {name} = {value} is outside [0, 1]"
                )));
            }
        }

        let strategy_name = strategy_name.into();
        debug!(strategy = %strategy_name, n_observations, "appending weight snapshots");
        self.storage
            .append_weights(WeightAppend {
                updated_at,
                strategy_name,
                entries: mapping.into_iter().collect(),
                performance_score,
                n_observations,
            })
            .await
            .map_err(LedgerError::from)
    }

    /// Most recent snapshot per weight name for a strategy.
    pub async fn current_weights(
        &self,
        strategy_name: &str,
    ) -> Result<BTreeMap<String, WeightState>, LedgerError> {
        self.storage
            .current_weights(strategy_name)
            .await
            .map_err(LedgerError::from)
    }

    /// The full append-only weight history for a strategy, oldest-first.
    pub async fn weight_history(
        &self,
        strategy_name: &str,
    ) -> Result<Vec<WeightSnapshot>, LedgerError> {
        self.storage
            .weight_history(strategy_name)
            .await
            .map_err(LedgerError::from)
    }
}

/// Ledger-level errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already resolved: {0}")]
    AlreadyResolved(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for LedgerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(msg) => Self::NotFound(msg),
            StorageError::Conflict(msg) => Self::AlreadyResolved(msg),
            StorageError::InvalidInput(msg) => Self::Validation(msg),
            StorageError::Serialization(msg) | StorageError::Backend(msg) => Self::Backend(msg),
        }
    }
}
