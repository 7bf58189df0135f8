use crate::model::{OutcomeAppend, PredictionAppend, WeightAppend};
use crate::StorageResult;
use async_trait::async_trait;
use lotto_types::{EvaluationOutcome, Prediction, PredictionId, WeightSnapshot, WeightState};
use std::collections::BTreeMap;

/// Storage interface for predictions and their evaluation outcomes.
#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Insert a new prediction and assign its identifier.
    async fn create_prediction(&self, append: PredictionAppend) -> StorageResult<Prediction>;

    /// Get one prediction by id.
    async fn get_prediction(&self, id: PredictionId) -> StorageResult<Option<Prediction>>;

    /// List unresolved predictions, target draw date ascending.
    async fn list_unresolved(&self) -> StorageResult<Vec<Prediction>>;

    /// Attach the outcome to a prediction and mark it resolved, as one
    /// atomic check-and-write. Fails with `Conflict` if the prediction
    /// is already resolved and `NotFound` if it does not exist.
    async fn resolve_prediction(
        &self,
        id: PredictionId,
        outcome: OutcomeAppend,
    ) -> StorageResult<EvaluationOutcome>;

    /// Outcomes for a strategy, newest-first, truncated to `limit`
    /// (0 means unbounded).
    async fn list_outcomes(
        &self,
        strategy_name: &str,
        limit: usize,
    ) -> StorageResult<Vec<EvaluationOutcome>>;
}

/// Storage interface for append-only weight snapshots.
#[async_trait]
pub trait WeightStore: Send + Sync {
    /// Append one snapshot per entry and return the stored records.
    async fn append_weights(&self, append: WeightAppend) -> StorageResult<Vec<WeightSnapshot>>;

    /// Most recent snapshot per weight name for a strategy.
    async fn current_weights(
        &self,
        strategy_name: &str,
    ) -> StorageResult<BTreeMap<String, WeightState>>;

    /// Full snapshot history for a strategy, oldest-first.
    async fn weight_history(&self, strategy_name: &str) -> StorageResult<Vec<WeightSnapshot>>;
}

/// Unified storage bundle consumed by the ledger facade.
pub trait LottoStorage: PredictionStore + WeightStore + Send + Sync {}

impl<T> LottoStorage for T where T: PredictionStore + WeightStore + Send + Sync {}
