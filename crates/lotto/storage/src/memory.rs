//! In-memory reference implementation of the storage traits.
//!
//! Deterministic and test-friendly. Durable deployments use the SQLite
//! adapter; both enforce the same resolved-guard semantics.

use crate::model::{OutcomeAppend, PredictionAppend, WeightAppend};
use crate::traits::{PredictionStore, WeightStore};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use lotto_types::{
    EvaluationOutcome, Prediction, PredictionId, WeightSnapshot, WeightState,
};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-memory storage adapter.
///
/// Lock order is predictions before outcomes before weights wherever
/// more than one collection is touched.
#[derive(Default)]
pub struct InMemoryLottoStorage {
    predictions: RwLock<BTreeMap<i64, Prediction>>,
    outcomes: RwLock<Vec<EvaluationOutcome>>,
    weights: RwLock<Vec<WeightSnapshot>>,
}

impl InMemoryLottoStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PredictionStore for InMemoryLottoStorage {
    async fn create_prediction(&self, append: PredictionAppend) -> StorageResult<Prediction> {
        let mut guard = self
            .predictions
            .write()
            .map_err(|_| StorageError::Backend("predictions lock poisoned".to_string()))?;

        let next_id = guard.keys().next_back().copied().unwrap_or(0) + 1;
        let prediction = Prediction {
            id: PredictionId(next_id),
            created_at: append.created_at,
            target_draw_date: append.target_draw_date,
            strategy_name: append.strategy_name,
            model_version: append.model_version,
            tickets: append.tickets,
            metadata: append.metadata,
            resolved: false,
        };
        guard.insert(next_id, prediction.clone());
        Ok(prediction)
    }

    async fn get_prediction(&self, id: PredictionId) -> StorageResult<Option<Prediction>> {
        let guard = self
            .predictions
            .read()
            .map_err(|_| StorageError::Backend("predictions lock poisoned".to_string()))?;
        Ok(guard.get(&id.0).cloned())
    }

    async fn list_unresolved(&self) -> StorageResult<Vec<Prediction>> {
        let guard = self
            .predictions
            .read()
            .map_err(|_| StorageError::Backend("predictions lock poisoned".to_string()))?;
        let mut pending: Vec<_> = guard.values().filter(|p| !p.resolved).cloned().collect();
        pending.sort_by(|a, b| {
            a.target_draw_date
                .cmp(&b.target_draw_date)
                .then(a.id.cmp(&b.id))
        });
        Ok(pending)
    }

    async fn resolve_prediction(
        &self,
        id: PredictionId,
        outcome: OutcomeAppend,
    ) -> StorageResult<EvaluationOutcome> {
        let mut predictions = self
            .predictions
            .write()
            .map_err(|_| StorageError::Backend("predictions lock poisoned".to_string()))?;
        let mut outcomes = self
            .outcomes
            .write()
            .map_err(|_| StorageError::Backend("outcomes lock poisoned".to_string()))?;

        let prediction = predictions
            .get_mut(&id.0)
            .ok_or_else(|| StorageError::NotFound(format!("prediction {} not found", id)))?;

        if prediction.resolved {
            return Err(StorageError::Conflict(format!(
                "prediction {} is already resolved",
                id
            )));
        }

        if outcome.ticket_matches.len() != prediction.tickets.len() {
            return Err(StorageError::InvalidInput(format!(
                "outcome has {} match counts for a portfolio of {}",
                outcome.ticket_matches.len(),
                prediction.tickets.len()
            )));
        }

        let record = EvaluationOutcome {
            result_id: outcomes.len() as i64 + 1,
            prediction_id: id,
            actual_numbers: outcome.actual_numbers,
            evaluated_at: outcome.evaluated_at,
            ticket_matches: outcome.ticket_matches,
            best_match: outcome.best_match,
            total_matches: outcome.total_matches,
            prize_value: outcome.prize_value,
        };

        // Both writes happen under the predictions write lock, so no
        // caller can observe resolved=true without an outcome.
        outcomes.push(record.clone());
        prediction.resolved = true;
        Ok(record)
    }

    async fn list_outcomes(
        &self,
        strategy_name: &str,
        limit: usize,
    ) -> StorageResult<Vec<EvaluationOutcome>> {
        let predictions = self
            .predictions
            .read()
            .map_err(|_| StorageError::Backend("predictions lock poisoned".to_string()))?;
        let outcomes = self
            .outcomes
            .read()
            .map_err(|_| StorageError::Backend("outcomes lock poisoned".to_string()))?;

        let mut matching: Vec<_> = outcomes
            .iter()
            .filter(|o| {
                predictions
                    .get(&o.prediction_id.0)
                    .is_some_and(|p| p.strategy_name == strategy_name)
            })
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            b.evaluated_at
                .cmp(&a.evaluated_at)
                .then(b.result_id.cmp(&a.result_id))
        });
        if limit > 0 {
            matching.truncate(limit);
        }
        Ok(matching)
    }
}

#[async_trait]
impl WeightStore for InMemoryLottoStorage {
    async fn append_weights(&self, append: WeightAppend) -> StorageResult<Vec<WeightSnapshot>> {
        let mut guard = self
            .weights
            .write()
            .map_err(|_| StorageError::Backend("weights lock poisoned".to_string()))?;

        let mut stored = Vec::with_capacity(append.entries.len());
        for (weight_name, value) in append.entries {
            let snapshot = WeightSnapshot {
                sequence: guard.len() as u64 + 1,
                updated_at: append.updated_at,
                strategy_name: append.strategy_name.clone(),
                weight_name,
                value,
                performance_score: append.performance_score,
                n_observations: append.n_observations,
            };
            guard.push(snapshot.clone());
            stored.push(snapshot);
        }
        Ok(stored)
    }

    async fn current_weights(
        &self,
        strategy_name: &str,
    ) -> StorageResult<BTreeMap<String, WeightState>> {
        let guard = self
            .weights
            .read()
            .map_err(|_| StorageError::Backend("weights lock poisoned".to_string()))?;

        let mut current: BTreeMap<String, (u64, WeightState)> = BTreeMap::new();
        for snapshot in guard.iter().filter(|s| s.strategy_name == strategy_name) {
            let state = WeightState {
                value: snapshot.value,
                performance_score: snapshot.performance_score,
                n_observations: snapshot.n_observations,
            };
            match current.get(&snapshot.weight_name) {
                Some((sequence, _)) if *sequence > snapshot.sequence => {}
                _ => {
                    current.insert(snapshot.weight_name.clone(), (snapshot.sequence, state));
                }
            }
        }

        Ok(current
            .into_iter()
            .map(|(name, (_, state))| (name, state))
            .collect())
    }

    async fn weight_history(&self, strategy_name: &str) -> StorageResult<Vec<WeightSnapshot>> {
        let guard = self
            .weights
            .read()
            .map_err(|_| StorageError::Backend("weights lock poisoned".to_string()))?;
        Ok(guard
            .iter()
            .filter(|s| s.strategy_name == strategy_name)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lotto_types::Ticket;

    fn sample_append(strategy: &str, day: u32) -> PredictionAppend {
        PredictionAppend {
            created_at: Utc::now(),
            target_draw_date: chrono::NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            strategy_name: strategy.to_string(),
            model_version: "1.0".to_string(),
            tickets: vec![Ticket::new([1, 2, 3, 4, 5, 6, 7]).unwrap()],
            metadata: Default::default(),
        }
    }

    fn sample_outcome(best: u8) -> OutcomeAppend {
        OutcomeAppend {
            actual_numbers: Ticket::new([1, 2, 3, 8, 9, 10, 11]).unwrap(),
            evaluated_at: Utc::now(),
            ticket_matches: vec![best],
            best_match: best,
            total_matches: best as u32,
            prize_value: 0,
        }
    }

    #[tokio::test]
    async fn prediction_ids_are_monotonic() {
        let storage = InMemoryLottoStorage::new();
        let first = storage.create_prediction(sample_append("s", 1)).await.unwrap();
        let second = storage.create_prediction(sample_append("s", 2)).await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn resolve_is_guarded_against_double_evaluation() {
        let storage = InMemoryLottoStorage::new();
        let prediction = storage.create_prediction(sample_append("s", 1)).await.unwrap();

        storage
            .resolve_prediction(prediction.id, sample_outcome(3))
            .await
            .unwrap();
        let second = storage
            .resolve_prediction(prediction.id, sample_outcome(5))
            .await;
        assert!(matches!(second, Err(StorageError::Conflict(_))));

        // Original outcome untouched.
        let outcomes = storage.list_outcomes("s", 0).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].best_match, 3);
    }

    #[tokio::test]
    async fn unresolved_are_ordered_by_target_date() {
        let storage = InMemoryLottoStorage::new();
        storage.create_prediction(sample_append("s", 20)).await.unwrap();
        storage.create_prediction(sample_append("s", 3)).await.unwrap();
        storage.create_prediction(sample_append("s", 10)).await.unwrap();

        let pending = storage.list_unresolved().await.unwrap();
        let days: Vec<u32> = pending
            .iter()
            .map(|p| {
                use chrono::Datelike;
                p.target_draw_date.day()
            })
            .collect();
        assert_eq!(days, vec![3, 10, 20]);
    }

    #[tokio::test]
    async fn current_weights_sees_the_latest_snapshot_per_name() {
        let storage = InMemoryLottoStorage::new();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        storage
            .append_weights(WeightAppend {
                updated_at: at,
                strategy_name: "hybrid_v1".to_string(),
                entries: vec![
                    ("frequency_ratio".to_string(), 0.70),
                    ("random_ratio".to_string(), 0.30),
                ],
                performance_score: 0.0,
                n_observations: 0,
            })
            .await
            .unwrap();
        // Same timestamp: sequence must break the tie.
        storage
            .append_weights(WeightAppend {
                updated_at: at,
                strategy_name: "hybrid_v1".to_string(),
                entries: vec![
                    ("frequency_ratio".to_string(), 0.75),
                    ("random_ratio".to_string(), 0.25),
                ],
                performance_score: 0.5,
                n_observations: 6,
            })
            .await
            .unwrap();

        let current = storage.current_weights("hybrid_v1").await.unwrap();
        assert_eq!(current["frequency_ratio"].value, 0.75);
        assert_eq!(current["random_ratio"].value, 0.25);
        assert_eq!(current["frequency_ratio"].n_observations, 6);
    }
}
