//! Auto-reconciliation driver.
//!
//! Scans unresolved predictions and evaluates the ones whose target
//! draw has since happened. A draw that has not happened yet is an
//! explicit `None` from the history source, checked before branching,
//! not an error to catch. The ledger's resolved-guard makes the whole
//! pass idempotent: re-running it only touches newly available draws.

#![deny(unsafe_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use lotto_evaluation::Evaluator;
use lotto_ledger::{LedgerError, PredictionLedger};
use lotto_types::DrawRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Collaborator interface for historical draw outcomes.
///
/// Implementations own their transport and timeouts; the driver only
/// consumes the lookup surface.
#[async_trait]
pub trait DrawHistorySource: Send + Sync {
    /// The draw for a given date, or `None` if it has not occurred
    /// (or is not yet published).
    async fn find_draw(&self, date: NaiveDate) -> Result<Option<DrawRecord>, ReconcileError>;

    /// All known draws, date ascending.
    async fn list_all(&self) -> Result<Vec<DrawRecord>, ReconcileError>;
}

/// In-memory draw history, for tests and for callers that load draw
/// rows from a local file.
#[derive(Default)]
pub struct InMemoryDrawHistory {
    draws: BTreeMap<NaiveDate, DrawRecord>,
}

impl InMemoryDrawHistory {
    pub fn new(draws: impl IntoIterator<Item = DrawRecord>) -> Self {
        Self {
            draws: draws.into_iter().map(|d| (d.draw_date, d)).collect(),
        }
    }
}

#[async_trait]
impl DrawHistorySource for InMemoryDrawHistory {
    async fn find_draw(&self, date: NaiveDate) -> Result<Option<DrawRecord>, ReconcileError> {
        Ok(self.draws.get(&date).copied())
    }

    async fn list_all(&self) -> Result<Vec<DrawRecord>, ReconcileError> {
        Ok(self.draws.values().copied().collect())
    }
}

/// What one reconciliation pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Unresolved predictions examined.
    pub pending: usize,
    /// Predictions evaluated this pass.
    pub evaluated: usize,
}

/// Drives pending predictions through the evaluator as draw outcomes
/// become available.
pub struct ReconciliationDriver {
    ledger: PredictionLedger,
    evaluator: Evaluator,
}

impl ReconciliationDriver {
    pub fn new(ledger: PredictionLedger) -> Self {
        let evaluator = Evaluator::new(ledger.clone());
        Self { ledger, evaluator }
    }

    /// Evaluate every unresolved prediction whose draw is available.
    ///
    /// Safe to call repeatedly; a prediction that was resolved by a
    /// concurrent caller between the scan and the write is skipped.
    pub async fn reconcile_pending(
        &self,
        source: &dyn DrawHistorySource,
    ) -> Result<ReconcileReport, ReconcileError> {
        let pending = self.ledger.list_unresolved().await?;
        let mut report = ReconcileReport {
            pending: pending.len(),
            evaluated: 0,
        };

        for prediction in pending {
            let Some(draw) = source.find_draw(prediction.target_draw_date).await? else {
                debug!(
                    prediction_id = prediction.id.0,
                    target_draw_date = %prediction.target_draw_date,
                    "draw not yet available, skipping"
                );
                continue;
            };

            match self.evaluator.evaluate(prediction.id, draw.numbers).await {
                Ok(summary) => {
                    report.evaluated += 1;
                    debug!(
                        prediction_id = prediction.id.0,
                        best_match = summary.best_match,
                        "reconciled prediction"
                    );
                }
                // A racing evaluation got there first; benign.
                Err(LedgerError::AlreadyResolved(_)) => {
                    warn!(
                        prediction_id = prediction.id.0,
                        "prediction resolved concurrently, skipping"
                    );
                }
                Err(other) => return Err(other.into()),
            }
        }

        info!(
            pending = report.pending,
            evaluated = report.evaluated,
            "reconciliation pass complete"
        );
        Ok(report)
    }
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("draw history source error: {0}")]
    Source(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotto_types::{Ticket, WeightMixture};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn draw(day: u32, numbers: [u8; 7]) -> DrawRecord {
        DrawRecord {
            draw_date: date(day),
            numbers: Ticket::new(numbers).unwrap(),
        }
    }

    async fn pending_prediction(ledger: &PredictionLedger, day: u32) -> lotto_types::PredictionId {
        ledger
            .create_prediction(
                date(day),
                "hybrid_v1",
                vec![Ticket::new([1, 2, 3, 4, 5, 6, 7]).unwrap()],
                "1.0",
                WeightMixture::new(),
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn skips_predictions_whose_draw_has_not_happened() {
        let ledger = PredictionLedger::new_in_memory();
        let driver = ReconciliationDriver::new(ledger.clone());
        pending_prediction(&ledger, 6).await;

        let source = InMemoryDrawHistory::new([]);
        let report = driver.reconcile_pending(&source).await.unwrap();
        assert_eq!(report, ReconcileReport { pending: 1, evaluated: 0 });
        assert_eq!(ledger.list_unresolved().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn evaluates_when_the_draw_is_available() {
        let ledger = PredictionLedger::new_in_memory();
        let driver = ReconciliationDriver::new(ledger.clone());
        pending_prediction(&ledger, 6).await;
        pending_prediction(&ledger, 10).await; // draw still missing

        let source = InMemoryDrawHistory::new([draw(6, [1, 2, 3, 8, 9, 10, 11])]);
        let report = driver.reconcile_pending(&source).await.unwrap();
        assert_eq!(report, ReconcileReport { pending: 2, evaluated: 1 });

        let results = ledger.query_results("hybrid_v1", 0).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].best_match, 3);
    }

    #[tokio::test]
    async fn repeated_passes_are_idempotent() {
        let ledger = PredictionLedger::new_in_memory();
        let driver = ReconciliationDriver::new(ledger.clone());
        pending_prediction(&ledger, 6).await;

        let source = InMemoryDrawHistory::new([draw(6, [1, 2, 3, 8, 9, 10, 11])]);
        let first = driver.reconcile_pending(&source).await.unwrap();
        assert_eq!(first.evaluated, 1);

        let second = driver.reconcile_pending(&source).await.unwrap();
        assert_eq!(second, ReconcileReport { pending: 0, evaluated: 0 });
        assert_eq!(ledger.query_results("hybrid_v1", 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_resolution_is_benign() {
        let ledger = PredictionLedger::new_in_memory();
        let driver = ReconciliationDriver::new(ledger.clone());
        let id = pending_prediction(&ledger, 6).await;

        // Someone else evaluates between our scan and write; simulate
        // by resolving through a second evaluator first.
        let source = InMemoryDrawHistory::new([draw(6, [1, 2, 3, 8, 9, 10, 11])]);
        Evaluator::new(ledger.clone())
            .evaluate(id, Ticket::new([1, 2, 3, 8, 9, 10, 11]).unwrap())
            .await
            .unwrap();

        // The driver sees nothing pending now, but even a stale scan
        // would have been rejected by the resolved-guard.
        let report = driver.reconcile_pending(&source).await.unwrap();
        assert_eq!(report.evaluated, 0);
    }
}
