//! Evaluator and windowed performance aggregation.
//!
//! Scoring is deterministic: a ticket's match count is the intersection
//! cardinality with the winning numbers, and prize values come from a
//! fixed payout table. The table's tiers and amounts are design-fixed
//! constants of the draw format, replicated exactly for ledger
//! compatibility.

#![deny(unsafe_code)]

use chrono::Utc;
use lotto_ledger::{LedgerError, OutcomeDraft, PredictionLedger};
use lotto_types::{PredictionId, Ticket};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Prize value for one ticket given its match count.
///
/// {7 -> 10,000,000; 6 -> 100,000; 5 -> 1,500; 4 -> 50; 3 -> 20; else 0}
pub fn prize_for_match_count(matches: u8) -> u64 {
    match matches {
        7 => 10_000_000,
        6 => 100_000,
        5 => 1_500,
        4 => 50,
        3 => 20,
        _ => 0,
    }
}

/// What a single evaluation produced, for caller display.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub prediction_id: PredictionId,
    pub strategy_name: String,
    pub ticket_matches: Vec<u8>,
    pub best_match: u8,
    pub total_matches: u32,
    pub prize_value: u64,
}

/// Scores predictions against actual draw outcomes and writes the
/// result through the ledger.
#[derive(Clone)]
pub struct Evaluator {
    ledger: PredictionLedger,
}

impl Evaluator {
    pub fn new(ledger: PredictionLedger) -> Self {
        Self { ledger }
    }

    /// Evaluate one prediction against the actual winning numbers.
    ///
    /// Writes exactly one outcome; the ledger's resolved-guard makes a
    /// second call fail with `AlreadyResolved`. Store errors propagate
    /// unchanged and nothing is retried.
    pub async fn evaluate(
        &self,
        prediction_id: PredictionId,
        actual_numbers: Ticket,
    ) -> Result<EvaluationSummary, LedgerError> {
        let prediction = self
            .ledger
            .get_prediction(prediction_id)
            .await?
            .ok_or_else(|| {
                LedgerError::NotFound(format!("prediction {} not found", prediction_id))
            })?;

        let ticket_matches: Vec<u8> = prediction
            .tickets
            .iter()
            .map(|ticket| ticket.match_count(&actual_numbers))
            .collect();
        let best_match = ticket_matches.iter().copied().max().unwrap_or(0);
        let total_matches = ticket_matches.iter().map(|m| *m as u32).sum();
        let prize_value = ticket_matches
            .iter()
            .map(|m| prize_for_match_count(*m))
            .sum();

        let outcome = self
            .ledger
            .record_result(
                prediction_id,
                OutcomeDraft {
                    actual_numbers,
                    evaluated_at: Utc::now(),
                    ticket_matches,
                    best_match,
                    total_matches,
                    prize_value,
                },
            )
            .await?;

        info!(
            prediction_id = prediction_id.0,
            strategy = %prediction.strategy_name,
            best_match,
            total_matches,
            prize_value,
            "prediction evaluated"
        );
        Ok(EvaluationSummary {
            prediction_id,
            strategy_name: prediction.strategy_name,
            ticket_matches: outcome.ticket_matches,
            best_match,
            total_matches,
            prize_value,
        })
    }
}

/// Windowed statistics over a strategy's most recent resolved outcomes.
///
/// `None` from the aggregator means "no data yet", which callers must
/// not conflate with zero performance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub n_results: usize,
    pub avg_best_match: f64,
    pub avg_total_matches: f64,
    pub avg_prize_value: f64,
    /// Fraction of outcomes whose best single-ticket match is >= 3.
    pub hit_rate_3plus: f64,
    pub best_ever: u8,
    pub total_prize_won: u64,
}

/// Computes windowed performance for a named strategy.
#[derive(Clone)]
pub struct PerformanceAggregator {
    ledger: PredictionLedger,
}

impl PerformanceAggregator {
    pub fn new(ledger: PredictionLedger) -> Self {
        Self { ledger }
    }

    /// Statistics over up to `window_size` most recent resolved
    /// outcomes. Returns `Ok(None)` when the strategy has no resolved
    /// outcomes at all.
    pub async fn windowed_performance(
        &self,
        strategy_name: &str,
        window_size: usize,
    ) -> Result<Option<PerformanceSummary>, LedgerError> {
        let outcomes = self.ledger.query_results(strategy_name, window_size).await?;
        if outcomes.is_empty() {
            debug!(strategy = strategy_name, "no resolved outcomes in window");
            return Ok(None);
        }

        let n = outcomes.len();
        let sum_best: u32 = outcomes.iter().map(|o| o.best_match as u32).sum();
        let sum_total: u32 = outcomes.iter().map(|o| o.total_matches).sum();
        let total_prize_won: u64 = outcomes.iter().map(|o| o.prize_value).sum();
        let hits = outcomes.iter().filter(|o| o.best_match >= 3).count();

        Ok(Some(PerformanceSummary {
            n_results: n,
            avg_best_match: sum_best as f64 / n as f64,
            avg_total_matches: sum_total as f64 / n as f64,
            avg_prize_value: total_prize_won as f64 / n as f64,
            hit_rate_3plus: hits as f64 / n as f64,
            best_ever: outcomes.iter().map(|o| o.best_match).max().unwrap_or(0),
            total_prize_won,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use lotto_types::WeightMixture;
    use proptest::prelude::*;

    fn ticket(numbers: [u8; 7]) -> Ticket {
        Ticket::new(numbers).unwrap()
    }

    async fn prediction_with(
        ledger: &PredictionLedger,
        tickets: Vec<Ticket>,
        day: u32,
    ) -> PredictionId {
        ledger
            .create_prediction(
                NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
                "hybrid_v1",
                tickets,
                "1.0",
                WeightMixture::new(),
            )
            .await
            .unwrap()
            .id
    }

    #[test]
    fn payout_table_matches_the_draw_format() {
        assert_eq!(prize_for_match_count(7), 10_000_000);
        assert_eq!(prize_for_match_count(6), 100_000);
        assert_eq!(prize_for_match_count(5), 1_500);
        assert_eq!(prize_for_match_count(4), 50);
        assert_eq!(prize_for_match_count(3), 20);
        assert_eq!(prize_for_match_count(2), 0);
        assert_eq!(prize_for_match_count(0), 0);
    }

    #[tokio::test]
    async fn single_ticket_three_matches_pays_twenty() {
        let ledger = PredictionLedger::new_in_memory();
        let evaluator = Evaluator::new(ledger.clone());
        let id = prediction_with(&ledger, vec![ticket([1, 2, 3, 4, 5, 6, 7])], 6).await;

        let summary = evaluator
            .evaluate(id, ticket([1, 2, 3, 8, 9, 10, 11]))
            .await
            .unwrap();
        assert_eq!(summary.best_match, 3);
        assert_eq!(summary.total_matches, 3);
        assert_eq!(summary.prize_value, 20);
        assert_eq!(summary.ticket_matches, vec![3]);
    }

    #[tokio::test]
    async fn prize_sums_across_the_portfolio() {
        let ledger = PredictionLedger::new_in_memory();
        let evaluator = Evaluator::new(ledger.clone());
        let id = prediction_with(
            &ledger,
            vec![
                ticket([1, 2, 3, 4, 5, 6, 7]),   // 7 matches
                ticket([1, 2, 3, 4, 44, 45, 46]), // 4 matches
                ticket([40, 41, 42, 43, 47, 48, 49]), // 0 matches
            ],
            6,
        )
        .await;

        let summary = evaluator
            .evaluate(id, ticket([1, 2, 3, 4, 5, 6, 7]))
            .await
            .unwrap();
        assert_eq!(summary.ticket_matches, vec![7, 4, 0]);
        assert_eq!(summary.prize_value, 10_000_000 + 50);
        assert_eq!(summary.best_match, 7);
        assert_eq!(summary.total_matches, 11);
    }

    #[tokio::test]
    async fn second_evaluation_with_different_numbers_is_rejected() {
        let ledger = PredictionLedger::new_in_memory();
        let evaluator = Evaluator::new(ledger.clone());
        let id = prediction_with(&ledger, vec![ticket([1, 2, 3, 4, 5, 6, 7])], 6).await;

        evaluator
            .evaluate(id, ticket([1, 2, 3, 8, 9, 10, 11]))
            .await
            .unwrap();
        let second = evaluator.evaluate(id, ticket([1, 2, 3, 4, 5, 6, 7])).await;
        assert!(matches!(second, Err(LedgerError::AlreadyResolved(_))));

        // The first outcome is what the ledger kept.
        let results = ledger.query_results("hybrid_v1", 0).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].best_match, 3);
        assert_eq!(
            results[0].actual_numbers,
            ticket([1, 2, 3, 8, 9, 10, 11])
        );
    }

    #[tokio::test]
    async fn aggregator_returns_none_only_when_no_outcomes_exist() {
        let ledger = PredictionLedger::new_in_memory();
        let evaluator = Evaluator::new(ledger.clone());
        let aggregator = PerformanceAggregator::new(ledger.clone());

        assert!(aggregator
            .windowed_performance("hybrid_v1", 50)
            .await
            .unwrap()
            .is_none());

        let id = prediction_with(&ledger, vec![ticket([1, 2, 3, 4, 5, 6, 7])], 6).await;
        evaluator
            .evaluate(id, ticket([44, 45, 46, 47, 48, 49, 50]))
            .await
            .unwrap();

        // Zero performance is still a summary, not absence.
        let summary = aggregator
            .windowed_performance("hybrid_v1", 50)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.n_results, 1);
        assert_eq!(summary.hit_rate_3plus, 0.0);
        assert_eq!(summary.best_ever, 0);
    }

    #[tokio::test]
    async fn hit_rate_counts_best_match_three_plus_exactly() {
        let ledger = PredictionLedger::new_in_memory();
        let evaluator = Evaluator::new(ledger.clone());
        let aggregator = PerformanceAggregator::new(ledger.clone());

        // Best matches 3, 1, 0, 4, 3, 2 against a fixed draw.
        let actual = ticket([1, 2, 3, 4, 5, 6, 7]);
        let portfolios = [
            ticket([1, 2, 3, 44, 45, 46, 47]),  // 3
            ticket([1, 40, 41, 42, 43, 44, 45]), // 1
            ticket([40, 41, 42, 43, 44, 45, 46]), // 0
            ticket([1, 2, 3, 4, 44, 45, 46]),   // 4
            ticket([5, 6, 7, 40, 41, 42, 43]),  // 3
            ticket([1, 2, 40, 41, 42, 43, 44]), // 2
        ];
        for (i, t) in portfolios.into_iter().enumerate() {
            let id = prediction_with(&ledger, vec![t], i as u32 + 1).await;
            evaluator.evaluate(id, actual).await.unwrap();
        }

        let summary = aggregator
            .windowed_performance("hybrid_v1", 50)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.n_results, 6);
        assert_eq!(summary.hit_rate_3plus, 0.5);
        assert_eq!(summary.best_ever, 4);
        assert_eq!(summary.avg_best_match, 13.0 / 6.0);
    }

    fn ticket_strategy() -> impl Strategy<Value = Ticket> {
        proptest::sample::subsequence((1u8..=50).collect::<Vec<_>>(), 7)
            .prop_map(|numbers| Ticket::from_slice(&numbers).unwrap())
    }

    proptest! {
        #[test]
        fn property_match_count_is_bounded_and_symmetric(
            a in ticket_strategy(),
            b in ticket_strategy(),
        ) {
            let ab = a.match_count(&b);
            let ba = b.match_count(&a);
            prop_assert_eq!(ab, ba);
            prop_assert!(ab <= 7);
            prop_assert_eq!(a.match_count(&a), 7);
        }
    }
}
