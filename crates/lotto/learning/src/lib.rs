//! Adaptive weight updater.
//!
//! Adjusts a strategy's portfolio mixture from its recent hit rate.
//! The rule is a clamped integral controller with a fixed step and
//! hard rails: hit rate above the upper threshold moves the frequency
//! weight up by one step, below the lower threshold moves it down, and
//! the dead-band in between leaves it alone. Beta posterior
//! pseudo-counts are computed from the same window and reported on
//! each update for audit, but they do not influence the step.
//!
//! Updates decline (return `None`) rather than fail when fewer than
//! `MIN_OBSERVATIONS` outcomes are in the window; sparse feedback is an
//! expected steady state, not an error.

#![deny(unsafe_code)]

use chrono::Utc;
use lotto_evaluation::PerformanceAggregator;
use lotto_ledger::{LedgerError, PredictionLedger};
use lotto_types::{
    WeightMixture, WeightSnapshot, DEFAULT_FREQUENCY_RATIO, FREQUENCY_RATIO, RANDOM_RATIO,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Minimum resolved outcomes before a weight update is allowed.
pub const MIN_OBSERVATIONS: usize = 5;
/// Fixed step size for weight adjustments.
pub const WEIGHT_STEP: f64 = 0.05;
/// Lower rail for the frequency weight.
pub const FREQUENCY_FLOOR: f64 = 0.60;
/// Upper rail for the frequency weight.
pub const FREQUENCY_CEILING: f64 = 0.80;
/// Hit rate above which the frequency weight steps up.
pub const RAISE_THRESHOLD: f64 = 0.05;
/// Hit rate below which the frequency weight steps down.
pub const LOWER_THRESHOLD: f64 = 0.03;

/// Default window of recent outcomes to learn from.
pub const DEFAULT_WINDOW: usize = 20;

/// One applied weight update, for caller display.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightUpdate {
    pub frequency_ratio: f64,
    pub random_ratio: f64,
    /// The hit rate that drove the update.
    pub performance_score: f64,
    pub n_observations: u32,
    /// Beta(1,1) posterior shape parameters from the window's
    /// successes and failures. Reported for audit only.
    pub posterior_alpha: u32,
    pub posterior_beta: u32,
}

/// Online learner that adapts strategy weights from ledger feedback.
#[derive(Clone)]
pub struct AdaptiveLearner {
    ledger: PredictionLedger,
    aggregator: PerformanceAggregator,
}

impl AdaptiveLearner {
    pub fn new(ledger: PredictionLedger) -> Self {
        let aggregator = PerformanceAggregator::new(ledger.clone());
        Self { ledger, aggregator }
    }

    /// Seed the default 0.70/0.30 mixture once, if the strategy has no
    /// snapshots yet. Safe to call repeatedly.
    pub async fn ensure_default_weights(&self, strategy_name: &str) -> Result<(), LedgerError> {
        if !self.ledger.current_weights(strategy_name).await?.is_empty() {
            return Ok(());
        }
        let mapping = WeightMixture::from([
            (FREQUENCY_RATIO.to_string(), DEFAULT_FREQUENCY_RATIO),
            (RANDOM_RATIO.to_string(), 1.0 - DEFAULT_FREQUENCY_RATIO),
        ]);
        self.ledger
            .append_weights(strategy_name, mapping, 0.0, 0, Utc::now())
            .await?;
        info!(strategy = strategy_name, "seeded default weights");
        Ok(())
    }

    /// Update the strategy's mixture from its recent performance.
    ///
    /// Returns `Ok(None)` without touching storage when fewer than
    /// `MIN_OBSERVATIONS` resolved outcomes exist in the window.
    pub async fn update(
        &self,
        strategy_name: &str,
        window: usize,
    ) -> Result<Option<WeightUpdate>, LedgerError> {
        let Some(performance) = self
            .aggregator
            .windowed_performance(strategy_name, window)
            .await?
        else {
            debug!(strategy = strategy_name, "no outcomes yet, declining update");
            return Ok(None);
        };

        if performance.n_results < MIN_OBSERVATIONS {
            debug!(
                strategy = strategy_name,
                n_results = performance.n_results,
                "insufficient observations, declining update"
            );
            return Ok(None);
        }

        let hit_rate = performance.hit_rate_3plus;
        let n = performance.n_results;
        let successes = (hit_rate * n as f64).round() as u32;
        let failures = n as u32 - successes;

        let current_frequency = self
            .ledger
            .current_weights(strategy_name)
            .await?
            .get(FREQUENCY_RATIO)
            .map(|state| state.value)
            .unwrap_or(DEFAULT_FREQUENCY_RATIO);

        let new_frequency = step_frequency_weight(current_frequency, hit_rate);
        let new_random = 1.0 - new_frequency;

        let mapping = WeightMixture::from([
            (FREQUENCY_RATIO.to_string(), new_frequency),
            (RANDOM_RATIO.to_string(), new_random),
        ]);
        self.ledger
            .append_weights(strategy_name, mapping, hit_rate, n as u32, Utc::now())
            .await?;

        info!(
            strategy = strategy_name,
            hit_rate,
            n_observations = n,
            frequency_ratio = new_frequency,
            random_ratio = new_random,
            "weights updated"
        );
        Ok(Some(WeightUpdate {
            frequency_ratio: new_frequency,
            random_ratio: new_random,
            performance_score: hit_rate,
            n_observations: n as u32,
            posterior_alpha: 1 + successes,
            posterior_beta: 1 + failures,
        }))
    }

    /// The append-only history of weight adjustments, oldest-first.
    pub async fn learning_history(
        &self,
        strategy_name: &str,
    ) -> Result<Vec<WeightSnapshot>, LedgerError> {
        self.ledger.weight_history(strategy_name).await
    }
}

/// The step rule: fixed step, hard rails, dead-band between the
/// thresholds.
pub fn step_frequency_weight(current: f64, hit_rate: f64) -> f64 {
    if hit_rate > RAISE_THRESHOLD {
        (current + WEIGHT_STEP).min(FREQUENCY_CEILING)
    } else if hit_rate < LOWER_THRESHOLD {
        (current - WEIGHT_STEP).max(FREQUENCY_FLOOR)
    } else {
        current
    }
}
