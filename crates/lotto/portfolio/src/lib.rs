//! Portfolio construction from the current adaptive weight mixture.
//!
//! A portfolio is a blend of two ticket builders: a frequency heuristic
//! that samples from the historically most-drawn numbers, and a
//! uniform random builder over the whole number range. The split
//! between them is the strategy's current `frequency_ratio` /
//! `random_ratio` mixture, and the mixture actually used is echoed
//! back so the caller can stamp it into prediction metadata for audit.

#![deny(unsafe_code)]

use lotto_ledger::{LedgerError, PredictionLedger};
use lotto_types::{
    DrawRecord, Ticket, WeightMixture, DEFAULT_FREQUENCY_RATIO, FREQUENCY_RATIO, NUMBER_MAX,
    NUMBER_MIN, RANDOM_RATIO, TICKET_SIZE,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// How many top-ranked numbers the frequency heuristic draws from.
pub const FREQUENCY_POOL_SIZE: usize = 20;

/// An ordered ticket batch plus the mixture it was built with.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Portfolio {
    pub tickets: Vec<Ticket>,
    pub mixture: WeightMixture,
}

/// Builds ticket portfolios according to the strategy's current
/// weights.
#[derive(Clone)]
pub struct PortfolioGenerator {
    ledger: PredictionLedger,
}

impl PortfolioGenerator {
    pub fn new(ledger: PredictionLedger) -> Self {
        Self { ledger }
    }

    /// Generate `size` tickets for a strategy, using its current
    /// weight mixture (or the 0.70/0.30 default when the strategy has
    /// no snapshots yet).
    pub async fn generate(
        &self,
        strategy_name: &str,
        size: usize,
        history: &[DrawRecord],
    ) -> Result<Portfolio, PortfolioError> {
        let mut rng = StdRng::from_entropy();
        self.generate_with_rng(strategy_name, size, history, &mut rng)
            .await
    }

    /// Deterministic variant for callers that supply their own RNG.
    pub async fn generate_with_rng<R: Rng>(
        &self,
        strategy_name: &str,
        size: usize,
        history: &[DrawRecord],
        rng: &mut R,
    ) -> Result<Portfolio, PortfolioError> {
        if size == 0 {
            return Err(PortfolioError::EmptyPortfolio);
        }

        let current = self.ledger.current_weights(strategy_name).await?;
        let frequency_ratio = current
            .get(FREQUENCY_RATIO)
            .map(|state| state.value)
            .unwrap_or(DEFAULT_FREQUENCY_RATIO);
        let random_ratio = 1.0 - frequency_ratio;

        let n_frequency = ((size as f64) * frequency_ratio).round() as usize;
        let n_frequency = n_frequency.min(size);
        let pool = frequency_pool(history);

        let mut tickets = Vec::with_capacity(size);
        for _ in 0..n_frequency {
            tickets.push(sample_ticket(rng, &pool));
        }
        let full_range: Vec<u8> = (NUMBER_MIN..=NUMBER_MAX).collect();
        for _ in n_frequency..size {
            tickets.push(sample_ticket(rng, &full_range));
        }

        debug!(
            strategy = strategy_name,
            size,
            n_frequency,
            frequency_ratio,
            "portfolio generated"
        );
        Ok(Portfolio {
            tickets,
            mixture: WeightMixture::from([
                (FREQUENCY_RATIO.to_string(), frequency_ratio),
                (RANDOM_RATIO.to_string(), random_ratio),
            ]),
        })
    }
}

/// The `FREQUENCY_POOL_SIZE` most-drawn numbers in the history,
/// ranked by appearance count descending (ties broken by the smaller
/// number). With no history every count is zero, so the pool is just
/// the lowest numbers; the heuristic degrades, it does not fail.
pub fn frequency_pool(history: &[DrawRecord]) -> Vec<u8> {
    let mut counts = [0usize; (NUMBER_MAX - NUMBER_MIN + 1) as usize];
    for draw in history {
        for &n in draw.numbers.numbers() {
            counts[(n - NUMBER_MIN) as usize] += 1;
        }
    }

    let mut ranked: Vec<u8> = (NUMBER_MIN..=NUMBER_MAX).collect();
    ranked.sort_by(|a, b| {
        counts[(b - NUMBER_MIN) as usize]
            .cmp(&counts[(a - NUMBER_MIN) as usize])
            .then(a.cmp(b))
    });
    ranked.truncate(FREQUENCY_POOL_SIZE);
    ranked
}

fn sample_ticket<R: Rng>(rng: &mut R, pool: &[u8]) -> Ticket {
    let numbers: Vec<u8> = pool.choose_multiple(rng, TICKET_SIZE).copied().collect();
    // The pool always holds at least TICKET_SIZE distinct in-range
    // numbers, so this cannot fail.
    Ticket::from_slice(&numbers).expect("sampled numbers form a valid ticket")
}

/// Portfolio construction errors.
#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("portfolio size must be at least 1")]
    EmptyPortfolio,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
