//! Lotto loop domain types.
//!
//! The numeric contract here is fixed by the draw format: 7 distinct
//! numbers per ticket out of 1..=50. Everything downstream (evaluation,
//! aggregation, weight learning) assumes tickets that passed validation
//! at construction time, so malformed portfolios cannot reach storage.

#![deny(unsafe_code)]

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Numbers per ticket.
pub const TICKET_SIZE: usize = 7;
/// Smallest drawable number.
pub const NUMBER_MIN: u8 = 1;
/// Largest drawable number.
pub const NUMBER_MAX: u8 = 50;

/// Weight name for the frequency-heuristic share of a portfolio.
pub const FREQUENCY_RATIO: &str = "frequency_ratio";
/// Weight name for the uniformly random share of a portfolio.
pub const RANDOM_RATIO: &str = "random_ratio";
/// Mixture used before any learning has happened.
pub const DEFAULT_FREQUENCY_RATIO: f64 = 0.70;

/// The weight mixture a portfolio was built with, echoed back into
/// prediction metadata for audit.
pub type WeightMixture = BTreeMap<String, f64>;

/// Monotonically assigned prediction identifier (storage-owned).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PredictionId(pub i64);

impl fmt::Display for PredictionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One set of 7 distinct numbers in 1..=50, kept sorted ascending.
///
/// Used both for submitted tickets and for actual winning numbers; the
/// two sides of an evaluation share the same validation rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Ticket {
    numbers: [u8; TICKET_SIZE],
}

impl Ticket {
    /// Validate and canonicalize a set of numbers.
    pub fn new(mut numbers: [u8; TICKET_SIZE]) -> Result<Self, TicketError> {
        numbers.sort_unstable();
        for pair in numbers.windows(2) {
            if pair[0] == pair[1] {
                return Err(TicketError::DuplicateNumber(pair[0]));
            }
        }
        for &n in &numbers {
            if !(NUMBER_MIN..=NUMBER_MAX).contains(&n) {
                return Err(TicketError::OutOfRange(n));
            }
        }
        Ok(Self { numbers })
    }

    /// Validate a slice of arbitrary length.
    pub fn from_slice(numbers: &[u8]) -> Result<Self, TicketError> {
        let fixed: [u8; TICKET_SIZE] = numbers
            .try_into()
            .map_err(|_| TicketError::WrongCount(numbers.len()))?;
        Self::new(fixed)
    }

    /// The numbers, sorted ascending.
    pub fn numbers(&self) -> &[u8; TICKET_SIZE] {
        &self.numbers
    }

    pub fn contains(&self, number: u8) -> bool {
        self.numbers.binary_search(&number).is_ok()
    }

    /// Intersection cardinality with another ticket, in 0..=7.
    pub fn match_count(&self, other: &Ticket) -> u8 {
        self.numbers
            .iter()
            .filter(|n| other.contains(**n))
            .count() as u8
    }
}

impl TryFrom<Vec<u8>> for Ticket {
    type Error = TicketError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_slice(&value)
    }
}

impl From<Ticket> for Vec<u8> {
    fn from(value: Ticket) -> Self {
        value.numbers.to_vec()
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.numbers.iter().map(|n| n.to_string()).collect();
        write!(f, "[{}]", rendered.join(", "))
    }
}

/// Ticket validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TicketError {
    #[error("ticket must have exactly {TICKET_SIZE} numbers, got {0}")]
    WrongCount(usize),

    #[error("number {0} is outside {NUMBER_MIN}..={NUMBER_MAX}")]
    OutOfRange(u8),

    #[error("duplicate number {0} in ticket")]
    DuplicateNumber(u8),
}

/// One historical draw, as supplied by the draw-history collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRecord {
    pub draw_date: NaiveDate,
    pub numbers: Ticket,
}

/// One batch of tickets submitted for a future draw. Never deleted;
/// mutated exactly once when its result is attached.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prediction {
    pub id: PredictionId,
    pub created_at: DateTime<Utc>,
    pub target_draw_date: NaiveDate,
    pub strategy_name: String,
    pub model_version: String,
    pub tickets: Vec<Ticket>,
    pub metadata: WeightMixture,
    pub resolved: bool,
}

impl Prediction {
    pub fn portfolio_size(&self) -> usize {
        self.tickets.len()
    }
}

/// Outcome of evaluating one prediction against the actual draw.
/// Created once, immutable thereafter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub result_id: i64,
    pub prediction_id: PredictionId,
    pub actual_numbers: Ticket,
    pub evaluated_at: DateTime<Utc>,
    /// Per-ticket match counts, parallel to the prediction's tickets.
    pub ticket_matches: Vec<u8>,
    pub best_match: u8,
    pub total_matches: u32,
    pub prize_value: u64,
}

/// One point-in-time value of a named strategy weight. Append-only;
/// the "current" value for a name is the highest-sequence snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    pub sequence: u64,
    pub updated_at: DateTime<Utc>,
    pub strategy_name: String,
    pub weight_name: String,
    pub value: f64,
    pub performance_score: f64,
    pub n_observations: u32,
}

/// Current value of one weight, with the evidence behind it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightState {
    pub value: f64,
    pub performance_score: f64,
    pub n_observations: u32,
}
