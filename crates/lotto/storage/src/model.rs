use chrono::{DateTime, NaiveDate, Utc};
use lotto_types::{Ticket, WeightMixture};
use serde::{Deserialize, Serialize};

/// Prediction append payload. The identifier and resolved flag are
/// assigned by storage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PredictionAppend {
    pub created_at: DateTime<Utc>,
    pub target_draw_date: NaiveDate,
    pub strategy_name: String,
    pub model_version: String,
    pub tickets: Vec<Ticket>,
    pub metadata: WeightMixture,
}

/// Evaluation outcome append payload. The result identifier is
/// assigned by storage; the write also flips the parent prediction's
/// resolved flag in the same atomic step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutcomeAppend {
    pub actual_numbers: Ticket,
    pub evaluated_at: DateTime<Utc>,
    pub ticket_matches: Vec<u8>,
    pub best_match: u8,
    pub total_matches: u32,
    pub prize_value: u64,
}

/// Weight snapshot append payload. One call appends a snapshot per
/// entry; sequencing is assigned by storage so snapshots written
/// together stay jointly "current".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WeightAppend {
    pub updated_at: DateTime<Utc>,
    pub strategy_name: String,
    pub entries: Vec<(String, f64)>,
    pub performance_score: f64,
    pub n_observations: u32,
}
