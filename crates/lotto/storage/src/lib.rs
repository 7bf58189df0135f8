//! Storage contracts and adapters for the lotto prediction ledger.
//!
//! This crate owns the three persisted entity types' append/query
//! surfaces:
//! - predictions (append-only, resolved exactly once)
//! - evaluation outcomes (one per resolved prediction, immutable)
//! - weight snapshots (append-only history of strategy weights)
//!
//! Design stance:
//! - the resolved-guard is enforced here, as a single atomic
//!   check-and-write, not by callers
//! - adapters are interchangeable behind explicit trait handles; there
//!   is no process-wide storage singleton

#![deny(unsafe_code)]

mod error;
pub mod memory;
mod model;
#[cfg(feature = "sqlite")]
pub mod sqlite;
mod traits;

pub use error::{StorageError, StorageResult};
pub use model::{OutcomeAppend, PredictionAppend, WeightAppend};
pub use traits::{LottoStorage, PredictionStore, WeightStore};
