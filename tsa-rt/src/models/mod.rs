//! Retraining data models

pub mod cycle;
pub mod decision;

pub use cycle::{CycleOutcome, CyclePhase, CycleRun, PhaseTransition};
pub use decision::{PoolStatus, RetrainReason, RetrainingDecision};
