//! Retraining cycle state machine
//!
//! IDLE → CHECKING → FETCHING → SPLITTING → TRAINING → EVALUATING →
//! REGISTERING → PROMOTING → DONE, with FAILED and SKIPPED as the other
//! terminal states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tsa_common::models::ModelVersion;

use super::{RetrainReason, RetrainingDecision};

/// Cycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CyclePhase {
    Idle,
    /// Trigger evaluation
    Checking,
    /// Snapshot of the unused pool
    Fetching,
    Splitting,
    Training,
    /// Test-split metrics
    Evaluating,
    /// Version row plus consumed-sample marking
    Registering,
    Promoting,
    Done,
    /// Trigger said no; nothing mutated
    Skipped,
    Failed,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Idle => "IDLE",
            CyclePhase::Checking => "CHECKING",
            CyclePhase::Fetching => "FETCHING",
            CyclePhase::Splitting => "SPLITTING",
            CyclePhase::Training => "TRAINING",
            CyclePhase::Evaluating => "EVALUATING",
            CyclePhase::Registering => "REGISTERING",
            CyclePhase::Promoting => "PROMOTING",
            CyclePhase::Done => "DONE",
            CyclePhase::Skipped => "SKIPPED",
            CyclePhase::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CyclePhase::Done | CyclePhase::Skipped | CyclePhase::Failed)
    }
}

/// Phase change record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub cycle_id: Uuid,
    pub old_phase: CyclePhase,
    pub new_phase: CyclePhase,
    pub transitioned_at: DateTime<Utc>,
}

/// One retraining cycle (in-memory only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRun {
    pub cycle_id: Uuid,
    pub phase: CyclePhase,
    pub forced: bool,
    pub decision: Option<RetrainingDecision>,
    /// Lineage id shared by the model version and the consumed samples
    pub batch_id: Uuid,
    /// Set once REGISTERING wrote the version row
    pub registered_version: Option<i64>,
    pub started_at: DateTime<Utc>,
    /// Set once a terminal phase is reached
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl CycleRun {
    pub fn new(forced: bool) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            phase: CyclePhase::Idle,
            forced,
            decision: None,
            batch_id: Uuid::new_v4(),
            registered_version: None,
            started_at: Utc::now(),
            ended_at: None,
            error: None,
        }
    }

    pub fn transition_to(&mut self, new_phase: CyclePhase) -> PhaseTransition {
        let transition = PhaseTransition {
            cycle_id: self.cycle_id,
            old_phase: self.phase,
            new_phase,
            transitioned_at: Utc::now(),
        };
        self.phase = new_phase;

        if new_phase.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        transition
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Record the failure and move to FAILED
    pub fn fail(&mut self, error: String) -> PhaseTransition {
        self.error = Some(error);
        self.transition_to(CyclePhase::Failed)
    }
}

/// Result of a cycle that registered a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub cycle_id: Uuid,
    pub batch_id: Uuid,
    pub version: ModelVersion,
    pub promoted: bool,
    pub reason: RetrainReason,
    /// Why the promotion policy decided as it did
    pub promotion_note: String,
    pub train_size: usize,
    pub val_size: usize,
    pub test_size: usize,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_cycle_starts_idle() {
        let run = CycleRun::new(false);
        assert_eq!(run.phase, CyclePhase::Idle);
        assert!(run.ended_at.is_none());
        assert!(!run.is_terminal());
    }

    #[test]
    fn transition_records_old_and_new() {
        let mut run = CycleRun::new(true);
        let t = run.transition_to(CyclePhase::Checking);
        assert_eq!(t.cycle_id, run.cycle_id);
        assert_eq!(t.old_phase, CyclePhase::Idle);
        assert_eq!(t.new_phase, CyclePhase::Checking);
        assert!(run.ended_at.is_none());
    }

    #[test]
    fn terminal_phases_set_end_time() {
        for phase in [CyclePhase::Done, CyclePhase::Skipped, CyclePhase::Failed] {
            let mut run = CycleRun::new(false);
            run.transition_to(phase);
            assert!(run.is_terminal());
            assert!(run.ended_at.is_some());
        }
    }

    #[test]
    fn fail_keeps_error() {
        let mut run = CycleRun::new(false);
        run.transition_to(CyclePhase::Training);
        let t = run.fail("diverged".to_string());
        assert_eq!(t.old_phase, CyclePhase::Training);
        assert_eq!(run.phase, CyclePhase::Failed);
        assert_eq!(run.error.as_deref(), Some("diverged"));
    }

    #[test]
    fn phase_serializes_uppercase() {
        let json = serde_json::to_string(&CyclePhase::Registering).unwrap();
        assert_eq!(json, "\"REGISTERING\"");
        assert_eq!(CyclePhase::Registering.as_str(), "REGISTERING");
    }
}
