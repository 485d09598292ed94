//! Fault injection for the simulated backend.
//!
//! Every backend operation asks a single [`FaultPolicy`] whether it should
//! fail before touching the store. Production wiring uses [`RandomFaults`];
//! tests pick [`NoFaults`] or [`FailingOps`] for deterministic outcomes.

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backend operations that can be faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ListIssues,
    GetIssue,
    MoveIssue,
    UndoMove,
    UpdateIssue,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListIssues => "list issues",
            Self::GetIssue => "get issue",
            Self::MoveIssue => "move issue",
            Self::UndoMove => "undo move",
            Self::UpdateIssue => "update issue",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait FaultPolicy: Send + Sync {
    /// Return `true` to make `op` fail with a transient error.
    fn should_fail(&self, op: Operation) -> bool;
}

/// Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl FaultPolicy for NoFaults {
    fn should_fail(&self, _op: Operation) -> bool {
        false
    }
}

/// Fails each operation independently with a fixed probability.
#[derive(Debug, Clone, Copy)]
pub struct RandomFaults {
    probability: f64,
}

impl RandomFaults {
    /// `probability` is clamped to `[0.0, 1.0]`.
    pub fn new(probability: f64) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        Self { probability }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl FaultPolicy for RandomFaults {
    fn should_fail(&self, _op: Operation) -> bool {
        rand::thread_rng().gen_bool(self.probability)
    }
}

/// Fails exactly the listed operations until they are healed.
#[derive(Debug, Default)]
pub struct FailingOps {
    failing: Mutex<HashSet<Operation>>,
}

impl FailingOps {
    pub fn new(ops: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            failing: Mutex::new(ops.into_iter().collect()),
        }
    }

    pub fn fail(&self, op: Operation) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(op);
    }

    pub fn heal(&self, op: Operation) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&op);
    }
}

impl FaultPolicy for FailingOps {
    fn should_fail(&self, op: Operation) -> bool {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&op)
    }
}
