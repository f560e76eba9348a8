//! Dummy-calibrated stop policy.
//!
//! The dummies carry no signal by construction, so the rate at which they
//! enter the active set estimates how aggressively the path is chasing
//! noise. The controller is a pure function of the running counts; it holds
//! no mutable state and may be re-evaluated at any time with the same
//! answer.

use crate::model::StopSpec;
use crate::step::BoundaryReason;
use serde::{Deserialize, Serialize};

/// Running counts the policy consumes; recomputed after every path action.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StopState {
    pub active_real: usize,
    pub active_dummies: usize,
}

/// Why a run stopped extending the path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltReason {
    /// The requested number of real predictors is active.
    TargetReached,
    /// Dummies entered faster than the control ratio allows.
    DummySaturation,
    /// The path ran out before the stop policy triggered.
    Boundary(BoundaryReason),
}

/// Early-stop policy over active-set counts.
#[derive(Clone, Copy, Debug)]
pub struct EarlyStopController {
    control_ratio: f64,
}

impl EarlyStopController {
    pub fn new(control_ratio: f64) -> Self {
        Self { control_ratio }
    }

    /// `Some(reason)` when the path should halt before taking another step.
    pub fn decide(&self, state: StopState, spec: StopSpec) -> Option<HaltReason> {
        if !spec.early_stop {
            return None;
        }
        if state.active_real >= spec.t_stop {
            return Some(HaltReason::TargetReached);
        }
        let budget = self.control_ratio * state.active_real.max(1) as f64;
        if state.active_dummies as f64 > budget {
            return Some(HaltReason::DummySaturation);
        }
        None
    }
}
