//! Configuration types shared across the selection core.

use serde::{Deserialize, Serialize};

/// Tuning knobs for path construction. The defaults reproduce the usual
/// dummy-calibrated LASSO path; every field is a plain value so a config can
/// be serialized next to the results it produced.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Apply the LASSO modification: an active coefficient that would cross
    /// zero leaves the active set instead of passing through it.
    pub lasso: bool,
    /// Early stopping tolerates at most `control_ratio * max(active_real, 1)`
    /// active dummies before halting the path.
    pub control_ratio: f64,
    /// Shared numerical tolerance: tie detection between candidate steps,
    /// zero-crossing filters, positive-definiteness pivot checks, and
    /// correlation drift healing all use this constant.
    pub tolerance: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            lasso: true,
            control_ratio: 1.0,
            tolerance: 1e-12,
        }
    }
}

/// One run request: extend the path until the stop policy is satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopSpec {
    /// Maximum number of active real predictors before the path halts.
    pub t_stop: usize,
    /// When false the path runs to its natural boundary and `t_stop` only
    /// bounds later resumption requests.
    pub early_stop: bool,
}
