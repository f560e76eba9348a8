//! Append-only record of the selection path.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// What a path iteration did to the active set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathAction {
    /// The column entered the active set.
    Entered(usize),
    /// The column left the active set with its coefficient at zero.
    Removed(usize),
    /// A pure move with no membership change (the final step of a path).
    None,
}

/// Snapshot of the model after one path iteration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    /// Zero-based iteration index; equals the snapshot's position in the
    /// path.
    pub iteration: usize,
    /// Coefficients over all columns, zeros for inactive ones.
    pub coefficients: Array1<f64>,
    /// Coefficient of determination of the fit at this iteration.
    pub fit_quality: f64,
    /// Active-set membership after the action, in entry order.
    pub active: Vec<usize>,
    pub action: PathAction,
}

/// Ordered sequence of path snapshots. Entries are immutable once written; a
/// session only ever extends the tail, which is what makes runs resumable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionPath {
    steps: Vec<PathStep>,
}

impl SelectionPath {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn append(&mut self, step: PathStep) {
        debug_assert_eq!(step.iteration, self.steps.len());
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn last(&self) -> Option<&PathStep> {
        self.steps.last()
    }

    /// Copy of the coefficient vector at `iteration`, if recorded.
    pub fn coefficients_at(&self, iteration: usize) -> Option<Array1<f64>> {
        self.steps.get(iteration).map(|s| s.coefficients.clone())
    }

    pub fn fit_quality_at(&self, iteration: usize) -> Option<f64> {
        self.steps.get(iteration).map(|s| s.fit_quality)
    }
}
