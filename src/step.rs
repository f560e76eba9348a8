//! Step engine: equiangular direction and the next path event.
//!
//! One iteration moves the coefficients along the direction equiangular to
//! the active columns until the first of three things happens: an inactive
//! column ties the shrinking equicorrelation (entry), an active coefficient
//! reaches zero under the LASSO modification (removal), or no column can tie
//! and the path takes its final step to the least-squares fit. The engine is
//! a pure function of the state it is handed; applying the event is the
//! session's job.

use crate::factor::ActiveSetFactor;
use crate::model::SelectionConfig;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Direction data shared by every event that moves the path.
#[derive(Clone, Debug)]
pub struct Direction {
    /// Per-active-position coefficient increments for a unit step.
    pub coef: Array1<f64>,
    /// Fitted-space direction `u = X_A w`, unit length.
    pub fitted: Array1<f64>,
    /// Correlation image `a = X'u` over all columns.
    pub corr: Array1<f64>,
    /// Equicorrelation decay rate: active `|c|` shrink by `norm` per unit
    /// step.
    pub norm: f64,
}

impl Direction {
    /// The no-move direction used when the active set is still empty.
    fn stationary(samples: usize, columns: usize) -> Self {
        Self {
            coef: Array1::zeros(0),
            fitted: Array1::zeros(samples),
            corr: Array1::zeros(columns),
            norm: 0.0,
        }
    }
}

/// Why the path cannot move any further.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryReason {
    /// The active set spans every usable dimension.
    Saturated,
    /// No remaining correlation rises above numerical zero.
    NoCorrelation,
}

/// The next thing that happens on the path.
pub enum StepEvent {
    /// An inactive column ties the equicorrelation after `step`.
    Enter {
        column: usize,
        step: f64,
        dir: Direction,
    },
    /// An active coefficient crosses zero after `step` (LASSO modification).
    Drop {
        position: usize,
        step: f64,
        dir: Direction,
    },
    /// No column can enter any more; the final step to the least-squares end
    /// of the path.
    Complete { step: f64, dir: Direction },
    /// No progress is possible at all.
    Boundary(BoundaryReason),
}

/// Computes the next path event for the given state.
///
/// `excluded` lists columns rejected by the factorization during the current
/// iteration; they are ignored as entry candidates until the next one.
/// Tie-break policy: among candidates within `tolerance` of the minimal step,
/// the lowest column index wins, which keeps paths reproducible.
#[allow(clippy::too_many_arguments)]
pub fn next_event(
    x: ArrayView2<f64>,
    correlations: ArrayView1<f64>,
    beta: ArrayView1<f64>,
    active: &[usize],
    signs: &[f64],
    factor: &ActiveSetFactor,
    excluded: &[usize],
    config: &SelectionConfig,
    max_active: usize,
) -> StepEvent {
    let tol = config.tolerance;
    let blocked = blocked_mask(x.ncols(), active, excluded);

    if active.is_empty() {
        // Nothing to move along yet: the most correlated column enters at
        // step zero.
        return match most_correlated(correlations, &blocked, tol) {
            Some((column, magnitude)) if magnitude > tol => StepEvent::Enter {
                column,
                step: 0.0,
                dir: Direction::stationary(x.nrows(), x.ncols()),
            },
            _ => StepEvent::Boundary(BoundaryReason::NoCorrelation),
        };
    }

    // Shared |c| of the active set at the start of the iteration.
    let c_max = active
        .iter()
        .map(|&j| correlations[j].abs())
        .fold(0.0, f64::max);
    if c_max <= tol {
        return StepEvent::Boundary(BoundaryReason::NoCorrelation);
    }

    let dir = equiangular_direction(x, active, signs, factor);
    let step_to_end = c_max / dir.norm;

    let entry = if active.len() >= max_active {
        None
    } else {
        entry_candidate(correlations, &dir, c_max, &blocked, tol)
    };
    let removal = if config.lasso {
        removal_candidate(beta, active, &dir, tol)
    } else {
        None
    };

    let entry_step = entry.map_or(f64::INFINITY, |(_, step)| step);
    let removal_step = removal.map_or(f64::INFINITY, |(_, step)| step);

    if removal_step < entry_step && removal_step < step_to_end {
        let (position, step) = removal.unwrap();
        return StepEvent::Drop {
            position,
            step,
            dir,
        };
    }
    if entry_step < step_to_end {
        let (column, step) = entry.unwrap();
        return StepEvent::Enter { column, step, dir };
    }
    StepEvent::Complete {
        step: step_to_end,
        dir,
    }
}

/// Columns that may not enter this iteration: already active, or rejected by
/// the factorization earlier in the same iteration.
fn blocked_mask(columns: usize, active: &[usize], excluded: &[usize]) -> Vec<bool> {
    let mut blocked = vec![false; columns];
    for &j in active.iter().chain(excluded) {
        blocked[j] = true;
    }
    blocked
}

/// Unblocked column with the largest |c|; lowest index wins ties within
/// tolerance.
fn most_correlated(
    correlations: ArrayView1<f64>,
    blocked: &[bool],
    tol: f64,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (j, &c) in correlations.iter().enumerate() {
        if blocked[j] {
            continue;
        }
        let magnitude = c.abs();
        match best {
            None => best = Some((j, magnitude)),
            Some((_, current)) if magnitude > current + tol => best = Some((j, magnitude)),
            _ => {}
        }
    }
    best
}

/// The direction equiangular to the signed active columns.
///
/// Solving `G_A w0 = s` and scaling by `norm = (s' w0)^(-1/2)` yields
/// coefficient increments `w` whose fitted image `u = X_A w` has unit length
/// and the same inner product `norm` with every signed active column.
fn equiangular_direction(
    x: ArrayView2<f64>,
    active: &[usize],
    signs: &[f64],
    factor: &ActiveSetFactor,
) -> Direction {
    let s = Array1::from_iter(signs.iter().copied());
    let raw = factor.solve(s.view());
    let denom = raw.dot(&s).max(f64::MIN_POSITIVE);
    let norm = denom.sqrt().recip();
    let coef = raw * norm;
    let mut fitted = Array1::zeros(x.nrows());
    for (i, &column) in active.iter().enumerate() {
        fitted.scaled_add(coef[i], &x.column(column));
    }
    let corr = x.t().dot(&fitted);
    Direction {
        coef,
        fitted,
        corr,
        norm,
    }
}

/// First step at which `|c_j|` of an inactive column ties the shrinking
/// equicorrelation, from the standard crossing-time formula. Non-positive
/// crossings (within tolerance) are no ties; they belong to columns moving
/// away from the boundary or just removed from it.
fn crossing_time(c_max: f64, c_j: f64, norm: f64, a_j: f64, tol: f64) -> f64 {
    let tiny = f64::MIN_POSITIVE;
    let from_above = (c_max - c_j) / (norm - a_j + tiny);
    let from_below = (c_max + c_j) / (norm + a_j + tiny);
    let mut best = f64::INFINITY;
    if from_above > tol {
        best = from_above;
    }
    if from_below > tol && from_below < best {
        best = from_below;
    }
    best
}

fn entry_candidate(
    correlations: ArrayView1<f64>,
    dir: &Direction,
    c_max: f64,
    blocked: &[bool],
    tol: f64,
) -> Option<(usize, f64)> {
    let mut min_step = f64::INFINITY;
    for (j, &c) in correlations.iter().enumerate() {
        if blocked[j] {
            continue;
        }
        let step = crossing_time(c_max, c, dir.norm, dir.corr[j], tol);
        if step < min_step {
            min_step = step;
        }
    }
    if !min_step.is_finite() {
        return None;
    }
    // Second pass: lowest column index among ties within tolerance.
    for (j, &c) in correlations.iter().enumerate() {
        if blocked[j] {
            continue;
        }
        let step = crossing_time(c_max, c, dir.norm, dir.corr[j], tol);
        if step <= min_step + tol {
            return Some((j, step));
        }
    }
    None
}

/// Smallest positive step at which an active coefficient reaches zero.
/// Returns the active-set position; lowest column index wins ties.
fn removal_candidate(
    beta: ArrayView1<f64>,
    active: &[usize],
    dir: &Direction,
    tol: f64,
) -> Option<(usize, f64)> {
    let mut min_step = f64::INFINITY;
    for (i, &column) in active.iter().enumerate() {
        let slope = dir.coef[i];
        if slope == 0.0 {
            continue;
        }
        let step = -beta[column] / slope;
        if step > tol && step < min_step {
            min_step = step;
        }
    }
    if !min_step.is_finite() {
        return None;
    }
    let mut best: Option<(usize, usize, f64)> = None;
    for (i, &column) in active.iter().enumerate() {
        let slope = dir.coef[i];
        if slope == 0.0 {
            continue;
        }
        let step = -beta[column] / slope;
        if step > tol && step <= min_step + tol {
            match best {
                None => best = Some((column, i, step)),
                Some((current, _, _)) if column < current => best = Some((column, i, step)),
                _ => {}
            }
        }
    }
    best.map(|(_, position, step)| (position, step))
}
