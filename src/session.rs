//! Resumable session owning all mutable path-construction state.
//!
//! A session is created once per (design matrix, response, dummy partition)
//! triple and accumulates path entries monotonically across repeated
//! `run` calls: asking for a later stopping point resumes the loop from the
//! exact state the previous call halted in, never recomputing steps already
//! taken. The session is deliberately not shareable; callers needing
//! concurrent runs over the same data build independent sessions.

use crate::correlation::CorrelationTracker;
use crate::data::{ColumnPartition, DataError, ModelData};
use crate::factor::ActiveSetFactor;
use crate::model::{SelectionConfig, StopSpec};
use crate::path::{PathAction, PathStep, SelectionPath};
use crate::step::{self, BoundaryReason, Direction, StepEvent};
use crate::stop::{EarlyStopController, HaltReason, StopState};
use ndarray::{Array1, Array2};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(
        "Requested stop threshold {requested} is below the previously requested threshold {previous}. A session path only extends; create a new session to start over."
    )]
    InvalidThreshold { requested: usize, previous: usize },
}

/// Outcome summary of one `run` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunReport {
    pub halt: HaltReason,
    /// Path entries appended by this call; zero for an idempotent no-op.
    pub steps_taken: usize,
    pub active_real: usize,
    pub active_dummies: usize,
}

/// Stateful driver of the selection path.
///
/// Owns the design matrix, response, partition, factorization, correlation
/// tracker, sign vector, coefficients, residual, and the recorded path.
/// Nothing mutable ever escapes; accessors hand out borrows of immutable
/// snapshots or copies.
#[derive(Debug)]
pub struct SelectionSession {
    data: ModelData,
    config: SelectionConfig,
    factor: ActiveSetFactor,
    correlations: CorrelationTracker,
    active: Vec<usize>,
    signs: Vec<f64>,
    beta: Array1<f64>,
    residual: Array1<f64>,
    total_ss: f64,
    path: SelectionPath,
    stop_state: StopState,
    controller: EarlyStopController,
    boundary: Option<BoundaryReason>,
    last_halt: Option<HaltReason>,
    last_t_stop: Option<usize>,
    max_active: usize,
}

impl SelectionSession {
    pub fn new(
        x: Array2<f64>,
        y: Array1<f64>,
        partition: ColumnPartition,
        config: SelectionConfig,
    ) -> Result<Self, SelectionError> {
        let data = ModelData::new(x, y, partition)?;
        let samples = data.num_samples();
        let columns = data.num_columns();
        let correlations = CorrelationTracker::new(data.x.view(), data.y.view());
        let mean = data.y.mean().unwrap_or(0.0);
        let total_ss = data.y.iter().map(|v| (v - mean) * (v - mean)).sum();
        let max_active = columns.min(samples);
        log::info!(
            "New selection session: {} samples, {} real + {} dummy columns",
            samples,
            data.partition.num_real(),
            data.partition.num_dummies()
        );
        Ok(Self {
            residual: data.y.clone(),
            beta: Array1::zeros(columns),
            factor: ActiveSetFactor::new(max_active.min(8), config.tolerance),
            correlations,
            active: Vec::new(),
            signs: Vec::new(),
            total_ss,
            path: SelectionPath::new(),
            stop_state: StopState::default(),
            controller: EarlyStopController::new(config.control_ratio),
            boundary: None,
            last_halt: None,
            last_t_stop: None,
            max_active,
            data,
            config,
        })
    }

    /// Extends the path until the stop policy or the path boundary halts it.
    ///
    /// A threshold the path already satisfies is an idempotent no-op; a
    /// threshold below a previously requested one is rejected with the path
    /// left untouched. Running out of path before the threshold is a normal
    /// terminal state reported through [`HaltReason::Boundary`].
    pub fn run(&mut self, stop: StopSpec) -> Result<RunReport, SelectionError> {
        if let Some(previous) = self.last_t_stop {
            if stop.t_stop < previous {
                return Err(SelectionError::InvalidThreshold {
                    requested: stop.t_stop,
                    previous,
                });
            }
        }
        self.last_t_stop = Some(stop.t_stop);

        let start_len = self.path.len();
        log::info!(
            "Extending path from {} steps: t_stop={}, early_stop={}",
            start_len,
            stop.t_stop,
            stop.early_stop
        );

        let halt = loop {
            if let Some(reason) = self.boundary {
                break HaltReason::Boundary(reason);
            }
            if let Some(reason) = self.controller.decide(self.stop_state, stop) {
                break reason;
            }
            self.advance_one();
        };

        self.last_halt = Some(halt);
        let report = RunReport {
            halt,
            steps_taken: self.path.len() - start_len,
            active_real: self.stop_state.active_real,
            active_dummies: self.stop_state.active_dummies,
        };
        log::info!(
            "Run halted ({:?}): {} new steps, {} real / {} dummy predictors active",
            report.halt,
            report.steps_taken,
            report.active_real,
            report.active_dummies
        );
        Ok(report)
    }

    /// Applies exactly one path event.
    ///
    /// The factorization update happens before any other state is touched:
    /// a candidate the factor rejects leaves the session exactly as it was
    /// and the engine is asked again with that candidate excluded, so each
    /// iteration lands atomically or not at all.
    fn advance_one(&mut self) {
        let mut excluded: Vec<usize> = Vec::new();
        loop {
            let event = step::next_event(
                self.data.x.view(),
                self.correlations.current(),
                self.beta.view(),
                &self.active,
                &self.signs,
                &self.factor,
                &excluded,
                &self.config,
                self.max_active,
            );
            match event {
                StepEvent::Enter { column, step, dir } => {
                    let cross = self.gram_cross(column);
                    let col = self.data.x.column(column);
                    if let Err(err) = self.factor.add(cross.view(), col.dot(&col)) {
                        log::warn!("Skipping entry candidate column {column}: {err}");
                        excluded.push(column);
                        continue;
                    }
                    self.apply_move(step, &dir);
                    let sign = if self.correlations.current()[column] < 0.0 {
                        -1.0
                    } else {
                        1.0
                    };
                    self.active.push(column);
                    self.signs.push(sign);
                    log::debug!(
                        "Entered column {column} ({}) at step {step:.4e}",
                        self.kind_of(column)
                    );
                    self.finish_iteration(PathAction::Entered(column));
                    return;
                }
                StepEvent::Drop {
                    position,
                    step,
                    dir,
                } => {
                    self.apply_move(step, &dir);
                    let column = self.active[position];
                    self.beta[column] = 0.0;
                    self.factor.remove(position);
                    self.active.remove(position);
                    self.signs.remove(position);
                    log::debug!(
                        "Removed column {column} ({}) at step {step:.4e}",
                        self.kind_of(column)
                    );
                    self.finish_iteration(PathAction::Removed(column));
                    return;
                }
                StepEvent::Complete { step, dir } => {
                    self.apply_move(step, &dir);
                    self.finish_iteration(PathAction::None);
                    let reason = if self.active.len() >= self.max_active
                        && self.max_active < self.data.num_columns()
                    {
                        BoundaryReason::Saturated
                    } else {
                        BoundaryReason::NoCorrelation
                    };
                    log::debug!("Path complete after final step {step:.4e} ({reason:?})");
                    self.boundary = Some(reason);
                    return;
                }
                StepEvent::Boundary(reason) => {
                    self.boundary = Some(reason);
                    return;
                }
            }
        }
    }

    fn apply_move(&mut self, step: f64, dir: &Direction) {
        if step == 0.0 {
            return;
        }
        for (i, &column) in self.active.iter().enumerate() {
            self.beta[column] += step * dir.coef[i];
        }
        self.residual.scaled_add(-step, &dir.fitted);
        self.correlations.advance(step, &dir.corr);
    }

    /// Heals correlation drift, refreshes the stop counts, and records one
    /// snapshot. Runs after every applied event so the three updates land as
    /// a group.
    fn finish_iteration(&mut self, action: PathAction) {
        if !self.active.is_empty() {
            let expected = self
                .active
                .iter()
                .map(|&j| self.correlations.current()[j].abs())
                .fold(0.0, f64::max);
            let drift = self.correlations.equicorrelation_drift(&self.active, expected);
            if drift > self.config.tolerance * (1.0 + expected) {
                log::warn!(
                    "Correlation drift {drift:.3e} exceeded tolerance; resyncing from the residual"
                );
                self.residual = &self.data.y - &self.data.x.dot(&self.beta);
                self.correlations
                    .resync(self.data.x.view(), self.residual.view());
            }
        }

        let dummies = self
            .active
            .iter()
            .filter(|&&j| self.data.partition.is_dummy(j))
            .count();
        self.stop_state = StopState {
            active_real: self.active.len() - dummies,
            active_dummies: dummies,
        };

        let rss = self.residual.dot(&self.residual);
        let fit_quality = if self.total_ss > 0.0 {
            1.0 - rss / self.total_ss
        } else {
            0.0
        };
        self.path.append(PathStep {
            iteration: self.path.len(),
            coefficients: self.beta.clone(),
            fit_quality,
            active: self.active.clone(),
            action,
        });
    }

    /// Inner products of `column` with the active columns, in active order.
    fn gram_cross(&self, column: usize) -> Array1<f64> {
        let col = self.data.x.column(column);
        Array1::from_iter(
            self.active
                .iter()
                .map(|&j| self.data.x.column(j).dot(&col)),
        )
    }

    fn kind_of(&self, column: usize) -> &'static str {
        if self.data.partition.is_dummy(column) {
            "dummy"
        } else {
            "real"
        }
    }

    /// The recorded path. Snapshot entries are immutable once written.
    pub fn path(&self) -> &SelectionPath {
        &self.path
    }

    /// Copy of the current coefficient vector.
    pub fn coefficients(&self) -> Array1<f64> {
        self.beta.clone()
    }

    /// Current active columns in entry order.
    pub fn active_columns(&self) -> &[usize] {
        &self.active
    }

    /// Currently active real (non-dummy) columns, the selected predictors.
    pub fn active_real_columns(&self) -> Vec<usize> {
        self.active
            .iter()
            .copied()
            .filter(|&j| !self.data.partition.is_dummy(j))
            .collect()
    }

    pub fn active_real_count(&self) -> usize {
        self.stop_state.active_real
    }

    pub fn active_dummy_count(&self) -> usize {
        self.stop_state.active_dummies
    }

    /// Why the most recent `run` call halted, if any has completed.
    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.last_halt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn no_dummies(columns: usize) -> ColumnPartition {
        ColumnPartition::trailing(columns, 0).unwrap()
    }

    #[test]
    fn collinear_candidate_is_skipped_not_fatal() {
        // Column 2 is (x0 + x1)/sqrt(2) and the response lies in the span of
        // x0 and x1, so column 2 enters first (largest correlation), x0
        // second, and the remaining candidate x1 is exactly dependent on the
        // active pair. The session must skip it and finish the path instead
        // of crashing.
        let inv = 1.0 / 2.0_f64.sqrt();
        let x = array![
            [1.0, 0.0, inv],
            [0.0, 1.0, inv],
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0]
        ];
        let y = array![2.0, 1.0, 0.0, 0.0];
        let mut session =
            SelectionSession::new(x, y, no_dummies(3), SelectionConfig::default()).unwrap();
        let report = session
            .run(StopSpec {
                t_stop: 3,
                early_stop: false,
            })
            .unwrap();
        assert!(matches!(report.halt, HaltReason::Boundary(_)));
        // Column 1 never made it in.
        assert!(!session.active_columns().contains(&1));
        // The span of the active pair contains y, so the fit is exact.
        let final_fit = session.path().last().unwrap().fit_quality;
        assert_abs_diff_eq!(final_fit, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn single_column_path_enters_and_completes() {
        let x = array![[1.0], [2.0], [-1.0]];
        let y = array![2.0, 4.0, -2.0];
        let mut session =
            SelectionSession::new(x, y, no_dummies(1), SelectionConfig::default()).unwrap();
        let report = session
            .run(StopSpec {
                t_stop: 1,
                early_stop: false,
            })
            .unwrap();
        assert_eq!(
            report.halt,
            HaltReason::Boundary(BoundaryReason::NoCorrelation)
        );
        let steps = session.path().steps();
        assert_eq!(steps[0].action, PathAction::Entered(0));
        // y = 2 * x exactly, so the path ends at the exact fit.
        let last = session.path().last().unwrap();
        assert_abs_diff_eq!(last.coefficients[0], 2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(last.fit_quality, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn construction_rejects_mismatched_response() {
        let x = array![[1.0, 0.0], [0.0, 1.0]];
        let y = array![1.0];
        let err = SelectionSession::new(x, y, no_dummies(2), SelectionConfig::default())
            .unwrap_err();
        assert!(matches!(err, SelectionError::Data(_)));
    }

    #[test]
    fn orthogonal_design_recovers_exact_coefficients() {
        let x = array![[1.0, 0.0], [0.0, 1.0]];
        let y = array![3.0, 2.0];
        let mut session =
            SelectionSession::new(x, y, no_dummies(2), SelectionConfig::default()).unwrap();
        session
            .run(StopSpec {
                t_stop: 2,
                early_stop: false,
            })
            .unwrap();
        let last = session.path().last().unwrap();
        assert_abs_diff_eq!(last.coefficients[0], 3.0, epsilon = 1e-10);
        assert_abs_diff_eq!(last.coefficients[1], 2.0, epsilon = 1e-10);
    }
}
