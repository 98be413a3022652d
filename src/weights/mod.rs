//! Time-varying behavioral weight model
//!
//! A Bernoulli observation model with three slowly-drifting weights (bias,
//! contrast-left, contrast-right): the probability of a rightward choice on
//! trial `t` is `sigmoid(w_t . x_t)`, and each weight follows a Gaussian
//! random walk across trials with a wider step allowed at session
//! boundaries. Trajectories are fit by MAP Newton iterations over the whole
//! trial sequence, and the random-walk scales are selected by maximizing the
//! Laplace approximation to the model evidence over a power-of-two grid.
//!
//! The fitted per-trial weights are written back to the
//! [`crate::schema::CohortStore`] as [`WeightRecord`] rows via
//! [`WeightFit::into_records`].

mod solver;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::schema::{TrialRecord, WeightRecord};
use crate::{Error, Result};
use solver::{BlockTridiagonal, Mat3, Vec3, K};

/// Gain of the saturating contrast transform: raw contrasts in `[0, 1]`
/// map to `tanh(GAIN * c) / tanh(GAIN)`, compressing the top of the range
/// the way the subjects' own sensitivity does.
pub const TANH_GAIN: f64 = 5.0;

/// Minimum number of responded trials required to fit the model.
pub const MIN_TRIALS: usize = 10;

/// Likelihood floor keeping log terms finite.
const P_FLOOR: f64 = 1e-9;

/// Exponent range of the power-of-two hyperparameter grid.
const GRID_EXPONENTS: std::ops::RangeInclusive<i32> = -8..=1;

/// Design matrix and choice vector for one subject's full trial sequence.
///
/// Trials are expected in session-start then trial-index order (the order
/// [`crate::schema::CohortStore::trials_for_subject`] returns). No-go
/// trials carry no choice and are dropped.
#[derive(Debug, Clone)]
pub struct WeightInput {
    keys: Vec<(String, u64)>,
    y: Vec<f64>,
    x: Vec<Vec3>,
    session_lengths: Vec<usize>,
}

impl WeightInput {
    /// Build the model input from an ordered trial sequence using the
    /// default contrast transform gain.
    ///
    /// # Errors
    /// Returns `InsufficientData` if fewer than [`MIN_TRIALS`] trials
    /// carry a response.
    pub fn from_trials(trials: &[&TrialRecord]) -> Result<Self> {
        Self::with_gain(trials, TANH_GAIN)
    }

    /// Build the model input with an explicit transform gain.
    ///
    /// # Errors
    /// Returns `InsufficientData` if fewer than [`MIN_TRIALS`] trials
    /// carry a response, or `InvalidInput` for a non-positive gain.
    pub fn with_gain(trials: &[&TrialRecord], gain: f64) -> Result<Self> {
        if !(gain.is_finite() && gain > 0.0) {
            return Err(Error::InvalidInput(format!(
                "Contrast transform gain must be positive, got {gain}"
            )));
        }
        let norm = gain.tanh();

        let mut keys = Vec::new();
        let mut y = Vec::new();
        let mut x: Vec<Vec3> = Vec::new();
        let mut session_lengths: Vec<usize> = Vec::new();
        let mut current_session: Option<&str> = None;

        for trial in trials {
            let Some(chose_right) = trial.chose_right() else {
                continue;
            };
            if current_session != Some(trial.session_id()) {
                current_session = Some(trial.session_id());
                session_lengths.push(0);
            }
            if let Some(last) = session_lengths.last_mut() {
                *last += 1;
            }
            keys.push((trial.session_id().to_string(), trial.trial_id()));
            y.push(if chose_right { 1.0 } else { 0.0 });
            x.push([
                1.0,
                (gain * trial.contrast_left()).tanh() / norm,
                (gain * trial.contrast_right()).tanh() / norm,
            ]);
        }

        if y.len() < MIN_TRIALS {
            return Err(Error::InsufficientData {
                context: "weight model input".to_string(),
                needed: MIN_TRIALS,
                got: y.len(),
            });
        }

        Ok(Self {
            keys,
            y,
            x,
            session_lengths,
        })
    }

    /// Number of responded trials in the input.
    #[must_use]
    pub fn n_trials(&self) -> usize {
        self.y.len()
    }

    /// Number of sessions spanned by the input.
    #[must_use]
    pub fn n_sessions(&self) -> usize {
        self.session_lengths.len()
    }

    /// Trials kept per session, in session order.
    #[must_use]
    pub fn session_lengths(&self) -> &[usize] {
        &self.session_lengths
    }

    /// Whether trial `t` (t > 0) is the first responded trial of a session.
    fn starts_session(&self, t: usize) -> bool {
        let mut boundary = 0;
        for len in &self.session_lengths {
            boundary += len;
            if boundary == t {
                return true;
            }
            if boundary > t {
                return false;
            }
        }
        false
    }
}

/// Random-walk scales of the weight model, one entry per weight where the
/// scale is per-weight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Hyperparameters {
    /// Within-session random-walk standard deviation per weight
    pub sigma: [f64; K],
    /// Standard deviation of the first trial's weight prior
    pub sigma_init: f64,
    /// Session-boundary random-walk standard deviation per weight
    pub sigma_day: [f64; K],
}

impl Default for Hyperparameters {
    /// The pipeline's fixed starting guess: slow drift within and across
    /// sessions, essentially unconstrained initial weights.
    fn default() -> Self {
        let slow = 2f64.powi(-5);
        Self {
            sigma: [slow; K],
            sigma_init: 2f64.powi(5),
            sigma_day: [slow; K],
        }
    }
}

/// Which hyperparameters the evidence search may move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hyperparameter {
    /// Within-session random-walk scales (all three weights)
    Sigma,
    /// Session-boundary random-walk scales (all three weights)
    SigmaDay,
    /// Initial-weight prior scale
    SigmaInit,
}

/// A completed weight-model fit.
#[derive(Debug, Clone)]
pub struct WeightFit {
    hyperparameters: Hyperparameters,
    evidence: f64,
    trajectories: Vec<Vec3>,
    keys: Vec<(String, u64)>,
}

impl WeightFit {
    /// Get the selected hyperparameters.
    #[must_use]
    pub const fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    /// Get the Laplace log-evidence at the selected hyperparameters.
    #[must_use]
    pub const fn evidence(&self) -> f64 {
        self.evidence
    }

    /// Get the fitted trajectories: one `[bias, contrast_left,
    /// contrast_right]` triple per responded trial, in input order.
    #[must_use]
    pub fn trajectories(&self) -> &[Vec3] {
        &self.trajectories
    }

    /// Convert the fit into weight rows for
    /// [`crate::schema::CohortStore::insert_weights`].
    #[must_use]
    pub fn into_records(self, subject_id: &str) -> Vec<WeightRecord> {
        self.keys
            .into_iter()
            .zip(self.trajectories)
            .map(|((session_id, trial_id), w)| {
                WeightRecord::new(subject_id, session_id, trial_id, w[0], w[1], w[2])
            })
            .collect()
    }
}

/// Fitter for the time-varying weight model.
#[derive(Debug, Clone, Copy)]
pub struct WeightModel {
    max_newton_iter: usize,
    gradient_tolerance: f64,
}

impl Default for WeightModel {
    fn default() -> Self {
        Self {
            max_newton_iter: 100,
            gradient_tolerance: 1e-6,
        }
    }
}

impl WeightModel {
    /// Create a fitter with default Newton settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit trajectories and hyperparameters.
    ///
    /// The entries named in `optimize` are searched over a power-of-two
    /// grid by coordinate descent on the Laplace evidence, starting from
    /// `guess`; the rest stay fixed at `guess`. Pass an empty `optimize`
    /// to fit trajectories at `guess` directly.
    ///
    /// # Errors
    /// Returns `Fit` if no hyperparameter setting yields a converged MAP
    /// solve, or `InvalidInput` for non-positive scales in `guess`.
    pub fn fit(
        &self,
        input: &WeightInput,
        guess: &Hyperparameters,
        optimize: &[Hyperparameter],
    ) -> Result<WeightFit> {
        validate_scales(guess)?;

        let mut best_hyper = *guess;
        let mut best = self.map_solve(input, &best_hyper)?;

        // coordinate descent over the grid, two sweeps
        for _ in 0..2 {
            for which in optimize {
                let coords: &[usize] = match which {
                    Hyperparameter::Sigma | Hyperparameter::SigmaDay => &[0, 1, 2],
                    Hyperparameter::SigmaInit => &[0],
                };
                for &coord in coords {
                    for exponent in GRID_EXPONENTS {
                        let mut candidate = best_hyper;
                        let scale = 2f64.powi(exponent);
                        match which {
                            Hyperparameter::Sigma => candidate.sigma[coord] = scale,
                            Hyperparameter::SigmaDay => candidate.sigma_day[coord] = scale,
                            Hyperparameter::SigmaInit => candidate.sigma_init = scale,
                        }
                        let Ok(solution) = self.map_solve(input, &candidate) else {
                            continue;
                        };
                        if solution.evidence > best.evidence {
                            best = solution;
                            best_hyper = candidate;
                        }
                    }
                }
            }
        }

        debug!(
            evidence = best.evidence,
            n_trials = input.n_trials(),
            "weight model fit complete"
        );
        Ok(WeightFit {
            hyperparameters: best_hyper,
            evidence: best.evidence,
            trajectories: best.trajectory,
            keys: input.keys.clone(),
        })
    }

    /// MAP trajectory and Laplace evidence at fixed hyperparameters.
    fn map_solve(&self, input: &WeightInput, hyper: &Hyperparameters) -> Result<MapSolution> {
        let t_len = input.n_trials();
        let prior = Prior::build(input, hyper);

        let mut w: Vec<Vec3> = vec![[0.0; K]; t_len];
        let mut best_objective = objective(input, &prior, &w);
        let mut log_det_posterior = 0.0;
        let mut converged = false;

        for _ in 0..self.max_newton_iter {
            let grad = gradient(input, &prior, &w);
            let max_grad = grad
                .iter()
                .flat_map(|g| g.iter())
                .fold(0.0f64, |acc, g| acc.max(g.abs()));

            let system = posterior_precision(input, &prior, &w);
            let solve = system.solve(&grad)?;
            log_det_posterior = solve.log_det;

            if max_grad < self.gradient_tolerance {
                converged = true;
                break;
            }

            // damped Newton step: halve until the objective improves
            let mut alpha = 1.0;
            let mut stepped = false;
            while alpha > 1e-6 {
                let trial_w: Vec<Vec3> = w
                    .iter()
                    .zip(&solve.solution)
                    .map(|(wt, dt)| {
                        let mut next = *wt;
                        for i in 0..K {
                            next[i] += alpha * dt[i];
                        }
                        next
                    })
                    .collect();
                let trial_obj = objective(input, &prior, &trial_w);
                if trial_obj > best_objective {
                    w = trial_w;
                    best_objective = trial_obj;
                    stepped = true;
                    break;
                }
                alpha *= 0.5;
            }
            if !stepped {
                // no ascent direction left at this precision
                converged = max_grad < 1e-3;
                break;
            }
        }

        if !converged {
            return Err(Error::Fit {
                model: "weight trajectory".to_string(),
                reason: format!("Newton did not converge in {} iterations", self.max_newton_iter),
            });
        }

        // Laplace: log p(D) ~ log p(D, w_map) + (K T / 2) log 2pi
        //          - (1/2) log det(posterior precision); the 2pi terms of
        //          the prior normalizer cancel against it
        let evidence = best_objective + 0.5 * prior.log_det - 0.5 * log_det_posterior;
        if !evidence.is_finite() {
            return Err(Error::Fit {
                model: "weight trajectory".to_string(),
                reason: "evidence not finite".to_string(),
            });
        }

        Ok(MapSolution {
            trajectory: w,
            evidence,
        })
    }

}

/// Log-joint: Bernoulli log-likelihood minus the random-walk penalty.
fn objective(input: &WeightInput, prior: &Prior, w: &[Vec3]) -> f64 {
    let mut loglik = 0.0;
    for t in 0..input.n_trials() {
        let p = predict(&w[t], &input.x[t]);
        loglik += input.y[t] * p.ln() + (1.0 - input.y[t]) * (1.0 - p).ln();
    }
    loglik - 0.5 * prior.quadratic_form(w)
}

/// Gradient of the log-joint with respect to the trajectory.
fn gradient(input: &WeightInput, prior: &Prior, w: &[Vec3]) -> Vec<Vec3> {
    let mut grad = prior.times(w);
    for (t, g) in grad.iter_mut().enumerate() {
        let p = predict(&w[t], &input.x[t]);
        let residual = input.y[t] - p;
        for i in 0..K {
            g[i] = residual * input.x[t][i] - g[i];
        }
    }
    grad
}

/// Posterior precision: prior precision plus the per-trial likelihood
/// curvature `p(1-p) x x'` on the diagonal blocks.
fn posterior_precision(input: &WeightInput, prior: &Prior, w: &[Vec3]) -> BlockTridiagonal {
    let t_len = input.n_trials();
    let mut diag: Vec<Mat3> = Vec::with_capacity(t_len);
    for t in 0..t_len {
        let p = predict(&w[t], &input.x[t]);
        let curvature = p * (1.0 - p);
        let mut block = [[0.0; K]; K];
        for i in 0..K {
            block[i][i] = prior.diag[i][t];
            for j in 0..K {
                block[i][j] += curvature * input.x[t][i] * input.x[t][j];
            }
        }
        diag.push(block);
    }

    let mut off: Vec<Vec3> = Vec::with_capacity(t_len.saturating_sub(1));
    for t in 0..t_len.saturating_sub(1) {
        off.push([prior.off[0][t], prior.off[1][t], prior.off[2][t]]);
    }
    BlockTridiagonal { diag, off }
}

/// Rightward-choice probability, clamped away from 0 and 1.
fn predict(w: &Vec3, x: &Vec3) -> f64 {
    let z: f64 = (0..K).map(|i| w[i] * x[i]).sum();
    (1.0 / (1.0 + (-z).exp())).clamp(P_FLOOR, 1.0 - P_FLOOR)
}

fn validate_scales(hyper: &Hyperparameters) -> Result<()> {
    let all = hyper
        .sigma
        .iter()
        .chain(hyper.sigma_day.iter())
        .chain(std::iter::once(&hyper.sigma_init));
    for &scale in all {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error::InvalidInput(format!(
                "Hyperparameter scales must be positive, got {scale}"
            )));
        }
    }
    Ok(())
}

/// Random-walk prior precision, stored per weight as a scalar tridiagonal
/// (the weights' walks are independent; only the likelihood couples them).
struct Prior {
    /// Diagonal entries, per weight then per trial
    diag: [Vec<f64>; K],
    /// Off-diagonal entries between trials `t` and `t+1`, per weight
    off: [Vec<f64>; K],
    /// Log-determinant of the full prior precision
    log_det: f64,
}

impl Prior {
    fn build(input: &WeightInput, hyper: &Hyperparameters) -> Self {
        let t_len = input.n_trials();
        let init_prec = hyper.sigma_init.powi(-2);

        let mut diag: [Vec<f64>; K] = [
            vec![0.0; t_len],
            vec![0.0; t_len],
            vec![0.0; t_len],
        ];
        let mut off: [Vec<f64>; K] = [
            vec![0.0; t_len.saturating_sub(1)],
            vec![0.0; t_len.saturating_sub(1)],
            vec![0.0; t_len.saturating_sub(1)],
        ];

        for k in 0..K {
            // step precision between t and t+1: wider at session boundaries
            let step_prec: Vec<f64> = (0..t_len.saturating_sub(1))
                .map(|t| {
                    if input.starts_session(t + 1) {
                        hyper.sigma_day[k].powi(-2)
                    } else {
                        hyper.sigma[k].powi(-2)
                    }
                })
                .collect();

            for t in 0..t_len {
                let mut d = if t == 0 { init_prec } else { step_prec[t - 1] };
                if t < t_len - 1 {
                    d += step_prec[t];
                }
                diag[k][t] = d;
            }
            for t in 0..t_len.saturating_sub(1) {
                off[k][t] = -step_prec[t];
            }
        }

        // scalar LDL per weight: all pivots of an SPD tridiagonal are positive
        let mut log_det = 0.0;
        for k in 0..K {
            let mut prev_pivot = 0.0;
            for t in 0..t_len {
                let pivot = if t == 0 {
                    diag[k][0]
                } else {
                    diag[k][t] - off[k][t - 1].powi(2) / prev_pivot
                };
                log_det += pivot.ln();
                prev_pivot = pivot;
            }
        }

        Self { diag, off, log_det }
    }

    /// Quadratic form `w' K w`.
    fn quadratic_form(&self, w: &[Vec3]) -> f64 {
        let t_len = w.len();
        let mut total = 0.0;
        for k in 0..K {
            for t in 0..t_len {
                total += self.diag[k][t] * w[t][k] * w[t][k];
            }
            for t in 0..t_len - 1 {
                total += 2.0 * self.off[k][t] * w[t][k] * w[t + 1][k];
            }
        }
        total
    }

    /// Matrix-vector product `K w`.
    fn times(&self, w: &[Vec3]) -> Vec<Vec3> {
        let t_len = w.len();
        let mut out = vec![[0.0; K]; t_len];
        for k in 0..K {
            for t in 0..t_len {
                let mut v = self.diag[k][t] * w[t][k];
                if t > 0 {
                    v += self.off[k][t - 1] * w[t - 1][k];
                }
                if t < t_len - 1 {
                    v += self.off[k][t] * w[t + 1][k];
                }
                out[t][k] = v;
            }
        }
        out
    }
}

struct MapSolution {
    trajectory: Vec<Vec3>,
    evidence: f64,
}
