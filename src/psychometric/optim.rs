//! Bounded Nelder-Mead simplex minimizer
//!
//! The psychometric likelihood is a smooth 4-parameter surface with box
//! constraints, which is exactly the regime the original fitting routine
//! handled with a derivative-free simplex search. Candidate points are
//! projected back into the box, so iterates never leave it.

use crate::{Error, Result};

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Minimize `f` inside the box `[lower, upper]` starting from `start`.
///
/// Returns the best point and its objective value.
///
/// # Errors
/// Returns `Fit` if the objective is non-finite at the start point or the
/// iteration budget is exhausted without the simplex collapsing.
pub fn minimize_bounded(
    f: impl Fn(&[f64]) -> f64,
    start: &[f64],
    lower: &[f64],
    upper: &[f64],
    max_iter: usize,
    tolerance: f64,
) -> Result<(Vec<f64>, f64)> {
    let dim = start.len();
    let clamp = |point: &mut Vec<f64>| {
        for ((x, lo), hi) in point.iter_mut().zip(lower).zip(upper) {
            *x = x.clamp(*lo, *hi);
        }
    };

    // initial simplex: start plus one vertex per coordinate, stepped by a
    // fraction of the box width
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(dim + 1);
    simplex.push(start.to_vec());
    for i in 0..dim {
        let mut vertex = start.to_vec();
        let width = upper[i] - lower[i];
        let step = if width > 0.0 { 0.05 * width } else { 0.1 };
        vertex[i] = (vertex[i] + step).min(upper[i]);
        if (vertex[i] - start[i]).abs() < f64::EPSILON {
            vertex[i] = (start[i] - step).max(lower[i]);
        }
        simplex.push(vertex);
    }

    let mut values: Vec<f64> = simplex.iter().map(|v| f(v)).collect();
    if !values[0].is_finite() {
        return Err(Error::Fit {
            model: "simplex".to_string(),
            reason: "objective not finite at start point".to_string(),
        });
    }

    for _ in 0..max_iter {
        // order vertices best-to-worst
        let mut order: Vec<usize> = (0..=dim).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let best = order[0];
        let worst = order[dim];
        let second_worst = order[dim - 1];

        if (values[worst] - values[best]).abs() <= tolerance * (1.0 + values[best].abs()) {
            return Ok((simplex[best].clone(), values[best]));
        }

        // centroid of all but the worst vertex
        let mut centroid = vec![0.0; dim];
        for (idx, vertex) in simplex.iter().enumerate() {
            if idx == worst {
                continue;
            }
            for (c, x) in centroid.iter_mut().zip(vertex) {
                *c += x;
            }
        }
        #[allow(clippy::cast_precision_loss)]
        for c in &mut centroid {
            *c /= dim as f64;
        }

        let move_from_centroid = |scale: f64| {
            let mut point: Vec<f64> = centroid
                .iter()
                .zip(&simplex[worst])
                .map(|(c, w)| c + scale * (c - w))
                .collect();
            clamp(&mut point);
            point
        };

        let reflected = move_from_centroid(REFLECT);
        let reflected_value = f(&reflected);

        if reflected_value < values[best] {
            let expanded = move_from_centroid(EXPAND);
            let expanded_value = f(&expanded);
            if expanded_value < reflected_value {
                simplex[worst] = expanded;
                values[worst] = expanded_value;
            } else {
                simplex[worst] = reflected;
                values[worst] = reflected_value;
            }
        } else if reflected_value < values[second_worst] {
            simplex[worst] = reflected;
            values[worst] = reflected_value;
        } else {
            let contracted = move_from_centroid(-CONTRACT);
            let contracted_value = f(&contracted);
            if contracted_value < values[worst] {
                simplex[worst] = contracted;
                values[worst] = contracted_value;
            } else {
                // shrink everything toward the best vertex
                let best_vertex = simplex[best].clone();
                for idx in 0..=dim {
                    if idx == best {
                        continue;
                    }
                    for (x, b) in simplex[idx].iter_mut().zip(&best_vertex) {
                        *x = b + SHRINK * (*x - b);
                    }
                    values[idx] = f(&simplex[idx]);
                }
            }
        }
    }

    Err(Error::Fit {
        model: "simplex".to_string(),
        reason: format!("no convergence within {max_iter} iterations"),
    })
}
