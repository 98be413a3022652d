//! End-to-end psychometric fitting: raw trials through contrast summaries
//! to recovered curve parameters.

use ethogram::behavior::{self, ContrastSummary};
use ethogram::psychometric::{erf_psycho_2gammas, mle_fit, FitBounds, PsychoParams};
use ethogram::schema::{Choice, Feedback, TrialRecord};
use ethogram::Error;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const LEVELS: [f64; 9] = [-100.0, -50.0, -25.0, -12.5, 0.0, 12.5, 25.0, 50.0, 100.0];

/// Simulate a session: Bernoulli choices at each contrast level from a
/// known curve.
fn simulate_trials(truth: &PsychoParams, n_per_level: usize, seed: u64) -> Vec<TrialRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut trials = Vec::new();
    let mut trial_id = 0u64;
    for level in LEVELS {
        let (cl, cr) = if level < 0.0 {
            (-level / 100.0, 0.0)
        } else {
            (0.0, level / 100.0)
        };
        let p = erf_psycho_2gammas(truth, level);
        for _ in 0..n_per_level {
            let chose_right = rng.gen_bool(p);
            let choice = if chose_right { Choice::Right } else { Choice::Left };
            let correct = if level == 0.0 {
                rng.gen_bool(0.5)
            } else {
                (level > 0.0) == chose_right
            };
            let feedback = if correct { Feedback::Correct } else { Feedback::Error };
            trials.push(TrialRecord::new("sim", trial_id, cl, cr, choice, feedback, 0.4));
            trial_id += 1;
        }
    }
    trials
}

#[test]
fn test_recovery_from_simulated_trials() {
    let truth = PsychoParams {
        bias: 5.0,
        threshold: 18.0,
        lapse_low: 0.05,
        lapse_high: 0.08,
    };
    let trials = simulate_trials(&truth, 500, 1234);
    let data = behavior::summarize_by_contrast(&trials).unwrap();
    assert_eq!(data.len(), LEVELS.len());

    let bounds = FitBounds::from_data(&data).unwrap();
    let fit = mle_fit(&data, &bounds).unwrap();

    assert!((fit.params.bias - truth.bias).abs() < 6.0);
    assert!((fit.params.threshold - truth.threshold).abs() < 8.0);
    assert!((fit.params.lapse_low - truth.lapse_low).abs() < 0.05);
    assert!((fit.params.lapse_high - truth.lapse_high).abs() < 0.05);
    assert!(fit.log_likelihood.is_finite());
}

#[test]
fn test_default_bounds_track_the_data() {
    let data: Vec<ContrastSummary> = LEVELS
        .iter()
        .map(|&c| ContrastSummary {
            signed_contrast: c,
            n_trials: 50,
            fraction_right: 0.5,
        })
        .collect();
    let bounds = FitBounds::from_data(&data).unwrap();

    assert!((bounds.start.bias - 0.0).abs() < 1e-12);
    assert!((bounds.start.threshold - 20.0).abs() < f64::EPSILON);
    assert!((bounds.min.bias + 100.0).abs() < f64::EPSILON);
    assert!((bounds.max.bias - 100.0).abs() < f64::EPSILON);
    assert!((bounds.max.threshold - 100.0).abs() < f64::EPSILON);
}

#[test]
fn test_coarse_contrast_set_refuses_fit() {
    // late-stage sessions drop the easy contrasts; four levels is below
    // the fitting floor
    let truth = PsychoParams {
        bias: 0.0,
        threshold: 20.0,
        lapse_low: 0.05,
        lapse_high: 0.05,
    };
    let mut trials = simulate_trials(&truth, 50, 99);
    trials.retain(|t| t.signed_contrast().abs() >= 25.0);
    let data = behavior::summarize_by_contrast(&trials).unwrap();
    assert_eq!(data.len(), 4);

    let bounds = FitBounds::from_data(&data).unwrap();
    let err = mle_fit(&data, &bounds).unwrap_err();
    assert!(matches!(err, Error::InsufficientData { needed: 5, got: 4, .. }));
}

#[test]
fn test_bias_shift_is_detected() {
    let shifted = PsychoParams {
        bias: 30.0,
        threshold: 15.0,
        lapse_low: 0.02,
        lapse_high: 0.02,
    };
    let trials = simulate_trials(&shifted, 400, 7);
    let data = behavior::summarize_by_contrast(&trials).unwrap();
    let fit = mle_fit(&data, &FitBounds::from_data(&data).unwrap()).unwrap();
    assert!(fit.params.bias > 15.0, "bias estimate {}", fit.params.bias);
}
