//! Property-based tests for the analysis invariants
//!
//! Mathematical invariants that must hold for arbitrary well-formed
//! inputs, run with ProptestConfig::with_cases(100).

use ethogram::behavior;
use ethogram::psychometric::{erf_psycho_2gammas, PsychoParams};
use ethogram::quality::{cum_drift, isi_violations, max_drift};
use ethogram::query::col;
use ethogram::schema::{Choice, Feedback, TrialRecord};
use ethogram::stats::{percentile, zscore};
use ethogram::storage::TrialTable;
use proptest::prelude::*;

const CONTRAST_LEVELS: [f64; 5] = [0.0, 0.0625, 0.125, 0.25, 1.0];

fn arb_trial(session: &'static str) -> impl Strategy<Value = TrialRecord> {
    (
        0..CONTRAST_LEVELS.len(),
        prop::bool::ANY,
        0..3u8,
        0.1f64..5.0,
        any::<u64>(),
    )
        .prop_map(move |(level, on_right, choice_code, rt, trial_id)| {
            let c = CONTRAST_LEVELS[level];
            let (cl, cr) = if on_right { (0.0, c) } else { (c, 0.0) };
            let choice = match choice_code {
                0 => Choice::Left,
                1 => Choice::Right,
                _ => Choice::NoGo,
            };
            let feedback = match choice {
                Choice::NoGo => Feedback::NoFeedback,
                Choice::Right if cr >= cl => Feedback::Correct,
                Choice::Left if cl >= cr => Feedback::Correct,
                _ => Feedback::Error,
            };
            TrialRecord::new(session, trial_id, cl, cr, choice, feedback, rt)
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: contrast summaries partition the responded trials.
    #[test]
    fn prop_summary_partitions_responded_trials(
        trials in prop::collection::vec(arb_trial("s"), 1..200)
    ) {
        let responded = trials.iter().filter(|t| t.chose_right().is_some()).count();
        match behavior::summarize_by_contrast(&trials) {
            Ok(summary) => {
                let total: usize = summary.iter().map(|s| s.n_trials).sum();
                prop_assert_eq!(total, responded);
                for level in &summary {
                    prop_assert!((0.0..=1.0).contains(&level.fraction_right));
                }
                // sorted by signed contrast
                for pair in summary.windows(2) {
                    prop_assert!(pair[0].signed_contrast < pair[1].signed_contrast);
                }
            }
            Err(_) => prop_assert_eq!(responded, 0),
        }
    }

    /// Property: the psychometric function stays inside its asymptotes.
    #[test]
    fn prop_psycho_curve_bounded_by_lapses(
        bias in -50.0f64..50.0,
        threshold in 1.0f64..100.0,
        lapse_low in 0.0f64..0.4,
        lapse_high in 0.0f64..0.4,
        x in -100.0f64..100.0,
    ) {
        let params = PsychoParams { bias, threshold, lapse_low, lapse_high };
        let p = erf_psycho_2gammas(&params, x);
        prop_assert!(p >= lapse_low - 1e-12);
        prop_assert!(p <= 1.0 - lapse_high + 1e-12);
    }

    /// Property: percentiles are monotone and stay within the sample range.
    #[test]
    fn prop_percentile_monotone_and_bounded(
        values in prop::collection::vec(-1e6f64..1e6, 1..100),
        q1 in 0.0f64..100.0,
        q2 in 0.0f64..100.0,
    ) {
        let (lo_q, hi_q) = if q1 <= q2 { (q1, q2) } else { (q2, q1) };
        let lo = percentile(&values, lo_q);
        let hi = percentile(&values, hi_q);
        prop_assert!(lo <= hi);

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(lo >= min && hi <= max);
    }

    /// Property: z-scored samples are centered.
    #[test]
    fn prop_zscore_centered(
        values in prop::collection::vec(-1e3f64..1e3, 2..100)
    ) {
        let z = zscore(&values);
        prop_assert_eq!(z.len(), values.len());
        #[allow(clippy::cast_precision_loss)]
        let mean: f64 = z.iter().sum::<f64>() / z.len() as f64;
        prop_assert!(mean.abs() < 1e-6);
    }

    /// Property: ISI violations are a fraction, and zero whenever the
    /// train honors the refractory period.
    #[test]
    fn prop_isi_violations_fraction(
        isis in prop::collection::vec(0.0005f64..0.5, 2..200),
        rp in 0.001f64..0.01,
    ) {
        let mut times = vec![0.0];
        for isi in &isis {
            times.push(times[times.len() - 1] + isi);
        }
        let frac = isi_violations(&times, rp);
        prop_assert!((0.0..=1.0).contains(&frac));
        if isis.iter().all(|&i| i >= rp) {
            prop_assert!(frac.abs() < f64::EPSILON);
        }
    }

    /// Property: cumulative drift dominates max drift.
    #[test]
    fn prop_cum_drift_dominates_max_drift(
        depths in prop::collection::vec(0.0f64..4000.0, 40..400)
    ) {
        let md = max_drift(&depths, 20);
        let cd = cum_drift(&depths, 20);
        prop_assert!(cd >= md - 1e-9);
    }

    /// Property: predicate filtering never invents rows and the mask
    /// matches a scalar recount.
    #[test]
    fn prop_predicate_filter_matches_recount(
        trials in prop::collection::vec(arb_trial("s"), 1..100),
        cutoff in 0.0f64..1.0,
    ) {
        let table = TrialTable::from_records(&trials).unwrap();
        let combined = table.combined().unwrap();
        let filtered = col("contrast_right").gt(cutoff).apply(&combined).unwrap();

        let expected = trials.iter().filter(|t| t.contrast_right() > cutoff).count();
        prop_assert_eq!(filtered.num_rows(), expected);
    }
}
