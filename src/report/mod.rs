//! Figure rendering
//!
//! SVG renditions of the paper's standard panels: psychometric and
//! chronometric curves, session-by-contrast performance heatmaps, per-group
//! metric boxplots, unit-quality metric histograms, and the training-status
//! breakdown. Every renderer writes to a caller-supplied path and surfaces
//! drawing failures as [`Error::Report`].

use std::path::Path;

use plotters::prelude::*;

use crate::behavior::ContrastSummary;
use crate::criteria::StatusTabulation;
use crate::psychometric::{erf_psycho_2gammas, PsychoFit};
use crate::schema::TrainingStatus;
use crate::stats;
use crate::{Error, Result};

const FIGURE_SIZE: (u32, u32) = (800, 600);
const FONT: (&str, u32) = ("sans-serif", 20);

fn draw_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Report(e.to_string())
}

/// Render observed rightward-choice fractions and, when available, the
/// fitted psychometric curve over the full contrast range.
///
/// # Errors
/// Returns `InvalidInput` on empty data or `Report` on drawing failures.
pub fn render_psychometric(
    path: &Path,
    data: &[ContrastSummary],
    fit: Option<&PsychoFit>,
) -> Result<()> {
    if data.is_empty() {
        return Err(Error::InvalidInput(
            "No contrast summaries to plot".to_string(),
        ));
    }

    let root = SVGBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Psychometric curve", FONT)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-100.0f64..100.0, 0.0f64..1.0)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .x_desc("Signed contrast (%)")
        .y_desc("Fraction rightward")
        .draw()
        .map_err(draw_err)?;

    if let Some(fit) = fit {
        let curve: Vec<(f64, f64)> = (-100..=100)
            .map(|x| {
                let x = f64::from(x);
                (x, erf_psycho_2gammas(&fit.params, x))
            })
            .collect();
        chart
            .draw_series(LineSeries::new(curve, &BLUE))
            .map_err(draw_err)?;
    }

    chart
        .draw_series(
            data.iter()
                .map(|d| Circle::new((d.signed_contrast, d.fraction_right), 4, BLACK.filled())),
        )
        .map_err(draw_err)?;

    root.present().map_err(draw_err)?;
    Ok(())
}

/// Render median reaction time against signed contrast.
///
/// `points` holds (signed contrast in percent, median reaction time in
/// seconds) pairs, as produced by
/// [`crate::behavior::chronometric_by_contrast`].
///
/// # Errors
/// Returns `InvalidInput` on empty data or `Report` on drawing failures.
pub fn render_chronometric(path: &Path, points: &[(f64, f64)]) -> Result<()> {
    if points.is_empty() {
        return Err(Error::InvalidInput(
            "No chronometric points to plot".to_string(),
        ));
    }
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let rt_max = sorted
        .iter()
        .map(|&(_, rt)| rt)
        .fold(f64::NEG_INFINITY, f64::max);
    let y_max = (rt_max * 1.1).max(1e-9);

    let root = SVGBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Chronometric curve", FONT)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-100.0f64..100.0, 0.0f64..y_max)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .x_desc("Signed contrast (%)")
        .y_desc("Median reaction time (s)")
        .draw()
        .map_err(draw_err)?;

    chart
        .draw_series(LineSeries::new(sorted.clone(), &BLUE))
        .map_err(draw_err)?;
    chart
        .draw_series(
            sorted
                .iter()
                .map(|&(c, rt)| Circle::new((c, rt), 4, BLACK.filled())),
        )
        .map_err(draw_err)?;

    root.present().map_err(draw_err)?;
    Ok(())
}

/// Render a histogram of one quality metric across units.
///
/// `values` is one metric value per unit; non-finite entries (the sentinel
/// of a failed unit) are skipped. The x axis is `n_bins` equal-width bins
/// spanning the finite values, with the spanned range in the caption.
///
/// # Errors
/// Returns `InvalidInput` if no finite value remains or `n_bins` is zero,
/// or `Report` on drawing failures.
pub fn render_metric_histogram(
    path: &Path,
    metric_name: &str,
    values: &[f64],
    n_bins: usize,
) -> Result<()> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || n_bins == 0 {
        return Err(Error::InvalidInput(format!(
            "No finite {metric_name} values to plot"
        )));
    }

    let lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = (hi - lo).max(1e-12);

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let bin_of = |v: f64| -> u32 {
        let idx = (((v - lo) / span) * n_bins as f64) as usize;
        idx.min(n_bins - 1) as u32
    };

    let mut counts = vec![0u32; n_bins];
    for &v in &finite {
        counts[bin_of(v) as usize] += 1;
    }
    let y_max = counts.iter().copied().max().unwrap_or(1).max(1);

    let root = SVGBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    #[allow(clippy::cast_possible_truncation)]
    let x_max = n_bins as u32;
    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{metric_name} ({lo:.3} to {hi:.3})"), FONT)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d((0..x_max).into_segmented(), 0..y_max + 1)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .x_desc(format!("{metric_name} bin"))
        .y_desc("Units")
        .draw()
        .map_err(draw_err)?;

    chart
        .draw_series(
            Histogram::vertical(&chart)
                .style(BLUE.mix(0.5).filled())
                .data(finite.iter().map(|&v| (bin_of(v), 1))),
        )
        .map_err(draw_err)?;

    root.present().map_err(draw_err)?;
    Ok(())
}

/// Render a sessions-by-contrast performance heatmap.
///
/// `rows` holds one row per session (chronological, drawn bottom-up), each
/// with one optional performance value per entry of `contrasts`. Missing
/// cells are left blank.
///
/// # Errors
/// Returns `InvalidInput` on an empty or ragged grid or `Report` on
/// drawing failures.
pub fn render_performance_heatmap(
    path: &Path,
    contrasts: &[f64],
    rows: &[Vec<Option<f64>>],
) -> Result<()> {
    if contrasts.is_empty() || rows.is_empty() {
        return Err(Error::InvalidInput("Empty heatmap grid".to_string()));
    }
    if let Some(bad) = rows.iter().position(|r| r.len() != contrasts.len()) {
        return Err(Error::InvalidInput(format!(
            "Heatmap row {bad} has {} cells, expected {}",
            rows[bad].len(),
            contrasts.len()
        )));
    }

    let root = SVGBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let (n_cols, n_rows) = (contrasts.len() as i32, rows.len() as i32);

    let mut chart = ChartBuilder::on(&root)
        .caption("Performance by session and contrast", FONT)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0..n_cols, 0..n_rows)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .x_desc("Contrast level")
        .y_desc("Session")
        .disable_mesh()
        .draw()
        .map_err(draw_err)?;

    chart
        .draw_series(rows.iter().enumerate().flat_map(|(r, row)| {
            row.iter().enumerate().filter_map(move |(c, cell)| {
                cell.map(|value| {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                    let (c, r) = (c as i32, r as i32);
                    Rectangle::new([(c, r), (c + 1, r + 1)], performance_color(value).filled())
                })
            })
        }))
        .map_err(draw_err)?;

    root.present().map_err(draw_err)?;
    Ok(())
}

/// Blue (0.0) through white (0.5) to red (1.0).
fn performance_color(value: f64) -> RGBColor {
    let v = value.clamp(0.0, 1.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    if v < 0.5 {
        let t = (v * 2.0 * 255.0) as u8;
        RGBColor(t, t, 255)
    } else {
        let t = ((2.0 - v * 2.0) * 255.0) as u8;
        RGBColor(255, t, t)
    }
}

/// Render per-group quartile boxes with whiskers at the extremes.
///
/// # Errors
/// Returns `InvalidInput` if no group or any empty group is given, or
/// `Report` on drawing failures.
pub fn render_metric_boxplot(
    path: &Path,
    metric_name: &str,
    groups: &[(String, Vec<f64>)],
) -> Result<()> {
    if groups.is_empty() {
        return Err(Error::InvalidInput("No groups to plot".to_string()));
    }
    if let Some((name, _)) = groups.iter().find(|(_, v)| v.is_empty()) {
        return Err(Error::InvalidInput(format!("Group {name} is empty")));
    }

    let y_min = groups
        .iter()
        .flat_map(|(_, v)| v.iter())
        .copied()
        .fold(f64::INFINITY, f64::min);
    let y_max = groups
        .iter()
        .flat_map(|(_, v)| v.iter())
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let pad = ((y_max - y_min) * 0.1).max(1e-9);

    let root = SVGBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    #[allow(clippy::cast_precision_loss)]
    let n_groups = groups.len() as f64;
    let mut chart = ChartBuilder::on(&root)
        .caption(metric_name, FONT)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..n_groups, (y_min - pad)..(y_max + pad))
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .x_desc("Group")
        .y_desc(metric_name)
        .draw()
        .map_err(draw_err)?;

    for (idx, (_, values)) in groups.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let center = idx as f64 + 0.5;
        let q1 = stats::percentile(values, 25.0);
        let q2 = stats::percentile(values, 50.0);
        let q3 = stats::percentile(values, 75.0);
        let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(center - 0.3, q1), (center + 0.3, q3)],
                BLUE.mix(0.3).filled(),
            )))
            .map_err(draw_err)?;
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(center - 0.3, q2), (center + 0.3, q2)],
                BLACK.stroke_width(2),
            )))
            .map_err(draw_err)?;
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(center, lo), (center, q1)],
                &BLACK,
            )))
            .map_err(draw_err)?;
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(center, q3), (center, hi)],
                &BLACK,
            )))
            .map_err(draw_err)?;
    }

    root.present().map_err(draw_err)?;
    Ok(())
}

/// Render per-criterion training-status counts as grouped bars.
///
/// # Errors
/// Returns `Report` on drawing failures.
pub fn render_status_breakdown(path: &Path, tabulation: &StatusTabulation) -> Result<()> {
    let statuses = [
        TrainingStatus::InTraining,
        TrainingStatus::Trained,
        TrainingStatus::Untrainable,
    ];
    let colors = [RGBColor(120, 120, 120), RGBColor(46, 139, 87), RGBColor(178, 34, 34)];

    let n_criteria = tabulation.criteria().len();
    let max_count = (0..n_criteria)
        .flat_map(|i| statuses.iter().map(move |&s| tabulation.count(i, s)))
        .max()
        .unwrap_or(0)
        .max(1);

    let root = SVGBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    #[allow(clippy::cast_precision_loss)]
    let x_max = n_criteria as f64;
    #[allow(clippy::cast_precision_loss)]
    let y_max = max_count as f64 * 1.1;

    let mut chart = ChartBuilder::on(&root)
        .caption("Training status by criterion", FONT)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..x_max, 0.0..y_max)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .x_desc("Criterion")
        .y_desc("Subjects")
        .draw()
        .map_err(draw_err)?;

    for criterion_idx in 0..n_criteria {
        for (status_idx, (&status, color)) in statuses.iter().zip(&colors).enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let x0 = criterion_idx as f64 + 0.1 + 0.27 * status_idx as f64;
            #[allow(clippy::cast_precision_loss)]
            let height = tabulation.count(criterion_idx, status) as f64;
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [(x0, 0.0), (x0 + 0.25, height)],
                    color.filled(),
                )))
                .map_err(draw_err)?
                .label(format!("{} ({})", status.label(), tabulation.criteria()[criterion_idx]))
                .legend({
                    let color = *color;
                    move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled())
                });
        }
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(draw_err)?;

    root.present().map_err(draw_err)?;
    Ok(())
}
