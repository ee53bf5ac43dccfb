//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{FitOutcome, ModelKind, ResultBundle};
use crate::forecast::{Forecast, RECENT_WINDOW};

use super::{FitSummary, best_fit, param_description, summarize_fit};

const PREVIEW_ROWS: usize = 10;

/// Format the full run summary: data, fit diagnostics, parameter reading and
/// forecast.
pub fn format_run_summary(bundle: &ResultBundle, forecasts: &[Forecast]) -> String {
    let mut out = String::new();
    let series = &bundle.series;

    out.push_str("=== epifit - epidemic curve fit ===\n");
    let (lo, hi) = series
        .cases
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    out.push_str(&format!(
        "Data: n={} | date column `{}` | case column `{}` | cases=[{}, {}]\n",
        series.len(),
        series.date_col,
        series.case_col,
        fmt_value(lo),
        fmt_value(hi),
    ));
    if let (Some(first), Some(last)) = (series.dates.first(), series.dates.last()) {
        out.push_str(&format!(
            "Dates: {} .. {}\n",
            first.format("%Y-%m-%d"),
            last.format("%Y-%m-%d")
        ));
    }

    out.push_str("\nPreview:\n");
    out.push_str(&format_preview(bundle));

    if bundle.fits().next().is_none() {
        out.push_str("\nNo models fitted.\n");
        return out;
    }

    let best = best_fit(bundle).map(|f| f.model);
    out.push_str("\nModel diagnostics:\n");
    for fit in bundle.fits() {
        let chosen = if Some(fit.model) == best { "*" } else { " " };
        let status = match &fit.outcome {
            FitOutcome::Converged { iterations, .. } => format!("converged ({iterations} iterations)"),
            FitOutcome::FallbackUsed { reason, .. } => format!("default parameters used: {reason}"),
        };
        out.push_str(&format!(
            "{chosen} {:<15} RMSE={:<12} {status}\n",
            fit.model.display_name(),
            format!("{:.3}", fit.rmse),
        ));
    }

    out.push_str("\nParameters:\n");
    for fit in bundle.fits() {
        out.push_str(&format_summary(&summarize_fit(fit)));
    }

    if !forecasts.is_empty() {
        let horizon = forecasts.iter().map(Forecast::horizon).max().unwrap_or(0);
        out.push_str(&format!("\nForecast (next {horizon} days, forward Euler):\n"));
        out.push_str(&format_forecast_table(forecasts, series.len()));
        for fc in forecasts {
            if let Some(trend) = fc.trend() {
                out.push_str(&format!(
                    "- {} predicts {} infections\n",
                    fc.model.display_name(),
                    trend.label()
                ));
            }
        }
    }

    out
}

fn format_preview(bundle: &ResultBundle) -> String {
    let series = &bundle.series;
    let mut out = String::new();
    out.push_str(&format!("{:>4} {:<12} {:>12}\n", "t", "date", "cases"));
    out.push_str(&format!("{:->4} {:-<12} {:->12}\n", "", "", ""));
    let rows = series.t.iter().zip(&series.cases).take(PREVIEW_ROWS);
    for (i, (t, &cases)) in rows.enumerate() {
        let date = series
            .dates
            .get(i)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        out.push_str(format!("{t:>4} {date:<12} {:>12}\n", fmt_value(cases)).trim_end());
        out.push('\n');
    }
    if series.len() > PREVIEW_ROWS {
        out.push_str(&format!("({} more rows)\n", series.len() - PREVIEW_ROWS));
    }
    out
}

/// Parameter block for one model.
pub fn format_summary(summary: &FitSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", summary.model.display_name()));

    let width = summary.params.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
    for (name, value) in &summary.params {
        out.push_str(&format!(
            "  {name:<width$} = {value:.4}  {}\n",
            param_description(name)
        ));
    }
    if let Some(days) = summary.infectious_period {
        out.push_str(&format!("  mean infectious period ~ {days:.2} days\n"));
    }
    if let Some(days) = summary.mosquito_lifespan {
        out.push_str(&format!("  mosquito lifespan ~ {days:.2} days\n"));
    }
    if let Some(last) = summary.last_fitted {
        let compartment = summary.model.compartment_names()[summary.model.observed_component()];
        let trend = summary
            .recent_trend
            .map(|t| t.label())
            .unwrap_or("n/a (too few samples)");
        out.push_str(&format!(
            "  last fitted {compartment} = {} | trend over last {RECENT_WINDOW} samples: {trend}\n",
            fmt_value(last)
        ));
    }
    out
}

/// Day-by-day forecast table, one column per model. Days continue the
/// 1-based numbering of the observed series.
pub fn format_forecast_table(forecasts: &[Forecast], n_observed: usize) -> String {
    let mut out = String::new();
    let columns: Vec<(String, Vec<f64>)> = forecasts
        .iter()
        .map(|fc| (column_label(fc.model), fc.values()))
        .collect();
    let rows = columns.iter().map(|(_, v)| v.len()).max().unwrap_or(0);

    let mut header = format!("{:>6}", "day");
    let mut rule = format!("{:->6}", "");
    for (label, _) in &columns {
        header.push_str(&format!(" {label:>16}"));
        rule.push_str(&format!(" {:->16}", ""));
    }
    out.push_str(&header);
    out.push('\n');
    out.push_str(&rule);
    out.push('\n');

    for k in 0..rows {
        let mut line = format!("{:>6}", n_observed + k + 1);
        for (_, values) in &columns {
            let cell = values.get(k).map(|&v| fmt_value(v)).unwrap_or_default();
            line.push_str(&format!(" {cell:>16}"));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn column_label(model: ModelKind) -> String {
    let compartment = model.compartment_names()[model.observed_component()];
    format!("{} {compartment}", model.key().to_uppercase())
}

/// Counts get two decimals, fractions get enough digits to be readable.
fn fmt_value(v: f64) -> String {
    if !v.is_finite() {
        return "n/a".to_string();
    }
    if v.abs() >= 1.0 || v == 0.0 {
        format!("{v:.2}")
    } else {
        format!("{v:.6}")
    }
}
