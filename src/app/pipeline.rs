//! Shared "fit pipeline" logic used by the CLI commands.
//!
//! prepare -> SIR fit (optional) -> Ross–Macdonald fit (optional) -> bundle
//!
//! Presentation (summary text, JSON) lives elsewhere and only consumes the
//! returned bundle.

use thiserror::Error;
use tracing::info;

use crate::data::{Dataset, PrepareError, prepare};
use crate::domain::{PipelineConfig, ResultBundle};
use crate::fit::{FitError, fit_rm, fit_sir};
use crate::forecast::{Forecast, forecast_fit};
use crate::models::ModelError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Prepare(#[from] PrepareError),
    #[error(transparent)]
    Fit(#[from] FitError),
}

/// Prepare the series once and fit the enabled models.
pub fn run(dataset: &Dataset, config: &PipelineConfig) -> Result<ResultBundle, PipelineError> {
    let series = prepare(dataset, config.date_col.as_deref(), config.case_col.as_deref())?;
    info!(
        rows = series.len(),
        date_col = %series.date_col,
        case_col = %series.case_col,
        "series prepared"
    );

    let times = series.times();

    let sir = if config.use_sir {
        let fit = fit_sir(&times, &series.cases, config.sir_guess, &config.fit)?;
        info!(rmse = fit.rmse, params = ?fit.params(), fallback = fit.outcome.is_fallback(), "SIR fitted");
        Some(fit)
    } else {
        None
    };

    let rm = if config.use_rm {
        let fit = fit_rm(&times, &series.cases, &config.population(), config.rm_guess, &config.fit)?;
        info!(
            rmse = fit.rmse,
            params = ?fit.params(),
            fallback = fit.outcome.is_fallback(),
            "Ross–Macdonald fitted"
        );
        Some(fit)
    } else {
        None
    };

    Ok(ResultBundle { series, sir, rm })
}

/// Forecast every fit in the bundle, SIR first.
pub fn forecast_bundle(bundle: &ResultBundle, horizon: usize) -> Result<Vec<Forecast>, ModelError> {
    bundle.fits().map(|fit| forecast_fit(fit, horizon)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;
    use crate::domain::ModelKind;

    fn outbreak() -> Dataset {
        let dates: Vec<String> = (1..=10).map(|d| format!("2024-01-{d:02}")).collect();
        Dataset::new(vec![
            Column::text("date", &dates),
            Column::int("cases", &[10, 12, 15, 20, 28, 35, 40, 42, 41, 38]),
        ])
        .unwrap()
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            n_h: 5e6,
            n_v: 5e5,
            iv0: 1000.0,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn end_to_end_both_models() {
        let bundle = run(&outbreak(), &config()).unwrap();

        assert_eq!(bundle.series.t, (0..10).collect::<Vec<_>>());
        assert_eq!(bundle.series.date_col, "date");
        assert_eq!(bundle.series.case_col, "cases");

        let sir = bundle.sir.as_ref().unwrap();
        let rm = bundle.rm.as_ref().unwrap();
        for fit in [sir, rm] {
            assert_eq!(fit.trajectory.len(), 10);
            assert!(fit.rmse >= 0.0);
        }
        assert_eq!(sir.params().len(), 2);
        assert_eq!(rm.params().len(), 4);
        // Both fits stay on the scale of the observed counts.
        assert!(rm.rmse < 30.0, "Ross–Macdonald rmse {}", rm.rmse);
        assert!(!rm.outcome.is_fallback());

        let forecasts = forecast_bundle(&bundle, 7).unwrap();
        assert_eq!(forecasts.len(), 2);
        assert_eq!(forecasts[0].model, ModelKind::Sir);
        assert_eq!(forecasts[1].model, ModelKind::RossMacdonald);
        assert!(forecasts.iter().all(|f| f.horizon() == 7 && f.origin == 9.0));
    }

    #[test]
    fn disabled_models_are_skipped() {
        let cfg = PipelineConfig {
            use_rm: false,
            ..config()
        };
        let bundle = run(&outbreak(), &cfg).unwrap();
        assert!(bundle.sir.is_some());
        assert!(bundle.rm.is_none());

        let cfg = PipelineConfig {
            use_sir: false,
            use_rm: false,
            ..config()
        };
        let bundle = run(&outbreak(), &cfg).unwrap();
        assert_eq!(bundle.fits().count(), 0);
        assert_eq!(bundle.series.len(), 10);
    }

    #[test]
    fn preparer_errors_abort_the_run() {
        let ds = Dataset::new(vec![Column::int("cases", &[1, 2, 3])]).unwrap();
        let err = run(&ds, &config()).unwrap_err();
        assert_eq!(err, PipelineError::Prepare(PrepareError::NoDateColumnFound));
    }
}
