//! Command-line parsing for the epidemic curve fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! modeling/math code; `app` turns these structs into a `PipelineConfig`.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::math::OdeMethod;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "epifit",
    version,
    about = "Fit SIR and Ross–Macdonald models to case counts and forecast the next days"
)]
pub struct Cli {
    /// Log debug detail (optimizer and integrator) to stderr.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit the models to a case-count CSV, print the summary and a forecast.
    Fit(FitArgs),
    /// Write a synthetic outbreak CSV (useful for trying `fit`).
    Simulate(SimulateArgs),
    /// Print the summary of a run previously exported with `fit --json`.
    Report(ReportArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Case-count CSV with a date column and a numeric case column.
    #[arg(value_name = "CSV")]
    pub csv: PathBuf,

    /// Date column (auto-detected when omitted).
    #[arg(long)]
    pub date_col: Option<String>,

    /// Case column (auto-detected when omitted).
    #[arg(long)]
    pub case_col: Option<String>,

    /// Skip the SIR fit.
    #[arg(long)]
    pub no_sir: bool,

    /// Skip the Ross–Macdonald fit.
    #[arg(long)]
    pub no_rm: bool,

    /// Human population N_h.
    #[arg(long = "n-h", default_value_t = 1e6)]
    pub n_h: f64,

    /// Mosquito population N_v.
    #[arg(long = "n-v", default_value_t = 1e6)]
    pub n_v: f64,

    /// Initially infected mosquitoes.
    #[arg(long, default_value_t = 1000.0)]
    pub iv0: f64,

    /// Forecast horizon in days.
    #[arg(long, default_value_t = crate::forecast::DEFAULT_HORIZON)]
    pub horizon: usize,

    #[command(flatten)]
    pub numerics: NumericArgs,

    /// Export the run (fits + forecasts) as JSON; `-` writes to stdout.
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,
}

/// Integrator and optimizer knobs.
#[derive(Debug, Args, Clone)]
pub struct NumericArgs {
    /// ODE stepping scheme.
    #[arg(long, value_enum, default_value_t = OdeMethod::Auto)]
    pub method: OdeMethod,

    /// Integrator relative tolerance.
    #[arg(long, default_value_t = 1e-8)]
    pub rtol: f64,

    /// Integrator absolute tolerance.
    #[arg(long, default_value_t = 1e-8)]
    pub atol: f64,

    /// Optimizer iteration cap before falling back to default parameters.
    #[arg(long, default_value_t = 200)]
    pub max_iter: usize,
}

#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Output CSV (stdout when omitted).
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// First date of the series.
    #[arg(long, default_value = "2024-01-01")]
    pub start: NaiveDate,

    #[arg(long, default_value_t = 60)]
    pub days: usize,

    /// Transmission rate.
    #[arg(long, default_value_t = 0.5)]
    pub beta: f64,

    /// Recovery rate.
    #[arg(long, default_value_t = 0.1)]
    pub gamma: f64,

    /// Initially infected fraction.
    #[arg(long, default_value_t = 1e-4)]
    pub i0: f64,

    #[arg(long, default_value_t = 1e5)]
    pub population: f64,

    /// Log-scale noise standard deviation (0 for an exact curve).
    #[arg(long, default_value_t = 0.1)]
    pub noise: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Debug, Parser)]
pub struct ReportArgs {
    /// Run JSON produced by `epifit fit --json`.
    #[arg(value_name = "JSON")]
    pub run: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fit_defaults() {
        let cli = Cli::parse_from(["epifit", "fit", "cases.csv"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.csv, PathBuf::from("cases.csv"));
        assert_eq!(args.horizon, 7);
        assert_eq!(args.n_h, 1e6);
        assert_eq!(args.iv0, 1000.0);
        assert_eq!(args.numerics.method, OdeMethod::Auto);
        assert!(!args.no_sir && !args.no_rm);
        assert!(!cli.verbose);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["epifit", "simulate", "--days", "30", "-v"]);
        assert!(cli.verbose);
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.days, 30);
        assert_eq!(args.start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }
}
