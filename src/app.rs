//! Top-level application orchestration.
//!
//! `src/main.rs` only loads `.env` and maps the exit code; this module:
//! - parses CLI arguments and installs logging
//! - loads the case-count CSV and runs the fit pipeline
//! - prints the summary and forecast
//! - writes optional exports

use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Command, FitArgs, ReportArgs, SimulateArgs};
use crate::data::{OutbreakSpec, generate_outbreak};
use crate::domain::{FitSettings, PipelineConfig};
use crate::error::AppError;
use crate::io::{RunFile, load_dataset, read_run_json, write_dataset_csv_to, write_run_json};
use crate::math::{LsqOptions, OdeOptions};
use crate::models::SirParams;

pub mod pipeline;

/// Env var holding a `tracing` filter directive (e.g. `epifit=debug`).
pub const LOG_ENV: &str = "EPIFIT_LOG";

/// Entry point for the `epifit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    match cli.command {
        Command::Fit(args) => handle_fit(&args),
        Command::Simulate(args) => handle_simulate(&args),
        Command::Report(args) => handle_report(&args),
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<(), AppError> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::new(4, format!("Failed to initialize logging: {e}")))
}

fn handle_fit(args: &FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(args)?;
    let dataset = load_dataset(&args.csv)?;
    let bundle = pipeline::run(&dataset, &config)?;
    let forecasts = pipeline::forecast_bundle(&bundle, args.horizon)?;

    // Keep stdout clean for `--json -`.
    let json_to_stdout = args.json.as_deref().is_some_and(|p| p.as_os_str() == "-");
    if !json_to_stdout {
        println!("{}", crate::report::format_run_summary(&bundle, &forecasts));
    }

    if let Some(path) = &args.json {
        write_run_json(path, &RunFile::new(bundle, forecasts, args.horizon))?;
        if !json_to_stdout {
            info!(path = %path.display(), "run exported");
        }
    }

    Ok(())
}

fn handle_simulate(args: &SimulateArgs) -> Result<(), AppError> {
    let spec = OutbreakSpec {
        start: args.start,
        days: args.days,
        params: SirParams {
            beta: args.beta,
            gamma: args.gamma,
        },
        i0: args.i0,
        population: args.population,
        noise: args.noise,
        seed: args.seed,
    };
    let dataset = generate_outbreak(&spec)?;
    write_dataset_csv_to(args.out.as_deref(), &dataset)
}

fn handle_report(args: &ReportArgs) -> Result<(), AppError> {
    let run = read_run_json(&args.run)?;
    println!("{}", crate::report::format_run_summary(&run.bundle, &run.forecasts));
    Ok(())
}

/// Build the pipeline configuration from `fit` flags.
pub fn fit_config_from_args(args: &FitArgs) -> Result<PipelineConfig, AppError> {
    for (flag, value) in [("--n-h", args.n_h), ("--n-v", args.n_v), ("--iv0", args.iv0)] {
        if !(value.is_finite() && value >= 0.0) {
            return Err(AppError::new(2, format!("{flag} must be a finite, non-negative number.")));
        }
    }
    let numerics = &args.numerics;
    if !(numerics.rtol > 0.0 && numerics.atol > 0.0) {
        return Err(AppError::new(2, "Integrator tolerances must be > 0."));
    }
    if numerics.max_iter == 0 {
        return Err(AppError::new(2, "--max-iter must be > 0."));
    }

    Ok(PipelineConfig {
        use_sir: !args.no_sir,
        use_rm: !args.no_rm,
        n_h: args.n_h,
        n_v: args.n_v,
        iv0: args.iv0,
        date_col: args.date_col.clone(),
        case_col: args.case_col.clone(),
        fit: FitSettings {
            ode: OdeOptions {
                method: numerics.method,
                rtol: numerics.rtol,
                atol: numerics.atol,
                ..OdeOptions::default()
            },
            lsq: LsqOptions {
                max_iterations: numerics.max_iter,
                ..LsqOptions::default()
            },
        },
        ..PipelineConfig::default()
    })
}
