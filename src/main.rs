use std::process::ExitCode;

fn main() -> ExitCode {
    // A missing .env is fine; it only carries optional settings like EPIFIT_LOG.
    dotenvy::dotenv().ok();

    match epifit::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
