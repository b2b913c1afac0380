//! fanhash CLI: hash files with per-volume concurrency limits.

use clap::Parser;
use fanhash::ErrorReport;
use fanhash::engine::arg_parser::Cli;
use fanhash::engine::handle_run;
use fanhash::error::install_panic_hook;
use fanhash::utils::setup_logging;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    let start_time = Instant::now();
    install_panic_hook();
    let cli = Cli::parse();
    let code = match handle_run(&cli) {
        Ok(code) => code,
        Err(e) => {
            // Logging may not be up yet if settings failed to load.
            setup_logging(cli.verbose.unwrap_or(false));
            ErrorReport::fault(&e).log();
            ExitCode::FAILURE
        }
    };
    log::debug!("Total time: {:?}", start_time.elapsed());
    code
}
