//! env_logger setup: this crate at Info (Debug with `--verbose`), dependencies at Warn.

use colored::{ColoredString, Colorize};
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

fn level_tag(level: Level) -> Option<ColoredString> {
    match level {
        Level::Error => Some("ERROR".red()),
        Level::Warn => Some("WARN".yellow()),
        _ => None,
    }
}

/// Install the logger. Later calls are no-ops, so the CLI and tests may call it freely.
pub fn setup_logging(verbose: bool) {
    let crate_level = match verbose {
        true => LevelFilter::Debug,
        false => LevelFilter::Info,
    };
    let _ = Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), crate_level)
        .format(|buf, record| {
            let name = env!("CARGO_PKG_NAME").cyan();
            match level_tag(record.level()) {
                // Problems carry their module so the source is obvious in long runs.
                Some(tag) => writeln!(
                    buf,
                    "[{} {} {}] {}",
                    name,
                    tag,
                    record.target().white(),
                    record.args()
                ),
                None => writeln!(buf, "[{}] {}", name, record.args()),
            }
        })
        .try_init();
}
