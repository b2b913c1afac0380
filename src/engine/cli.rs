//! CLI command handler: merge settings, discover, run the pipeline, report.

use anyhow::Result;
use log::{debug, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::FileDigests;
use crate::disk_detect::auto_partitions;
use crate::engine::arg_parser::Cli;
use crate::engine::consumer::ConsumerRegistry;
use crate::engine::progress::{ProgressCounters, ProgressDisplay};
use crate::engine::report::{Crc32Check, ExtensionCheck, ReportFormat, Reporter};
use crate::engine::settings::{Settings, mib_to_bytes};
use crate::engine::stream::RetryPolicy;
use crate::error::{DiscoveryError, ErrorReport, FileError};
use crate::pipeline::orchestrator::{PipelineConfig, RunSummary, consume_streams};
use crate::pipeline::partition::PartitionSet;
use crate::pipeline::provider::StreamProvider;
use crate::utils::config::StreamLimits;
use crate::utils::fanhash_toml::{apply_file_to_settings, load_fanhash_toml};
use crate::utils::{CancelToken, RunLog, load_skip_list, setup_logging};

/// Exit codes besides success and the generic failure of a process fault.
pub struct ExitCodes;

impl ExitCodes {
    /// At least one file could not be processed.
    pub const FILES_FAILED: u8 = 2;
    /// Interrupted before every file was processed.
    pub const CANCELLED: u8 = 130;
}

/// Overwrite settings with every flag given on the command line.
pub fn apply_cli_to_settings(cli: &Cli, settings: &mut Settings) -> Result<()> {
    if !cli.paths.is_empty() {
        settings.roots = cli.paths.clone();
    }
    if !cli.consumers.is_empty() {
        settings.consumers = cli.consumers.clone();
    }
    if let Some(spec) = &cli.concurrent {
        settings.partitions = Some(spec.parse()?);
    }
    if let Some(v) = cli.recursive {
        settings.recursive = v;
    }
    if let Some(v) = cli.follow_links {
        settings.follow_links = v;
    }
    if let Some(v) = cli.walk {
        settings.walk_mode = v;
    }
    if let Some(mib) = cli.buffer_length {
        settings.buffer_length = mib_to_bytes("--buffer-length", mib)?;
    }
    if let Some(mib) = cli.min_read {
        settings.read_window.min = mib_to_bytes("--min-read", mib)?;
    }
    if let Some(mib) = cli.max_read {
        settings.read_window.max = mib_to_bytes("--max-read", mib)?;
    }
    if let Some(v) = cli.retries {
        settings.max_retries = v;
    }
    if let Some(exts) = &cli.exts {
        settings.extensions = exts.parse()?;
    }
    if let Some(p) = &cli.skip_log {
        settings.skip_log = Some(p.clone());
    }
    if let Some(p) = &cli.processed_log {
        settings.processed_log = Some(p.clone());
    }
    if let Some(p) = &cli.done_log {
        settings.set_done_log(p.clone());
    }
    if let Some(s) = &cli.crc32_error_log {
        settings.crc32_error_log = Some(s.parse()?);
    }
    if let Some(p) = &cli.ext_diff_log {
        settings.ext_diff_log = Some(p.clone());
    }
    if let Some(v) = cli.print_hashes {
        settings.print_hashes = v;
    }
    if let Some(v) = cli.json {
        settings.json = v;
    }
    if let Some(v) = cli.progress {
        settings.progress = v;
    }
    if let Some(v) = cli.verbose {
        settings.verbose = v;
    }
    if let Some(spec) = &cli.null_stream {
        settings.null_stream = Some(spec.parse()?);
    }
    Ok(())
}

/// Defaults, then the config file, then the command line.
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::default();
    if let Some(file) = load_fanhash_toml(cli.config.as_deref())? {
        apply_file_to_settings(&file, &mut settings)?;
    }
    apply_cli_to_settings(cli, &mut settings)?;
    Ok(settings)
}

fn canonical_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    roots
        .iter()
        .map(|r| r.canonicalize().unwrap_or_else(|_| r.clone()))
        .collect()
}

/// Queue the work: synthetic streams, or every accepted file under the roots.
fn build_provider(settings: &Settings) -> Result<StreamProvider> {
    if let Some(test) = settings.null_stream {
        info!("Null stream workload {}", test);
        return Ok(StreamProvider::synthetic(
            test.count,
            test.length,
            test.parallel,
        ));
    }

    // Partitions match on absolute prefixes, and the run logs must name a file the same way
    // whatever partitions are in effect.
    let roots = canonical_roots(&settings.roots);
    let set: PartitionSet = match &settings.partitions {
        Some(set) => set.clone(),
        None => auto_partitions(&roots, &StreamLimits::current()),
    };
    info!("Concurrency: {}", set);

    let skip = match &settings.skip_log {
        Some(p) => load_skip_list(p)?,
        None => Default::default(),
    };
    if !skip.is_empty() {
        debug!("Skip list holds {} paths", skip.len());
    }

    let mut provider = StreamProvider::new(&set);
    let totals = provider.discover(
        &roots,
        &settings.discovery_opts(),
        &mut |path: &Path| {
            settings.extensions.accepts(path) && !skip.contains(&path.display().to_string())
        },
        &mut |e: DiscoveryError| ErrorReport::from(&e).log(),
    );
    info!(
        "Discovered {} files, {} bytes",
        totals.file_count, totals.total_bytes
    );
    Ok(provider)
}

fn exit_code(summary: &RunSummary, cancel: &CancelToken) -> ExitCode {
    if cancel.is_cancelled() {
        ExitCode::from(ExitCodes::CANCELLED)
    } else if summary.failed > 0 {
        ExitCode::from(ExitCodes::FILES_FAILED)
    } else {
        ExitCode::SUCCESS
    }
}

/// Run the CLI. Per-file failures are logged and reflected in the exit code; anything returned
/// as `Err` is a process-wide fault.
pub fn handle_run(cli: &Cli) -> Result<ExitCode> {
    let settings = load_settings(cli)?;
    setup_logging(settings.verbose);

    let registry = ConsumerRegistry::builtin();
    if settings.consumers.is_empty() {
        println!("Available block consumers:");
        print!("{}", registry);
        return Ok(ExitCode::SUCCESS);
    }
    let consumers = match registry.select(settings.consumers.as_slice()) {
        Ok(c) => c,
        Err(e) => {
            eprint!("Available block consumers:\n{}", registry);
            return Err(e.into());
        }
    };
    settings.validate()?;
    debug!("{:#?}", settings);

    let cancel = CancelToken::new();
    if let Err(e) = cancel.cancel_on_ctrlc() {
        warn!("Ctrl+C handler not installed: {:#}", e);
    }

    let provider = build_provider(&settings)?;
    let names: Vec<&str> = consumers.iter().map(|f| f.name()).collect();
    let progress = Arc::new(ProgressCounters::new(&names));
    let totals = provider.totals();
    progress.set_totals(totals.file_count, totals.total_bytes);

    let config = PipelineConfig {
        buffer_length: settings.buffer_length,
        window: settings.read_window,
        retry: RetryPolicy::new(settings.max_retries),
        ..PipelineConfig::new(consumers)
    };
    let processed_log = settings
        .processed_log
        .as_deref()
        .map(RunLog::open)
        .transpose()?;
    let mut reporter = Reporter::new(
        io::stdout().lock(),
        ReportFormat::from_flags(settings.print_hashes, settings.json),
        processed_log,
    );
    if let Some(log) = &settings.crc32_error_log {
        reporter = reporter.with_crc32_check(Crc32Check::open(log)?);
    }
    if let Some(path) = &settings.ext_diff_log {
        reporter = reporter.with_extension_check(ExtensionCheck::new(RunLog::open(path)?));
    }

    let display = settings
        .progress
        .then(|| ProgressDisplay::spawn(Arc::clone(&progress)));
    let result = consume_streams(
        &provider,
        &config,
        &cancel,
        &progress,
        &mut |digests: &FileDigests| reporter.report(digests),
        &mut |e: &FileError| ErrorReport::from(e).log(),
    );
    if let Some(display) = display {
        display.finish();
    }
    let summary = result?;
    reporter.flush()?;

    info!(
        "Done: {} completed, {} failed, {} cancelled, {} retries, {} bytes",
        summary.completed, summary.failed, summary.cancelled, summary.retried, summary.bytes
    );
    Ok(exit_code(&summary, &cancel))
}
