//! fanhash: stream many files through pluggable block consumers (hashes, format sniffers) with
//! concurrency bounded globally and per path prefix.

pub mod disk_detect;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use error::{AttemptError, ErrorReport, FileError, Phase};
pub use pipeline::RunSummary;
pub use utils::CancelToken;

use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::consumer::ConsumerRegistry;
use crate::engine::progress::ProgressCounters;
use crate::engine::stream::RetryPolicy;
use crate::error::DiscoveryError;
use crate::pipeline::discovery::DiscoveryOpts;
use crate::pipeline::orchestrator::{PipelineConfig, consume_streams};
use crate::pipeline::partition::PartitionSet;
use crate::pipeline::provider::StreamProvider;
use crate::utils::config::StreamLimits;

/// Result alias used by public fanhash API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single entry point: hash every file under `roots` with the consumers named in `opts`.
///
/// `on_file` is called on the calling thread, exactly once per successfully processed file, in
/// completion order. Per-file failures and traversal errors are logged and counted in the
/// returned [`RunSummary`]; only setup problems (unknown consumer, bad partition string, bad
/// read window, buffer allocation) are returned as `Err`.
///
/// ```ignore
/// let opts = fanhash::DigestOpts { consumers: vec!["SHA1".into()], ..Default::default() };
/// fanhash::digest_paths(&["/data"], &opts, |d| println!("{} {:?}", d.path.display(), d.get("SHA1")))?;
/// ```
pub fn digest_paths<P, F>(roots: &[P], opts: &DigestOpts, mut on_file: F) -> Result<RunSummary>
where
    P: AsRef<Path>,
    F: FnMut(&FileDigests),
{
    let consumers = ConsumerRegistry::builtin().select(opts.consumers.as_slice())?;
    opts.read_window.check()?;
    let roots: Vec<PathBuf> = roots.iter().map(|r| r.as_ref().to_path_buf()).collect();
    let set = match &opts.partitions {
        Some(spec) => spec.parse::<PartitionSet>()?,
        None => disk_detect::auto_partitions(&roots, &StreamLimits::current()),
    };
    debug!(
        "{} CONFIG: {:#?}, partitions {}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts,
        set
    );

    let mut provider = StreamProvider::new(&set);
    provider.discover(
        &roots,
        &DiscoveryOpts {
            recursive: opts.recursive,
            follow_links: opts.follow_links,
            ..Default::default()
        },
        &mut |_: &Path| true,
        &mut |e: DiscoveryError| ErrorReport::from(&e).log(),
    );

    let names: Vec<&str> = consumers.iter().map(|f| f.name()).collect();
    let progress = Arc::new(ProgressCounters::new(&names));
    let config = PipelineConfig {
        buffer_length: opts.buffer_length,
        window: opts.read_window,
        retry: RetryPolicy::new(opts.max_retries),
        ..PipelineConfig::new(consumers)
    };
    consume_streams(
        &provider,
        &config,
        &opts.cancel,
        &progress,
        &mut |digests: &FileDigests| {
            on_file(digests);
            Ok(())
        },
        &mut |e: &FileError| ErrorReport::from(e).log(),
    )
}
