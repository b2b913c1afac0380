use clap::Parser;
use std::path::PathBuf;

use crate::pipeline::discovery::WalkMode;

/// Hash many files at once, bounding concurrent reads per volume.
#[derive(Clone, Debug, Default, Parser)]
#[command(name = "fanhash")]
#[command(about = "Stream files through hash calculators with per-volume concurrency limits.")]
pub struct Cli {
    /// Files or directories to process.
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Block consumers to run, comma separated (e.g. CRC32,SHA1). Omit to list what is available.
    #[arg(long, short = 'c', value_delimiter = ',')]
    pub consumers: Vec<String>,

    /// Concurrency limits: `<global>:<path>,<count>;<path>,<count>`, with absolute paths.
    /// Default: one partition per volume.
    #[arg(long, value_name = "SPEC")]
    pub concurrent: Option<String>,

    /// Descend into subdirectories.
    #[arg(long, short = 'r', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub recursive: Option<bool>,

    /// Follow symbolic links.
    #[arg(long, short = 'f', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub follow_links: Option<bool>,

    /// Directory walker: serial, parallel, or auto (parallel on SSD).
    #[arg(long, value_enum)]
    pub walk: Option<WalkMode>,

    /// Buffer budget per concurrent stream, in MiB.
    #[arg(long, value_name = "MIB")]
    pub buffer_length: Option<usize>,

    /// Smallest read, in MiB.
    #[arg(long, value_name = "MIB")]
    pub min_read: Option<usize>,

    /// Largest read, in MiB.
    #[arg(long, value_name = "MIB")]
    pub max_read: Option<usize>,

    /// Retries after a failed read attempt.
    #[arg(long)]
    pub retries: Option<u32>,

    /// Extension filter: `mkv,mp4` to allow, `-tmp,part` to deny.
    #[arg(long, allow_hyphen_values = true)]
    pub exts: Option<String>,

    /// Skip files listed in this file (one path per line).
    #[arg(long, value_name = "FILE")]
    pub skip_log: Option<PathBuf>,

    /// Append the path of every successfully processed file here.
    #[arg(long, value_name = "FILE")]
    pub processed_log: Option<PathBuf>,

    /// Use one file as both skip log and processed log.
    #[arg(long, value_name = "FILE")]
    pub done_log: Option<PathBuf>,

    /// Append `CRC32 path` for files whose path does not match PATTERN (default `(?i)<CRC32>`,
    /// `<CRC32>` being the file's CRC32). Needs the CRC32 consumer.
    #[arg(long, value_name = "PATH[:PATTERN]")]
    pub crc32_error_log: Option<String>,

    /// Append `ext => detected<TAB>path` for files whose format does not fit their extension.
    /// Needs the FORMAT consumer.
    #[arg(long, value_name = "FILE")]
    pub ext_diff_log: Option<PathBuf>,

    /// Print `NAME => VALUE` lines for every processed file.
    #[arg(long, short = 'p', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub print_hashes: Option<bool>,

    /// Print one JSON object per processed file.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub json: Option<bool>,

    /// Show a progress bar on stderr.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub progress: Option<bool>,

    /// Diagnostic workload instead of files: `<count>:<length MiB>:<parallel>` zero-filled streams.
    #[arg(long, value_name = "SPEC")]
    pub null_stream: Option<String>,

    /// Config file. Default: `.fanhash.toml` in the current directory, if present.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}
