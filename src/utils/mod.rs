pub mod cancel;
pub mod config;
pub mod fanhash_toml;
pub mod fd_limit;
pub mod logger;
pub mod run_logs;

pub use cancel::CancelToken;
pub use config::*;
pub use fd_limit::{FDS_PER_STREAM, cap_streams_by_fd_limit, max_open_fds};
pub use logger::setup_logging;
pub use run_logs::{RunLog, load_skip_list};
