//! Engine module: block pipeline, consumers, per-stream orchestration and the CLI surface

pub mod arg_parser;
pub mod block;
pub mod cli;
pub mod consumer;
pub mod fanout;
pub mod format;
pub mod hashing;
pub mod progress;
pub mod reader;
pub mod report;
pub mod settings;
pub mod stream;

// Re-export commonly used items
pub use arg_parser::Cli;
pub use block::{Block, BlockPool, PooledBuffer};
pub use cli::handle_run;
pub use consumer::{
    BlockConsumer, BlockConsumerFactory, ConsumerRegistry, ConsumerSet, InvalidConsumers,
};
pub use progress::{ProgressCounters, ProgressSnapshot};
pub use reader::{InvalidReadWindow, ReadWindow};
pub use settings::{ExtensionFilter, NullStreamTest, Settings, SettingsError};
pub use stream::{ReadOutcome, RetryPolicy, StreamOutcome, StreamState};
