//! Pipeline components: partitions, admission, discovery, stream provider and the worker driver.

pub mod admission;
pub mod discovery;
pub mod orchestrator;
pub mod partition;
pub mod provider;

pub use admission::{Acquire, AdmissionController, AdmissionSlot, AdmissionStats};
pub use discovery::{DiscoveryOpts, WalkMode};
pub use orchestrator::{
    FileEvent, PipelineConfig, PipelineHandles, RunSummary, consume_streams, run_pipeline,
};
pub use partition::{PartitionParseError, PartitionSet, PathPartition};
pub use provider::{FileOpener, NullOpener, ProvidedStream, StreamOpener, StreamProvider};
