//! # Paysaga Runtime
//!
//! The consuming side of the settlement saga.
//!
//! - [`choreographer`]: decides, for each decoded event, which projection
//!   writes, follow-up events and refresh signals it causes, then carries
//!   them out
//! - [`reader`]: tails one partition of the stream and feeds every record
//!   through the decode → log → choreograph pipeline
//! - [`metrics`]: Prometheus descriptions and recorders for the pipeline
//!
//! ## Example
//!
//! ```ignore
//! use paysaga_runtime::{Pipeline, ReaderConfig, SagaEnvironment, StreamReader};
//!
//! let env = SagaEnvironment::new(clock, ids, projections, publisher, notifier);
//! let pipeline = Pipeline::new(event_log, env);
//! let exit = StreamReader::new(source, pipeline, ReaderConfig::default()).run().await?;
//! ```

pub mod choreographer;
pub mod metrics;
pub mod reader;

pub use choreographer::{Choreographer, Effect, EffectError, Effects, SagaEnvironment};
pub use reader::{
    FirstPartition, FixedPartition, PartitionStrategy, Pipeline, ReaderConfig, ReaderExit,
    RecordOutcome, StreamReader,
};
