//! rookery - Flow dispatch and result aggregation core
//!
//! A server-side core that tracks collection operations ("flows")
//! dispatched to remote agents and aggregates their per-target results.
//!
//! # Architecture
//!
//! The system is built around an append-only result log:
//! - Agent results are immutable records with ingestion-assigned sequence
//!   numbers
//! - Progress counters and per-type metadata are derived from the log,
//!   incrementally where possible, never the other way around
//! - Flow status is a small state machine owned by the execution engine
//!
//! # Modules
//!
//! - `core`: Aggregation logic (ResultStore, ProgressAggregator,
//!   ResultMetadataIndex, FlowService)
//! - `domain`: Data structures (FlowInstance, FlowResult, FlowProgress)
//! - `transport`: Agent transport boundary
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Start a flow
//! rookery start C.1234abcd collect-files --args '{"paths": ["/etc/hosts"]}'
//!
//! # Ingest a batch of agent results
//! rookery append <flow-id> results.json
//!
//! # Poll progress
//! rookery progress <flow-id>
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod transport;

// Re-export main types at crate root for convenience
pub use crate::core::{
    downloadable, FixedProgress, FlowService, ProgressAggregator, ProgressSource, ResultMetadata,
    ResultMetadataIndex, ResultPage, ResultStore, SeqRange, StoreError, StoreResult,
};
pub use crate::domain::{
    FlowInstance, FlowProgress, FlowResult, FlowStatus, FlowType, HashDigests, Outcome,
    ResultPayload, ResultType, StatEntry,
};
pub use crate::transport::{AgentTransport, QueuedTransport, ResultBatch};
