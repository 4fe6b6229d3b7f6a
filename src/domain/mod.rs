//! Domain types for the rookery aggregation core.
//!
//! This module contains the core data structures:
//! - Flow: a dispatched operation and its status state machine
//! - Result: immutable typed per-target records
//! - Progress: archetype-specific counter sets

pub mod flow;
pub mod progress;
pub mod result;

// Re-export commonly used types
pub use flow::{FlowInstance, FlowStatus, FlowType, InvalidTransition};
pub use progress::FlowProgress;
pub use result::{
    FileCollectionRecord, FileFetchRecord, FileHashRecord, FlowResult, HashDigests,
    MalformedResult, Outcome, ResultPayload, ResultType, StatEntry,
};
