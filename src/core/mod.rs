//! Core aggregation logic.
//!
//! This module contains:
//! - ResultStore: append-only result logging
//! - ResultMetadataIndex: per-type counts and finalization
//! - ProgressAggregator: incremental archetype-specific counters
//! - FlowService: the external interface façade

pub mod aggregator;
pub mod gate;
pub mod metadata;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use aggregator::{FixedProgress, ProgressAggregator, ProgressSource};
pub use gate::downloadable;
pub use metadata::{ResultMetadata, ResultMetadataIndex};
pub use service::FlowService;
pub use store::{ResultPage, ResultStore, SeqRange, StoreError, StoreResult};
