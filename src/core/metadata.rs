//! Per-type result counts for cheap summarization and download gating.
//!
//! Metadata is maintained by the store at append time and read back here
//! without ever touching result bodies, so summarization cost does not
//! depend on stored payload size.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::domain::ResultType;

use super::store::{ResultStore, StoreResult};

/// Per-type result counts plus the explicit finalization flag.
///
/// `is_set` is a signal from the execution engine, distinct from result
/// presence: a flow may hold results while its metadata is still open, and
/// completeness is never inferred from non-zero counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Count of stored results per type tag
    #[serde(default)]
    pub num_results_per_type: BTreeMap<ResultType, u64>,

    /// True once the execution engine has finalized the counts
    #[serde(default)]
    pub is_set: bool,
}

impl ResultMetadata {
    /// Count for one result type (zero if never seen)
    pub fn count(&self, result_type: ResultType) -> u64 {
        self.num_results_per_type
            .get(&result_type)
            .copied()
            .unwrap_or(0)
    }

    /// Record one stored result of the given type
    pub(crate) fn record(&mut self, result_type: ResultType) {
        *self.num_results_per_type.entry(result_type).or_insert(0) += 1;
    }
}

/// Read-side index over the store's metadata documents
pub struct ResultMetadataIndex {
    store: Arc<ResultStore>,
}

impl ResultMetadataIndex {
    pub fn new(store: Arc<ResultStore>) -> Self {
        Self { store }
    }

    /// Summarize a flow's results by type tag.
    ///
    /// A flow with zero ingested results yields an empty mapping with
    /// `is_set = false`.
    pub async fn summarize(&self, flow_id: Uuid) -> StoreResult<ResultMetadata> {
        self.store.metadata(flow_id).await
    }

    /// Finalize the metadata for a flow (engine-only signal). Idempotent.
    pub async fn finalize(&self, flow_id: Uuid) -> StoreResult<()> {
        debug!(%flow_id, "finalizing result metadata");
        self.store.finalize_metadata(flow_id).await
    }
}
