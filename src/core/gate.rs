//! Download availability gate.

use crate::domain::{FlowInstance, FlowStatus};

use super::metadata::ResultMetadata;

/// Decide whether a client may retrieve the collected artifacts of a flow.
///
/// Pure predicate over the current flow status and metadata; recomputed on
/// every query, never cached across a status change. Requires the flow to
/// have finished successfully, the metadata to be explicitly finalized, and
/// at least one collectible result to exist.
pub fn downloadable(flow: &FlowInstance, metadata: &ResultMetadata) -> bool {
    flow.status == FlowStatus::Finished
        && metadata.is_set
        && flow
            .flow_type
            .collectible_types()
            .iter()
            .any(|t| metadata.count(*t) > 0)
}
