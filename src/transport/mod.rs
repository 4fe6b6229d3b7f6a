//! Agent transport boundary.
//!
//! The transport delivers batches of typed results per agent reporting
//! cycle. Delivery is at-least-once: duplicates are possible and the
//! aggregation core is expected to tolerate them.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::core::{FlowService, StoreResult};
use crate::domain::ResultPayload;

/// One delivered batch of results for a single flow
#[derive(Debug, Clone)]
pub struct ResultBatch {
    pub flow_id: Uuid,
    pub payloads: Vec<ResultPayload>,
}

/// Source of result batches from remote agents
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Human-readable transport name
    fn name(&self) -> &str;

    /// Next delivered batch; `None` once the stream is exhausted
    async fn next_batch(&self) -> StoreResult<Option<ResultBatch>>;
}

/// In-process transport fed from a queue.
///
/// Used by tests and the demo pump; a production deployment would put a
/// message bus behind the same trait.
pub struct QueuedTransport {
    name: String,
    batches: Mutex<VecDeque<ResultBatch>>,
}

impl QueuedTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            batches: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn push(&self, batch: ResultBatch) {
        self.batches.lock().await.push_back(batch);
    }
}

#[async_trait]
impl AgentTransport for QueuedTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_batch(&self) -> StoreResult<Option<ResultBatch>> {
        Ok(self.batches.lock().await.pop_front())
    }
}

/// Drain a transport into the service, returning the number of results
/// ingested.
///
/// Rejected batches (malformed payloads, unknown flows) are logged and
/// skipped; they are local failures and must not stall delivery for other
/// flows. Store-level failures propagate and halt the pump.
pub async fn pump(transport: &dyn AgentTransport, service: &FlowService) -> StoreResult<u64> {
    let mut ingested = 0u64;

    while let Some(batch) = transport.next_batch().await? {
        match service.append_results(batch.flow_id, &batch.payloads).await {
            Ok(_) => ingested += batch.payloads.len() as u64,
            Err(e) if !e.is_fatal() => {
                warn!(
                    transport = transport.name(),
                    flow_id = %batch.flow_id,
                    error = %e,
                    "dropping rejected batch"
                );
            }
            Err(e) => return Err(e),
        }
    }

    Ok(ingested)
}
