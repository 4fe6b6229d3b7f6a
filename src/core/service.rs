//! Flow service façade.
//!
//! The single entry point consumed by the presentation and orchestration
//! layers: starting flows, ingesting agent result batches, and serving the
//! cheap summary queries (status, progress, metadata, pagination).

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::IngestLimits;
use crate::domain::{
    FlowInstance, FlowProgress, FlowStatus, FlowType, MalformedResult, ResultPayload,
};

use super::aggregator::{ProgressAggregator, ProgressSource};
use super::gate;
use super::metadata::{ResultMetadata, ResultMetadataIndex};
use super::store::{ResultPage, ResultStore, SeqRange, StoreResult};

/// Service wiring the store, metadata index, aggregator, and gate together.
///
/// Flows proceed fully independently; nothing here coordinates across
/// flows.
pub struct FlowService {
    store: Arc<ResultStore>,
    index: ResultMetadataIndex,
    progress: Arc<dyn ProgressSource>,
    limits: IngestLimits,
}

impl FlowService {
    /// Create a service with the live progress aggregator
    pub fn new(store: Arc<ResultStore>) -> Self {
        let progress = Arc::new(ProgressAggregator::new(store.clone()));
        Self::with_progress_source(store, progress)
    }

    /// Create a service with an injected progress source
    pub fn with_progress_source(store: Arc<ResultStore>, progress: Arc<dyn ProgressSource>) -> Self {
        Self {
            index: ResultMetadataIndex::new(store.clone()),
            store,
            progress,
            limits: IngestLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: IngestLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    /// Start a new flow against an agent
    #[instrument(skip(self, args), fields(%client_id, %flow_type))]
    pub async fn start_flow(
        &self,
        client_id: &str,
        creator: &str,
        flow_type: FlowType,
        args: serde_json::Value,
    ) -> StoreResult<Uuid> {
        let flow = FlowInstance::new(client_id.to_string(), creator.to_string(), flow_type, args);
        self.store.create_flow(&flow).await?;
        info!(flow_id = %flow.id, "flow started");
        Ok(flow.id)
    }

    pub async fn get_flow(&self, flow_id: Uuid) -> StoreResult<FlowInstance> {
        self.store.get_flow(flow_id).await
    }

    pub async fn get_status(&self, flow_id: Uuid) -> StoreResult<FlowStatus> {
        Ok(self.store.get_flow(flow_id).await?.status)
    }

    /// Progress snapshot for a flow, via the configured source
    pub async fn get_progress(&self, flow_id: Uuid) -> StoreResult<FlowProgress> {
        let flow = self.store.get_flow(flow_id).await?;
        self.progress.progress(&flow).await
    }

    /// Ordered page of results; the page token comes from the previous page
    pub async fn list_results(
        &self,
        flow_id: Uuid,
        page_token: Option<u64>,
        page_size: usize,
    ) -> StoreResult<ResultPage> {
        // min-then-max instead of clamp: a configured limit of zero must
        // not panic, it degrades to single-result pages
        let page_size = page_size.min(self.limits.max_page_size).max(1);
        self.store.list_results(flow_id, page_token, page_size).await
    }

    pub async fn get_result_metadata(&self, flow_id: Uuid) -> StoreResult<ResultMetadata> {
        self.index.summarize(flow_id).await
    }

    /// Engine-only: transition a flow to Finished
    #[instrument(skip(self))]
    pub async fn mark_finished(&self, flow_id: Uuid) -> StoreResult<()> {
        let mut flow = self.store.get_flow(flow_id).await?;
        flow.mark_finished()?;
        self.store.update_flow(&flow).await?;
        info!("flow finished");
        Ok(())
    }

    /// Engine-only: transition a flow to Error.
    ///
    /// Independent of ingestion; does not wait for in-flight appends, and
    /// already-stored results stay readable.
    #[instrument(skip(self))]
    pub async fn mark_failed(&self, flow_id: Uuid) -> StoreResult<()> {
        let mut flow = self.store.get_flow(flow_id).await?;
        flow.mark_failed()?;
        self.store.update_flow(&flow).await?;
        warn!("flow failed");
        Ok(())
    }

    /// Engine-only: finalize the flow's result metadata
    pub async fn finalize_result_metadata(&self, flow_id: Uuid) -> StoreResult<()> {
        self.index.finalize(flow_id).await
    }

    /// Transport-only: ingest a batch of agent results.
    ///
    /// Permitted in any flow state, including after termination; late
    /// results still update progress and metadata but never revert a
    /// terminal status.
    #[instrument(skip(self, payloads), fields(batch = payloads.len()))]
    pub async fn append_results(
        &self,
        flow_id: Uuid,
        payloads: &[ResultPayload],
    ) -> StoreResult<SeqRange> {
        if payloads.len() > self.limits.max_batch_results {
            return Err(MalformedResult::new(format!(
                "batch of {} results exceeds limit {}",
                payloads.len(),
                self.limits.max_batch_results
            ))
            .into());
        }
        self.store.append_results(flow_id, payloads).await
    }

    /// May a client download this flow's collected artifacts right now?
    pub async fn downloadable(&self, flow_id: Uuid) -> StoreResult<bool> {
        let flow = self.store.get_flow(flow_id).await?;
        let metadata = self.index.summarize(flow_id).await?;
        Ok(gate::downloadable(&flow, &metadata))
    }

    /// List stored flows, newest first
    pub async fn list_flows(&self, limit: usize) -> StoreResult<Vec<FlowInstance>> {
        let mut flows = self.store.list_flows().await?;
        flows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        flows.truncate(limit);
        Ok(flows)
    }
}
