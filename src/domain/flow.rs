//! Flow instances and their status state machine.
//!
//! A flow is a single collection operation dispatched to a remote agent,
//! covering one or more targets (paths to collect, hash, or fetch).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::result::ResultType;

/// A dispatched collection operation tracked by the server.
///
/// The flow record is owned by the orchestration engine; the aggregation
/// core reads its status and changes it only through the explicit
/// transition methods below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowInstance {
    /// Unique identifier for this flow
    pub id: Uuid,

    /// The agent endpoint this flow was dispatched to
    pub client_id: String,

    /// Username that started the flow
    pub creator: String,

    /// Archetype of this flow (selects result types and progress shape)
    pub flow_type: FlowType,

    /// Flow arguments, opaque to the aggregation core
    pub args: serde_json::Value,

    /// Current status
    pub status: FlowStatus,

    /// When the flow was started
    pub created_at: DateTime<Utc>,

    /// When the flow reached a terminal status (if it has)
    pub finished_at: Option<DateTime<Utc>>,
}

impl FlowInstance {
    /// Create a new flow in the Running state
    pub fn new(client_id: String, creator: String, flow_type: FlowType, args: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            creator,
            flow_type,
            args,
            status: FlowStatus::Running,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Transition to Finished.
    ///
    /// Idempotent if already Finished; rejects the transition if the flow
    /// has already failed.
    pub fn mark_finished(&mut self) -> Result<(), InvalidTransition> {
        self.transition(FlowStatus::Finished)
    }

    /// Transition to Error.
    ///
    /// Idempotent if already in Error; rejects the transition if the flow
    /// has already finished successfully.
    pub fn mark_failed(&mut self) -> Result<(), InvalidTransition> {
        self.transition(FlowStatus::Error)
    }

    fn transition(&mut self, to: FlowStatus) -> Result<(), InvalidTransition> {
        if self.status == to {
            // Already in the target terminal state
            return Ok(());
        }
        if self.status.is_terminal() {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Check if the flow is still accepting a status change
    pub fn is_running(&self) -> bool {
        self.status == FlowStatus::Running
    }
}

/// Status of a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    /// Dispatched and accepting results
    Running,

    /// Completed successfully (terminal)
    Finished,

    /// Failed (terminal)
    Error,
}

impl FlowStatus {
    /// Terminal states never transition out
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowStatus::Finished | FlowStatus::Error)
    }
}

impl Default for FlowStatus {
    fn default() -> Self {
        Self::Running
    }
}

/// Attempted status change conflicting with a terminal state
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid status transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: FlowStatus,
    pub to: FlowStatus,
}

/// Flow archetypes.
///
/// The archetype declares which result types the flow may ingest, which of
/// those are collectible (downloadable artifacts), and which progress
/// counter shape it exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    /// Collect file contents from exact known paths
    CollectFiles,

    /// Hash files without transferring their contents
    HashFiles,

    /// Two-phase fetch: hash first, then transfer contents
    FetchFiles,
}

impl FlowType {
    /// Result types this archetype may ingest
    pub fn declared_result_types(&self) -> &'static [ResultType] {
        match self {
            FlowType::CollectFiles => &[ResultType::CollectedFile],
            FlowType::HashFiles => &[ResultType::FileHash],
            FlowType::FetchFiles => &[ResultType::FetchedFile],
        }
    }

    /// Result types whose stored artifacts a client may download
    pub fn collectible_types(&self) -> &'static [ResultType] {
        match self {
            FlowType::CollectFiles => &[ResultType::CollectedFile],
            FlowType::HashFiles => &[],
            FlowType::FetchFiles => &[ResultType::FetchedFile],
        }
    }
}

impl std::fmt::Display for FlowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlowType::CollectFiles => "collect_files",
            FlowType::HashFiles => "hash_files",
            FlowType::FetchFiles => "fetch_files",
        };
        write!(f, "{}", name)
    }
}
