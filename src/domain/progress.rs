//! Archetype-specific progress counter sets.
//!
//! Each flow archetype exposes its own counter shape; progress is a tagged
//! variant selected by the flow type, never a monolithic struct with unused
//! fields.

use serde::{Deserialize, Serialize};

use super::flow::FlowType;

/// Aggregated progress for one flow, derived from its result log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flow_type", rename_all = "snake_case")]
pub enum FlowProgress {
    /// Counters for collect-files flows
    CollectFiles {
        /// Targets whose latest record is still pending
        num_in_progress: u64,
        num_collected: u64,
        num_failed: u64,
        num_skipped: u64,
        /// Successful collections through the fallback raw access path,
        /// accumulated across all qualifying records
        num_raw_access_retries: u64,
    },

    /// Counters for hash-files flows
    HashFiles {
        num_in_progress: u64,
        num_hashed: u64,
        num_failed: u64,
        num_raw_access_retries: u64,
    },

    /// Counters for fetch-files flows
    FetchFiles {
        /// Targets waiting on the hash phase
        num_pending_hashes: u64,
        /// Targets hashed and waiting on content transfer
        num_pending_files: u64,
        num_skipped: u64,
        num_collected: u64,
        num_failed: u64,
    },
}

impl FlowProgress {
    /// All-zero counters for the given archetype
    pub fn zero(flow_type: FlowType) -> Self {
        match flow_type {
            FlowType::CollectFiles => FlowProgress::CollectFiles {
                num_in_progress: 0,
                num_collected: 0,
                num_failed: 0,
                num_skipped: 0,
                num_raw_access_retries: 0,
            },
            FlowType::HashFiles => FlowProgress::HashFiles {
                num_in_progress: 0,
                num_hashed: 0,
                num_failed: 0,
                num_raw_access_retries: 0,
            },
            FlowType::FetchFiles => FlowProgress::FetchFiles {
                num_pending_hashes: 0,
                num_pending_files: 0,
                num_skipped: 0,
                num_collected: 0,
                num_failed: 0,
            },
        }
    }

    /// The archetype this progress shape belongs to
    pub fn flow_type(&self) -> FlowType {
        match self {
            FlowProgress::CollectFiles { .. } => FlowType::CollectFiles,
            FlowProgress::HashFiles { .. } => FlowType::HashFiles,
            FlowProgress::FetchFiles { .. } => FlowType::FetchFiles,
        }
    }

    /// Total number of tracked targets (terminal + pending; retries are a
    /// separate accumulator and do not contribute)
    pub fn total(&self) -> u64 {
        match *self {
            FlowProgress::CollectFiles {
                num_in_progress,
                num_collected,
                num_failed,
                num_skipped,
                ..
            } => num_in_progress + num_collected + num_failed + num_skipped,
            FlowProgress::HashFiles {
                num_in_progress,
                num_hashed,
                num_failed,
                ..
            } => num_in_progress + num_hashed + num_failed,
            FlowProgress::FetchFiles {
                num_pending_hashes,
                num_pending_files,
                num_skipped,
                num_collected,
                num_failed,
            } => num_pending_hashes + num_pending_files + num_skipped + num_collected + num_failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_matches_flow_type() {
        for flow_type in [FlowType::CollectFiles, FlowType::HashFiles, FlowType::FetchFiles] {
            let progress = FlowProgress::zero(flow_type);
            assert_eq!(progress.flow_type(), flow_type);
            assert_eq!(progress.total(), 0);
        }
    }

    #[test]
    fn test_total_excludes_retries() {
        let progress = FlowProgress::CollectFiles {
            num_in_progress: 1,
            num_collected: 2,
            num_failed: 1,
            num_skipped: 0,
            num_raw_access_retries: 5,
        };
        assert_eq!(progress.total(), 4);
    }

    #[test]
    fn test_progress_serialization_tag() {
        let progress = FlowProgress::zero(FlowType::FetchFiles);
        let json = serde_json::to_string(&progress).unwrap();
        assert!(json.contains("\"flow_type\":\"fetch_files\""));

        let parsed: FlowProgress = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, progress);
    }
}
