//! Typed per-target result records.
//!
//! Results are immutable once stored. Each record carries the outcome for a
//! single target within a flow; the sequence number is assigned by the
//! store at append time, never by the agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A stored result with its ingestion-assigned position in the flow's log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowResult {
    /// The flow this result belongs to
    pub flow_id: Uuid,

    /// Position in the flow's append log, strictly increasing, never reused
    pub seq: u64,

    /// When the result was ingested
    pub timestamp: DateTime<Utc>,

    /// The typed payload
    pub payload: ResultPayload,
}

/// Result payload, tagged by result type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultPayload {
    /// One path collected (or not) by a collect-files flow
    CollectedFile(FileCollectionRecord),

    /// One path hashed (or not) by a hash-files flow
    FileHash(FileHashRecord),

    /// One path moving through the hash-then-transfer pipeline
    FetchedFile(FileFetchRecord),
}

impl ResultPayload {
    /// Type tag of this payload, used for metadata counts
    pub fn result_type(&self) -> ResultType {
        match self {
            ResultPayload::CollectedFile(_) => ResultType::CollectedFile,
            ResultPayload::FileHash(_) => ResultType::FileHash,
            ResultPayload::FetchedFile(_) => ResultType::FetchedFile,
        }
    }

    /// Target path this record reports on
    pub fn target_path(&self) -> &str {
        match self {
            ResultPayload::CollectedFile(r) => &r.stat.path,
            ResultPayload::FileHash(r) => &r.stat.path,
            ResultPayload::FetchedFile(r) => &r.stat.path,
        }
    }

    /// Outcome of this record
    pub fn outcome(&self) -> Outcome {
        match self {
            ResultPayload::CollectedFile(r) => r.outcome,
            ResultPayload::FileHash(r) => r.outcome,
            ResultPayload::FetchedFile(r) => r.outcome,
        }
    }

    /// Validate payload shape before it is allowed into the store
    pub fn validate(&self) -> Result<(), MalformedResult> {
        let (hash, outcome, error) = match self {
            ResultPayload::CollectedFile(r) => (&r.hash, r.outcome, &r.error),
            ResultPayload::FileHash(r) => (&r.hash, r.outcome, &r.error),
            ResultPayload::FetchedFile(r) => (&r.hash, r.outcome, &r.error),
        };

        if self.target_path().is_empty() {
            return Err(MalformedResult::new("empty target path"));
        }
        if outcome == Outcome::Failed && error.is_none() {
            return Err(MalformedResult::new("failed result without an error message"));
        }
        if let Some(digests) = hash {
            digests.validate()?;
        }
        Ok(())
    }
}

/// Result type tags declared by flow archetypes
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    CollectedFile,
    FileHash,
    FetchedFile,
}

impl std::fmt::Display for ResultType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResultType::CollectedFile => "collected_file",
            ResultType::FileHash => "file_hash",
            ResultType::FetchedFile => "fetched_file",
        };
        write!(f, "{}", name)
    }
}

/// Terminal or pending outcome of one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Artifact collected successfully
    Collected,

    /// Collection failed on the agent
    Failed,

    /// Target skipped (e.g. deduplicated against an earlier collection)
    Skipped,

    /// Agent is still working on this target
    Pending,
}

/// Stat record for a target path, as reported by the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatEntry {
    /// Absolute path on the agent
    pub path: String,

    /// File size in bytes (if known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Unix mode bits (if known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
}

impl StatEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: None,
            mode: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

/// Hash digests for a target, hex-encoded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HashDigests {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
}

impl HashDigests {
    pub fn sha256(digest: impl Into<String>) -> Self {
        Self {
            sha256: Some(digest.into()),
            ..Default::default()
        }
    }

    /// Check that every present digest is valid hex of the right width
    pub fn validate(&self) -> Result<(), MalformedResult> {
        for (name, value, bytes) in [
            ("sha256", &self.sha256, 32usize),
            ("sha1", &self.sha1, 20),
            ("md5", &self.md5, 16),
        ] {
            if let Some(digest) = value {
                let decoded = hex::decode(digest)
                    .map_err(|_| MalformedResult::new(format!("{} digest is not hex", name)))?;
                if decoded.len() != bytes {
                    return Err(MalformedResult::new(format!(
                        "{} digest has {} bytes, expected {}",
                        name,
                        decoded.len(),
                        bytes
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One path collected from an exact known location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCollectionRecord {
    pub stat: StatEntry,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<HashDigests>,

    pub outcome: Outcome,

    /// Error message when the outcome is Failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Record produced through the fallback raw device access path
    #[serde(default)]
    pub raw_access_retry: bool,
}

/// One path hashed in place
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHashRecord {
    pub stat: StatEntry,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<HashDigests>,

    pub outcome: Outcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub raw_access_retry: bool,
}

/// One path in a hash-then-transfer fetch.
///
/// A pending record without digests is waiting on the hash phase; a pending
/// record with digests is waiting on the content transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFetchRecord {
    pub stat: StatEntry,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<HashDigests>,

    pub outcome: Outcome,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload failed type/shape validation at append time
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed result: {reason}")]
pub struct MalformedResult {
    pub reason: String,
}

impl MalformedResult {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collected(path: &str) -> ResultPayload {
        ResultPayload::CollectedFile(FileCollectionRecord {
            stat: StatEntry::new(path).with_size(42),
            hash: Some(HashDigests::sha256(
                "9e8dc93e150021bb4752029ebbff51394aa36f069cf19901578e4f06017acdb5",
            )),
            outcome: Outcome::Collected,
            error: None,
            raw_access_retry: false,
        })
    }

    #[test]
    fn test_payload_serialization_roundtrip() {
        let payload = collected("/file0");
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"type\":\"collected_file\""));

        let parsed: ResultPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.result_type(), ResultType::CollectedFile);
        assert_eq!(parsed.target_path(), "/file0");
        assert_eq!(parsed.outcome(), Outcome::Collected);
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        assert!(collected("/file0").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_path() {
        let payload = ResultPayload::FileHash(FileHashRecord {
            stat: StatEntry::new(""),
            hash: None,
            outcome: Outcome::Pending,
            error: None,
            raw_access_retry: false,
        });
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_failure_without_error() {
        let payload = ResultPayload::CollectedFile(FileCollectionRecord {
            stat: StatEntry::new("/file1"),
            hash: None,
            outcome: Outcome::Failed,
            error: None,
            raw_access_retry: false,
        });
        let err = payload.validate().unwrap_err();
        assert!(err.reason.contains("without an error message"));
    }

    #[test]
    fn test_validate_rejects_bad_digest() {
        let bad = HashDigests {
            sha256: Some("zzzz".to_string()),
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let truncated = HashDigests {
            sha1: Some("6dd6be".to_string()),
            ..Default::default()
        };
        assert!(truncated.validate().is_err());

        let good = HashDigests {
            md5: Some("8b0a15eefe63fd41f8dc9dee01c5cf9a".to_string()),
            ..Default::default()
        };
        assert!(good.validate().is_ok());
    }
}
