//! Append-only result store with file-based persistence.
//!
//! Each flow owns a directory holding its instance record (`flow.json`),
//! its ordered result log (`results.jsonl`), and a per-type count document
//! (`metadata.json`). Results are stored as newline-delimited JSON for easy
//! debugging/inspection; counts are a cache and stay rederivable from the
//! log.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{FlowInstance, FlowResult, InvalidTransition, MalformedResult, ResultPayload};

use super::metadata::ResultMetadata;

/// Errors from the store and the operations layered on it
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown flow: {0}")]
    UnknownFlow(Uuid),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error(transparent)]
    MalformedResult(#[from] MalformedResult),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt result log {path}: undecodable line {line}")]
    Corrupt { path: PathBuf, line: usize },
}

impl StoreError {
    /// Store-level failures halt further ingestion for the flow; the
    /// rejection variants are local to one request and non-fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::Io(_) | StoreError::Serialization(_) | StoreError::Corrupt { .. }
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Sequence numbers assigned to one appended batch (inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqRange {
    pub first: u64,
    pub last: u64,
}

/// One page of results plus the token for the next page
#[derive(Debug, Clone)]
pub struct ResultPage {
    pub results: Vec<FlowResult>,
    pub next_page_token: Option<u64>,
}

/// Persisted metadata document: per-type counts plus the next sequence
/// number to assign. Updated under the flow's append lock.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct MetadataDoc {
    next_seq: u64,
    #[serde(flatten)]
    metadata: ResultMetadata,
}

/// Parsed view of one flow's result log. `valid_len` stops short of `len`
/// when the file ends in a torn record from an interrupted append.
#[derive(Debug)]
struct ScannedLog {
    results: Vec<FlowResult>,
    valid_len: u64,
    len: u64,
}

impl ScannedLog {
    fn next_seq(&self) -> u64 {
        self.results.last().map(|r| r.seq + 1).unwrap_or(0)
    }
}

/// File-based result store, one directory per flow
pub struct ResultStore {
    /// Directory containing all flow directories
    flows_dir: PathBuf,

    /// Per-flow append locks (single writer per flow)
    append_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ResultStore {
    /// Create or open a store rooted at the given directory
    pub async fn open(flows_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let flows_dir = flows_dir.into();
        fs::create_dir_all(&flows_dir).await?;
        Ok(Self {
            flows_dir,
            append_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Directory for all flows
    pub fn flows_dir(&self) -> &Path {
        &self.flows_dir
    }

    fn flow_dir(&self, flow_id: Uuid) -> PathBuf {
        self.flows_dir.join(flow_id.to_string())
    }

    fn flow_path(&self, flow_id: Uuid) -> PathBuf {
        self.flow_dir(flow_id).join("flow.json")
    }

    fn results_path(&self, flow_id: Uuid) -> PathBuf {
        self.flow_dir(flow_id).join("results.jsonl")
    }

    fn metadata_path(&self, flow_id: Uuid) -> PathBuf {
        self.flow_dir(flow_id).join("metadata.json")
    }

    async fn append_lock(&self, flow_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.append_locks.lock().await;
        locks.entry(flow_id).or_default().clone()
    }

    /// Persist a new flow record
    pub async fn create_flow(&self, flow: &FlowInstance) -> StoreResult<()> {
        let dir = self.flow_dir(flow.id);
        fs::create_dir_all(&dir).await?;
        self.write_json(&self.flow_path(flow.id), flow).await?;
        self.write_json(&self.metadata_path(flow.id), &MetadataDoc::default())
            .await?;
        Ok(())
    }

    /// Load a flow record
    pub async fn get_flow(&self, flow_id: Uuid) -> StoreResult<FlowInstance> {
        match fs::read(self.flow_path(flow_id)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::UnknownFlow(flow_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrite an existing flow record (status transitions)
    pub async fn update_flow(&self, flow: &FlowInstance) -> StoreResult<()> {
        // Must already exist; a rewrite never creates a flow
        self.get_flow(flow.id).await?;
        self.write_json(&self.flow_path(flow.id), flow).await
    }

    /// List all stored flows
    pub async fn list_flows(&self) -> StoreResult<Vec<FlowInstance>> {
        let mut flows = Vec::new();
        let mut entries = fs::read_dir(&self.flows_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(flow_id) = Uuid::parse_str(name) {
                    flows.push(self.get_flow(flow_id).await?);
                }
            }
        }

        Ok(flows)
    }

    /// Append a batch of results to a flow's log, assigning contiguous
    /// sequence numbers. The whole batch is validated before anything is
    /// written; a malformed payload rejects the batch without side effects.
    pub async fn append_results(
        &self,
        flow_id: Uuid,
        payloads: &[ResultPayload],
    ) -> StoreResult<SeqRange> {
        if payloads.is_empty() {
            return Err(MalformedResult::new("empty result batch").into());
        }

        let flow = self.get_flow(flow_id).await?;
        for payload in payloads {
            payload.validate()?;
            let result_type = payload.result_type();
            if !flow.flow_type.declared_result_types().contains(&result_type) {
                return Err(MalformedResult::new(format!(
                    "result type {} not declared by flow type {}",
                    result_type, flow.flow_type
                ))
                .into());
            }
        }

        let lock = self.append_lock(flow_id).await;
        let _guard = lock.lock().await;

        let mut doc = self.read_metadata_doc(flow_id).await?;
        let log = self.scan_log(flow_id).await?;

        // A torn tail is an append that died mid-record; it was never
        // acknowledged, so drop it before writing behind it
        if log.valid_len < log.len {
            let file = OpenOptions::new()
                .write(true)
                .open(self.results_path(flow_id))
                .await?;
            file.set_len(log.valid_len).await?;
        }

        // The log outranks the counts document. A crash between the record
        // writes below and the document rewrite leaves `next_seq` behind,
        // and trusting it would hand out sequence numbers the log already
        // holds. Records the document never saw get recounted here.
        let first = doc.next_seq.max(log.next_seq());
        for result in &log.results {
            if result.seq >= doc.next_seq {
                doc.metadata.record(result.payload.result_type());
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.results_path(flow_id))
            .await?;

        for (i, payload) in payloads.iter().enumerate() {
            let result = FlowResult {
                flow_id,
                seq: first + i as u64,
                timestamp: Utc::now(),
                payload: payload.clone(),
            };
            let json = serde_json::to_string(&result)?;
            // One whole line per write; readers only ever see complete
            // records or a skippable trailing fragment
            file.write_all(format!("{}\n", json).as_bytes()).await?;
            doc.metadata.record(payload.result_type());
        }
        file.flush().await?;

        doc.next_seq = first + payloads.len() as u64;
        self.write_json(&self.metadata_path(flow_id), &doc).await?;

        let range = SeqRange {
            first,
            last: doc.next_seq - 1,
        };
        debug!(%flow_id, first = range.first, last = range.last, "appended results");
        Ok(range)
    }

    /// Read all results with `seq >= from_seq`, in order
    pub async fn read_from(&self, flow_id: Uuid, from_seq: u64) -> StoreResult<Vec<FlowResult>> {
        self.get_flow(flow_id).await?;
        let results = self.load_results(flow_id).await?;
        Ok(results.into_iter().filter(|r| r.seq >= from_seq).collect())
    }

    /// Sequence number the next append will receive
    pub async fn next_seq(&self, flow_id: Uuid) -> StoreResult<u64> {
        self.get_flow(flow_id).await?;
        Ok(self.read_metadata_doc(flow_id).await?.next_seq)
    }

    /// Return an ordered page of results starting after `page_token`.
    ///
    /// Paging is stable because the log is append-only: a token taken from
    /// one page stays valid forever.
    pub async fn list_results(
        &self,
        flow_id: Uuid,
        page_token: Option<u64>,
        page_size: usize,
    ) -> StoreResult<ResultPage> {
        let from_seq = page_token.map(|t| t + 1).unwrap_or(0);
        let matching = self.read_from(flow_id, from_seq).await?;

        let has_more = matching.len() > page_size;
        let results: Vec<FlowResult> = matching.into_iter().take(page_size).collect();
        let next_page_token = if has_more {
            results.last().map(|r| r.seq)
        } else {
            None
        };

        Ok(ResultPage {
            results,
            next_page_token,
        })
    }

    /// Read the per-type counts and finalization flag for a flow.
    ///
    /// Touches only the counts document, never result bodies.
    pub async fn metadata(&self, flow_id: Uuid) -> StoreResult<ResultMetadata> {
        self.get_flow(flow_id).await?;
        Ok(self.read_metadata_doc(flow_id).await?.metadata)
    }

    /// Mark the flow's result metadata as finalized. Idempotent.
    pub async fn finalize_metadata(&self, flow_id: Uuid) -> StoreResult<()> {
        self.get_flow(flow_id).await?;

        // Serialize against concurrent count updates
        let lock = self.append_lock(flow_id).await;
        let _guard = lock.lock().await;

        let mut doc = self.read_metadata_doc(flow_id).await?;
        doc.metadata.is_set = true;
        self.write_json(&self.metadata_path(flow_id), &doc).await
    }

    async fn load_results(&self, flow_id: Uuid) -> StoreResult<Vec<FlowResult>> {
        Ok(self.scan_log(flow_id).await?.results)
    }

    async fn scan_log(&self, flow_id: Uuid) -> StoreResult<ScannedLog> {
        let path = self.results_path(flow_id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ScannedLog {
                    results: Vec::new(),
                    valid_len: 0,
                    len: 0,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let len = content.len() as u64;
        let segments: Vec<&str> = content.split('\n').collect();
        let last_idx = segments.len().saturating_sub(1);
        let mut results = Vec::new();
        let mut valid_len = 0u64;
        let mut offset = 0u64;

        for (idx, line) in segments.iter().enumerate() {
            let end = offset + line.len() as u64 + u64::from(idx < last_idx);
            if line.trim().is_empty() {
                offset = end;
                valid_len = end;
                continue;
            }
            match serde_json::from_str::<FlowResult>(line) {
                Ok(result) => {
                    results.push(result);
                    offset = end;
                    valid_len = end;
                }
                // A trailing fragment is an in-flight or interrupted
                // append, not yet visible; anywhere else it is corruption
                Err(_) if idx == last_idx => break,
                Err(_) => {
                    return Err(StoreError::Corrupt {
                        path,
                        line: idx + 1,
                    })
                }
            }
        }

        Ok(ScannedLog {
            results,
            valid_len,
            len,
        })
    }

    async fn read_metadata_doc(&self, flow_id: Uuid) -> StoreResult<MetadataDoc> {
        match fs::read(self.metadata_path(flow_id)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MetadataDoc::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrite a document so lock-free readers only ever see a whole
    /// file: write to a sibling temp file, then rename over the target.
    async fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(value)?;
        // Unique temp name: flow records are rewritten outside the append
        // lock, and two racing writers must not rename each other's file
        let tmp = path.with_extension(format!("tmp.{}", Uuid::new_v4().simple()));
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        FileCollectionRecord, FlowType, Outcome, ResultType, StatEntry,
    };
    use tempfile::TempDir;

    async fn test_store() -> (ResultStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = ResultStore::open(temp.path().join("flows")).await.unwrap();
        (store, temp)
    }

    fn test_flow() -> FlowInstance {
        FlowInstance::new(
            "C.1234".to_string(),
            "analyst".to_string(),
            FlowType::CollectFiles,
            serde_json::json!({"paths": ["/file0"]}),
        )
    }

    fn collected(path: &str) -> ResultPayload {
        ResultPayload::CollectedFile(FileCollectionRecord {
            stat: StatEntry::new(path),
            hash: None,
            outcome: Outcome::Collected,
            error: None,
            raw_access_retry: false,
        })
    }

    #[tokio::test]
    async fn test_append_assigns_contiguous_seqs() {
        let (store, _temp) = test_store().await;
        let flow = test_flow();
        store.create_flow(&flow).await.unwrap();

        let range = store
            .append_results(flow.id, &[collected("/a"), collected("/b")])
            .await
            .unwrap();
        assert_eq!(range, SeqRange { first: 0, last: 1 });

        let range = store
            .append_results(flow.id, &[collected("/c")])
            .await
            .unwrap();
        assert_eq!(range, SeqRange { first: 2, last: 2 });

        let results = store.read_from(flow.id, 0).await.unwrap();
        let seqs: Vec<u64> = results.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_append_to_unknown_flow() {
        let (store, _temp) = test_store().await;
        let err = store
            .append_results(Uuid::new_v4(), &[collected("/a")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownFlow(_)));
    }

    #[tokio::test]
    async fn test_undeclared_result_type_rejected() {
        let (store, _temp) = test_store().await;
        let flow = test_flow(); // collect_files flow
        store.create_flow(&flow).await.unwrap();

        let hash_payload = ResultPayload::FileHash(crate::domain::FileHashRecord {
            stat: StatEntry::new("/a"),
            hash: None,
            outcome: Outcome::Pending,
            error: None,
            raw_access_retry: false,
        });
        let err = store
            .append_results(flow.id, &[hash_payload])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MalformedResult(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_metadata_counts_follow_appends() {
        let (store, _temp) = test_store().await;
        let flow = test_flow();
        store.create_flow(&flow).await.unwrap();

        let meta = store.metadata(flow.id).await.unwrap();
        assert!(meta.num_results_per_type.is_empty());
        assert!(!meta.is_set);

        store
            .append_results(flow.id, &[collected("/a"), collected("/b")])
            .await
            .unwrap();

        let meta = store.metadata(flow.id).await.unwrap();
        assert_eq!(meta.count(ResultType::CollectedFile), 2);
        assert!(!meta.is_set);

        store.finalize_metadata(flow.id).await.unwrap();
        let meta = store.metadata(flow.id).await.unwrap();
        assert!(meta.is_set);
        assert_eq!(meta.count(ResultType::CollectedFile), 2);
    }

    #[tokio::test]
    async fn test_trailing_partial_line_is_invisible() {
        let (store, _temp) = test_store().await;
        let flow = test_flow();
        store.create_flow(&flow).await.unwrap();
        store.append_results(flow.id, &[collected("/a")]).await.unwrap();

        // Simulate an in-flight append: a torn record at the tail
        let path = store.results_path(flow.id);
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{\"flow_id\":\"trunc");
        std::fs::write(&path, content).unwrap();

        let results = store.read_from(flow.id, 0).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_append_recovers_when_counts_doc_lags_log() {
        let (store, _temp) = test_store().await;
        let flow = test_flow();
        store.create_flow(&flow).await.unwrap();
        store
            .append_results(flow.id, &[collected("/a"), collected("/b")])
            .await
            .unwrap();

        // Crash between the record writes and the counts rewrite: the log
        // holds both records but the document never advanced
        let path = store.metadata_path(flow.id);
        let stale = serde_json::to_vec_pretty(&MetadataDoc::default()).unwrap();
        std::fs::write(&path, stale).unwrap();

        let store = ResultStore::open(store.flows_dir()).await.unwrap();
        let range = store
            .append_results(flow.id, &[collected("/c")])
            .await
            .unwrap();
        assert_eq!(range, SeqRange { first: 2, last: 2 });

        let seqs: Vec<u64> = store
            .read_from(flow.id, 0)
            .await
            .unwrap()
            .iter()
            .map(|r| r.seq)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);

        // The records the document missed were recounted on the way
        let meta = store.metadata(flow.id).await.unwrap();
        assert_eq!(meta.count(ResultType::CollectedFile), 3);
    }

    #[tokio::test]
    async fn test_append_discards_torn_tail() {
        let (store, _temp) = test_store().await;
        let flow = test_flow();
        store.create_flow(&flow).await.unwrap();
        store.append_results(flow.id, &[collected("/a")]).await.unwrap();

        // An interrupted append leaves a fragment with no newline
        let path = store.results_path(flow.id);
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{\"flow_id\":\"trunc");
        std::fs::write(&path, content).unwrap();

        let range = store
            .append_results(flow.id, &[collected("/b")])
            .await
            .unwrap();
        assert_eq!(range, SeqRange { first: 1, last: 1 });

        let results = store.read_from(flow.id, 0).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].payload.target_path(), "/b");
    }

    #[tokio::test]
    async fn test_corrupt_middle_line_is_fatal() {
        let (store, _temp) = test_store().await;
        let flow = test_flow();
        store.create_flow(&flow).await.unwrap();
        store
            .append_results(flow.id, &[collected("/a"), collected("/b")])
            .await
            .unwrap();

        let path = store.results_path(flow.id);
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<&str> = content.lines().collect();
        lines[0] = "not json";
        std::fs::write(&path, format!("{}\n", lines.join("\n"))).unwrap();

        let err = store.read_from(flow.id, 0).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { line: 1, .. }));
        assert!(err.is_fatal());
    }
}
