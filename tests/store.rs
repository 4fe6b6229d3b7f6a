//! Result Store Integration Tests
//!
//! Tests for append ordering, sequence assignment, pagination, and
//! cross-flow isolation.

use std::sync::Arc;

use rookery::domain::{FileCollectionRecord, Outcome, ResultPayload, StatEntry};
use rookery::{FlowService, FlowType, ResultStore, ResultType};
use tempfile::TempDir;
use uuid::Uuid;

async fn test_service() -> (FlowService, TempDir) {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(ResultStore::open(temp.path().join("flows")).await.unwrap());
    (FlowService::new(store), temp)
}

async fn start_collect_flow(service: &FlowService) -> Uuid {
    service
        .start_flow(
            "C.1234abcd",
            "analyst",
            FlowType::CollectFiles,
            serde_json::json!({"paths": ["/etc/hosts"]}),
        )
        .await
        .unwrap()
}

fn collected(path: &str) -> ResultPayload {
    ResultPayload::CollectedFile(FileCollectionRecord {
        stat: StatEntry::new(path).with_size(1),
        hash: None,
        outcome: Outcome::Collected,
        error: None,
        raw_access_retry: false,
    })
}

#[tokio::test]
async fn test_append_returns_assigned_range() {
    let (service, _temp) = test_service().await;
    let flow_id = start_collect_flow(&service).await;

    let range = service
        .append_results(flow_id, &[collected("/a"), collected("/b"), collected("/c")])
        .await
        .unwrap();

    assert_eq!(range.first, 0);
    assert_eq!(range.last, 2);
}

#[tokio::test]
async fn test_sequences_never_reused_across_batches() {
    let (service, _temp) = test_service().await;
    let flow_id = start_collect_flow(&service).await;

    for batch in 0..4 {
        let range = service
            .append_results(flow_id, &[collected(&format!("/file{}", batch))])
            .await
            .unwrap();
        assert_eq!(range.first, batch);
        assert_eq!(range.last, batch);
    }
}

#[tokio::test]
async fn test_pagination_reconstructs_exact_sequence() {
    let (service, _temp) = test_service().await;
    let flow_id = start_collect_flow(&service).await;

    let n = 23;
    let payloads: Vec<ResultPayload> = (0..n).map(|i| collected(&format!("/file{}", i))).collect();
    service.append_results(flow_id, &payloads).await.unwrap();

    // Read back in several arbitrary page sizes
    for page_size in [1, 3, 7, 10, 23, 40] {
        let mut seen = Vec::new();
        let mut token = None;

        loop {
            let page = service
                .list_results(flow_id, token, page_size)
                .await
                .unwrap();
            seen.extend(page.results.iter().map(|r| r.seq));
            match page.next_page_token {
                Some(t) => token = Some(t),
                None => break,
            }
        }

        let expected: Vec<u64> = (0..n as u64).collect();
        assert_eq!(seen, expected, "page_size {}", page_size);
    }
}

#[tokio::test]
async fn test_pagination_is_stable_across_appends() {
    let (service, _temp) = test_service().await;
    let flow_id = start_collect_flow(&service).await;

    service
        .append_results(flow_id, &[collected("/a"), collected("/b")])
        .await
        .unwrap();

    let first_page = service.list_results(flow_id, None, 2).await.unwrap();
    assert_eq!(first_page.results.len(), 2);

    // New results land after the token, never before it
    service.append_results(flow_id, &[collected("/c")]).await.unwrap();

    let next = service
        .list_results(flow_id, Some(first_page.results[1].seq), 10)
        .await
        .unwrap();
    assert_eq!(next.results.len(), 1);
    assert_eq!(next.results[0].payload.target_path(), "/c");
}

#[tokio::test]
async fn test_flows_are_isolated_under_interleaving() {
    let (service, _temp) = test_service().await;
    let flow_a = start_collect_flow(&service).await;
    let flow_b = start_collect_flow(&service).await;

    // Interleave appends across the two flows
    for i in 0..5 {
        service
            .append_results(flow_a, &[collected(&format!("/a{}", i))])
            .await
            .unwrap();
        service
            .append_results(flow_b, &[collected(&format!("/b{}", i))])
            .await
            .unwrap();
    }

    let page_a = service.list_results(flow_a, None, 100).await.unwrap();
    let page_b = service.list_results(flow_b, None, 100).await.unwrap();

    assert_eq!(page_a.results.len(), 5);
    assert_eq!(page_b.results.len(), 5);
    assert!(page_a
        .results
        .iter()
        .all(|r| r.flow_id == flow_a && r.payload.target_path().starts_with("/a")));
    assert!(page_b
        .results
        .iter()
        .all(|r| r.flow_id == flow_b && r.payload.target_path().starts_with("/b")));

    // Each flow numbers its own log independently
    assert_eq!(page_a.results[0].seq, 0);
    assert_eq!(page_b.results[0].seq, 0);
}

#[tokio::test]
async fn test_concurrent_appends_never_race_on_seqs() {
    let (service, _temp) = test_service().await;
    let service = Arc::new(service);
    let flow_id = start_collect_flow(&service).await;

    let mut handles = Vec::new();
    for task in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..5 {
                service
                    .append_results(flow_id, &[collected(&format!("/t{}/f{}", task, i))])
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let page = service.list_results(flow_id, None, 100).await.unwrap();
    assert_eq!(page.results.len(), 40);

    // Contiguous, strictly increasing, no duplicates
    let seqs: Vec<u64> = page.results.iter().map(|r| r.seq).collect();
    let expected: Vec<u64> = (0..40).collect();
    assert_eq!(seqs, expected);
}

#[tokio::test]
async fn test_summary_reads_stay_valid_during_appends() {
    let (service, _temp) = test_service().await;
    let service = Arc::new(service);
    let flow_id = start_collect_flow(&service).await;

    // Writers rewrite the counts document on every batch; lock-free
    // readers polling alongside must always see a whole document
    let writer = {
        let service = service.clone();
        tokio::spawn(async move {
            for i in 0..50 {
                service
                    .append_results(flow_id, &[collected(&format!("/file{}", i))])
                    .await
                    .unwrap();
            }
        })
    };
    let reader = {
        let service = service.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                service.get_result_metadata(flow_id).await.unwrap();
                service.get_status(flow_id).await.unwrap();
            }
        })
    };
    writer.await.unwrap();
    reader.await.unwrap();

    let metadata = service.get_result_metadata(flow_id).await.unwrap();
    assert_eq!(metadata.count(ResultType::CollectedFile), 50);
}

#[tokio::test]
async fn test_unknown_flow_operations() {
    let (service, _temp) = test_service().await;
    let missing = Uuid::new_v4();

    assert!(service.get_status(missing).await.is_err());
    assert!(service.get_progress(missing).await.is_err());
    assert!(service.list_results(missing, None, 10).await.is_err());
    assert!(service.get_result_metadata(missing).await.is_err());
    assert!(service.append_results(missing, &[collected("/a")]).await.is_err());
}
