mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use vdr_extract::config::StorageBackend;
use vdr_extract::processing::{JobQueue, JobStatus, Task, TaskHandler};
use vdr_extract::types::ExtractionRecord;
use vdr_extract::{AppState, Error, Result, VdrServer};

use common::{
    body_bytes, body_json, build_pdf, multipart_body, test_app, test_config, Workers, BOUNDARY,
};

fn job_ids(chunks: &Value) -> Vec<String> {
    chunks
        .as_array()
        .expect("chunks must be an array")
        .iter()
        .map(|c| c["job_id"].as_str().expect("job_id must be a string").to_string())
        .collect()
}

#[tokio::test]
async fn upload_split_track_and_extract() {
    let app = test_app(test_config(), Workers::Real);
    let pdf = build_pdf(&["alpha", "bravo", "charlie", "delta", "echo"]);

    let response = app.upload(&pdf, "application/pdf", Some("2")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    assert_eq!(body["status"], "queued");
    assert_eq!(body["total_pages"], 5);
    assert_eq!(body["pages_per_chunk"], 2);
    let doc_id = body["doc_id"].as_str().expect("doc_id").to_string();
    assert_eq!(body["manifest"], format!("docs/{doc_id}/manifest.json"));

    let ranges: Vec<(u64, u64)> = body["chunks"]
        .as_array()
        .expect("chunks")
        .iter()
        .map(|c| (c["start_page"].as_u64().unwrap(), c["end_page"].as_u64().unwrap()))
        .collect();
    assert_eq!(ranges, vec![(1, 2), (3, 4), (5, 5)]);
    assert_eq!(
        body["chunks"][2]["expected_key"],
        format!("docs/{doc_id}/chunks/chunk-0003.pdf")
    );

    for job_id in job_ids(&body["chunks"]) {
        app.wait_for_job(&job_id, JobStatus::Finished).await;
    }

    let status = body_json(app.get(&format!("/docs/{doc_id}/status")).await).await;
    assert_eq!(status["total_chunks"], 3);
    assert_eq!(status["progress_pct"], 100.0);
    assert_eq!(status["counts"]["finished"], 3);
    assert_eq!(status["chunks"][1]["range"], json!({"start_page": 3, "end_page": 4}));
    assert_eq!(status["manifest_key"], format!("docs/{doc_id}/manifest.json"));

    let ready = body_json(app.get(&format!("/docs/{doc_id}/chunks")).await).await;
    let ready_chunks = ready["ready_chunks"].as_array().expect("ready_chunks");
    assert_eq!(ready_chunks.len(), 3);

    let download = ready_chunks[0]["download_pdf"].as_str().expect("download_pdf");
    let response = app.get(download).await;
    assert_eq!(response.status(), StatusCode::OK);
    let chunk_pdf = body_bytes(response).await;
    let chunk_doc = lopdf::Document::load_mem(&chunk_pdf).expect("chunk must be a PDF");
    assert_eq!(chunk_doc.get_pages().len(), 2);

    let meta_url = ready_chunks[2]["download_meta"].as_str().expect("download_meta");
    let meta = body_json(app.get(meta_url).await).await;
    assert_eq!(meta["status"], "done");
    assert_eq!(meta["num_pages"], 1);

    let plan = body_json(app.post(&format!("/docs/extract/{doc_id}/async")).await).await;
    assert_eq!(plan["total_jobs"], 3);
    let extract_jobs: Vec<String> = plan["jobs"]
        .as_array()
        .expect("jobs")
        .iter()
        .map(|j| j["job_id"].as_str().expect("job_id").to_string())
        .collect();
    for job_id in &extract_jobs {
        app.wait_for_job(job_id, JobStatus::Finished).await;
    }

    let jsonl_key = plan["jobs"][1]["out_jsonl_key"].as_str().expect("out_jsonl_key");
    assert_eq!(jsonl_key, format!("docs/{doc_id}/texts/chunk-0002.jsonl"));
    let response = app.get(&format!("/files/proxy?key={jsonl_key}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let raw = body_bytes(response).await;
    let records: Vec<ExtractionRecord> = std::str::from_utf8(&raw)
        .expect("jsonl must be utf-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("record must parse"))
        .collect();
    let pages: Vec<u32> = records.iter().map(|r| r.page_no).collect();
    assert_eq!(pages, vec![3, 4]);
    assert!(records[0].combined_markdown.contains("charlie"));
}

/// Handler whose every attempt fails
struct AlwaysFails(AtomicUsize);

#[async_trait]
impl TaskHandler for AlwaysFails {
    async fn handle(&self, _task: &Task) -> Result<Value> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(Error::Pdf("engine crashed".to_string()))
    }
}

#[tokio::test]
async fn retry_failed_redispatches_failed_chunks() {
    let handler = Arc::new(AlwaysFails(AtomicUsize::new(0)));
    let app = test_app(test_config(), Workers::Custom(handler.clone()));
    let pdf = build_pdf(&["one", "two", "three"]);

    let body = body_json(app.upload(&pdf, "application/pdf", Some("1")).await).await;
    let doc_id = body["doc_id"].as_str().expect("doc_id").to_string();
    let first_jobs = job_ids(&body["chunks"]);
    for job_id in &first_jobs {
        app.wait_for_job(job_id, JobStatus::Failed).await;
    }

    let status = body_json(app.get(&format!("/docs/{doc_id}/status")).await).await;
    assert_eq!(status["counts"]["failed"], 3);
    assert_eq!(status["progress_pct"], 0.0);

    let ready = body_json(app.get(&format!("/docs/{doc_id}/chunks")).await).await;
    assert_eq!(ready["ready_chunks"], json!([]));

    let response = app.post(&format!("/docs/{doc_id}/retry-failed")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let retry = body_json(response).await;
    let retried = retry["retried"].as_array().expect("retried");
    assert_eq!(retried.len(), 3);

    let new_jobs: Vec<String> = retried
        .iter()
        .map(|r| r["new_job_id"].as_str().expect("new_job_id").to_string())
        .collect();
    for (old, new) in first_jobs.iter().zip(&new_jobs) {
        assert_ne!(old, new);
    }

    let status = body_json(app.get(&format!("/docs/{doc_id}/status")).await).await;
    assert_eq!(job_ids(&status["chunks"]), new_jobs);

    for job_id in &new_jobs {
        app.wait_for_job(job_id, JobStatus::Failed).await;
    }
    assert_eq!(handler.0.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn server_state_runs_its_own_workers() {
    let mut config = test_config();
    config.storage.backend = StorageBackend::Memory;
    let state = AppState::new(config).await.expect("state must build");
    let router = VdrServer::with_state(state.clone()).build_router();

    let pdf = build_pdf(&["one", "two", "three"]);
    let request = Request::builder()
        .method("POST")
        .uri("/docs/upload-split/async")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(&pdf, "application/pdf", Some("1"))))
        .expect("request builder must not fail");
    let response = router.oneshot(request).await.expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    for job_id in job_ids(&body["chunks"]) {
        let mut status = JobStatus::Unknown;
        for _ in 0..500 {
            status = state.queue().fetch_status(&job_id).await.expect("job is tracked");
            if status == JobStatus::Finished {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, JobStatus::Finished, "job {job_id}");
    }
}

#[tokio::test]
async fn retry_failed_without_failures_is_a_no_op() {
    let app = test_app(test_config(), Workers::None);
    let pdf = build_pdf(&["one", "two"]);
    let body = body_json(app.upload(&pdf, "application/pdf", None).await).await;
    let doc_id = body["doc_id"].as_str().expect("doc_id");

    let retry = body_json(app.post(&format!("/docs/{doc_id}/retry-failed")).await).await;
    assert_eq!(retry, json!({"doc_id": doc_id, "retried": []}));

    let status = body_json(app.get(&format!("/docs/{doc_id}/status")).await).await;
    assert_eq!(status["counts"]["queued"], 1);
    assert_eq!(status["total_chunks"], 1);
}

#[tokio::test]
async fn oversize_upload_is_rejected_before_storage() {
    let mut config = test_config();
    config.server.max_upload_bytes = 1024;
    let app = test_app(config, Workers::None);

    let response = app.upload(&vec![b'%'; 4096], "application/pdf", None).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "payload_too_large");

    assert_eq!(app.store.call_count(), 0);
    assert!(app.store.keys().is_empty());
}

#[tokio::test]
async fn upload_validation_errors() {
    let app = test_app(test_config(), Workers::None);
    let pdf = build_pdf(&["one"]);

    let response = app.upload(&pdf, "text/plain", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["type"], "validation_error");

    for ppc in ["0", "201", "many"] {
        let response = app.upload(&pdf, "application/pdf", Some(ppc)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "pages_per_chunk={ppc}");
    }

    let response = app.upload(b"not a pdf at all", "application/octet-stream", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["type"], "invalid_pdf");

    assert!(app.store.keys().is_empty());
}

#[tokio::test]
async fn unknown_document_is_not_found() {
    let app = test_app(test_config(), Workers::None);

    for uri in ["/docs/missing/status", "/docs/missing/chunks"] {
        let response = app.get(uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body_json(response).await["error"]["type"], "not_found");
    }
    for uri in ["/docs/missing/retry-failed", "/docs/extract/missing/async"] {
        assert_eq!(app.post(uri).await.status(), StatusCode::NOT_FOUND, "{uri}");
    }

    let response = app.get("/docs/bad.id/status").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_check_reports_up() {
    let app = test_app(test_config(), Workers::None);
    let response = app.get("/health-check").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "up"}));
}
