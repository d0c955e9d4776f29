#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use http_body_util::BodyExt;
use lopdf::{dictionary, Document, Object, Stream};
use serde_json::Value;
use tower::ServiceExt;
use vdr_extract::config::AppConfig;
use vdr_extract::pdf::{LopdfEngine, PdfEngine};
use vdr_extract::processing::{JobStatus, LocalJobQueue, TaskHandler};
use vdr_extract::providers::MemoryObjectStore;
use vdr_extract::server::state::{start_local_workers, AppState};
use vdr_extract::VdrServer;

pub const BOUNDARY: &str = "vdr-test-boundary";

/// Router wired to an in-memory store and an in-process queue
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryObjectStore>,
    pub queue: Arc<LocalJobQueue>,
}

pub enum Workers {
    None,
    Real,
    Custom(Arc<dyn TaskHandler>),
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.queue.retry_intervals_secs = vec![0];
    config.queue.max_retries = 0;
    config.queue.workers_per_queue = Some(2);
    config
}

pub fn test_app(config: AppConfig, workers: Workers) -> TestApp {
    let store = Arc::new(MemoryObjectStore::new(64 * 1024));
    let queue = Arc::new(LocalJobQueue::from_config(&config.queue));
    let engine: Arc<dyn PdfEngine> = Arc::new(LopdfEngine::new());

    match workers {
        Workers::None => {}
        Workers::Real => {
            start_local_workers(&config, &queue, store.clone(), Arc::clone(&engine));
        }
        Workers::Custom(handler) => {
            queue.start_workers(handler, config.queue.worker_count());
        }
    }

    let state = AppState::from_parts(config, store.clone(), queue.clone(), engine);
    let router = VdrServer::with_state(state).build_router();
    TestApp {
        router,
        store,
        queue,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .expect("request builder must not fail"),
        )
        .await
    }

    pub async fn post(&self, uri: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .expect("request builder must not fail"),
        )
        .await
    }

    pub async fn upload(&self, pdf: &[u8], content_type: &str, pages_per_chunk: Option<&str>) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/docs/upload-split/async")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart_body(pdf, content_type, pages_per_chunk)))
                .expect("request builder must not fail"),
        )
        .await
    }

    /// Wait until a job reaches `status`
    pub async fn wait_for_job(&self, job_id: &str, status: JobStatus) {
        for _ in 0..500 {
            if self.queue.get(job_id).map(|r| r.status) == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "job {job_id} never reached {status}; last record: {:?}",
            self.queue.get(job_id)
        );
    }
}

pub fn multipart_body(pdf: &[u8], content_type: &str, pages_per_chunk: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"report.pdf\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(pdf);
    body.extend_from_slice(b"\r\n");
    if let Some(ppc) = pages_per_chunk {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"pages_per_chunk\"\r\n\r\n{ppc}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn body_bytes(response: Response<Body>) -> bytes::Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("response body must be readable")
        .to_bytes()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = body_bytes(response).await;
    let text = std::str::from_utf8(bytes.as_ref()).unwrap_or("<non-utf8>");
    serde_json::from_slice(bytes.as_ref()).unwrap_or_else(|err| panic!("invalid json: {err}; body={text}"))
}

/// A PDF with one Helvetica text line per page
pub fn build_pdf(page_texts: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.4");
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let pages_id = doc.new_object_id();

    let mut kids: Vec<Object> = Vec::new();
    for text in page_texts {
        let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("pdf must serialize");
    buffer
}
