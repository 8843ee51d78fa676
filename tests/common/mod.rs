//! Helpers for driving the full HTTP stack against in-memory stores.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header::CONTENT_TYPE, Method, Request};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use shelf_app::modules::{self, ebooks};
use shelf_kernel::{settings::Settings, ModuleRegistry};
use shelf_media::{ImageStore, MemoryImageStore};

pub const BOUNDARY: &str = "shelf-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub images: Arc<MemoryImageStore>,
}

/// Build the application router exactly as `main.rs` does, with memory stores.
pub fn build_test_app(max_image_bytes: usize) -> TestApp {
    let mut settings = Settings::default();
    settings.storage.max_image_bytes = max_image_bytes;

    let images = Arc::new(MemoryImageStore::new());
    TestApp {
        router: build_router_with(&settings, images.clone()),
        images,
    }
}

/// Full router over a memory record store and the given image store.
pub fn build_router_with(settings: &Settings, images: Arc<dyn ImageStore>) -> Router {
    let service = Arc::new(ebooks::EbookService::new(
        Arc::new(ebooks::MemoryEbookStore::new()),
        images,
    ));

    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, service, settings);
    shelf_http::build_router(&registry, settings)
}

/// One part of a multipart form
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: Option<&'a str>,
        bytes: &'a [u8],
    },
}

pub fn png<'a>(bytes: &'a [u8]) -> Part<'a> {
    Part::File {
        name: "image",
        file_name: "cover.png",
        content_type: Some("image/png"),
        bytes,
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n"
                    )
                    .as_bytes(),
                );
                if let Some(content_type) = content_type {
                    body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
                }
                body.extend_from_slice(b"\r\n");
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(method: Method, uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
