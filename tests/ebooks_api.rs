//! Integration tests for the `/api/ebooks` endpoints.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use common::{
    body_json, build_router_with, build_test_app, empty_request, multipart_request, png, send,
    Part, TestApp,
};
use shelf_app::modules::ebooks::PLACEHOLDER_COVER_URL;
use shelf_kernel::settings::Settings;
use shelf_media::{ImageStore, ImageUpload, MediaError, MemoryImageStore, Removal, StoredImage};

const LIMIT: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Test: create, rename, delete, then the record is gone
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dune_lifecycle() {
    let app = build_test_app(LIMIT);

    let response = send(
        &app,
        multipart_request(
            Method::POST,
            "/api/ebooks",
            &[
                Part::Text("title", "Dune"),
                Part::Text("bookLink", "http://x/dune.pdf"),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["title"], "Dune");
    assert_eq!(created["imageUrl"], PLACEHOLDER_COVER_URL);
    assert!(created.get("imageRef").is_none());
    let id = created["id"].as_str().unwrap().to_string();

    let response = send(
        &app,
        multipart_request(
            Method::PUT,
            &format!("/api/ebooks/{id}"),
            &[Part::Text("title", "Dune 2")],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["title"], "Dune 2");
    assert_eq!(updated["bookLink"], "http://x/dune.pdf");
    assert_eq!(updated["imageUrl"], PLACEHOLDER_COVER_URL);

    let response = send(&app, empty_request(Method::DELETE, &format!("/api/ebooks/{id}"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let deleted = body_json(response).await;
    assert_eq!(deleted["id"], id.as_str());
    assert!(deleted["message"].is_string());
    assert!(deleted.get("warning").is_none());

    let response = send(&app, empty_request(Method::GET, &format!("/api/ebooks/{id}"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "not_found");
}

// ---------------------------------------------------------------------------
// Test: missing required fields are rejected before anything is stored
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_without_book_link_is_400() {
    let app = build_test_app(LIMIT);

    let response = send(
        &app,
        multipart_request(
            Method::POST,
            "/api/ebooks",
            &[Part::Text("title", "Dune"), Part::Text("bookLink", ""), png(&[1, 2, 3])],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "validation_error");
    assert_eq!(json["error"]["details"][0]["field"], "bookLink");

    assert!(app.images.is_empty().await);
    let list = body_json(send(&app, empty_request(Method::GET, "/api/ebooks")).await).await;
    assert_eq!(list, serde_json::json!([]));
}

#[tokio::test]
async fn non_multipart_body_is_400() {
    let app = build_test_app(LIMIT);
    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/api/ebooks")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(r#"{"title":"Dune"}"#))
        .unwrap();

    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: cover uploads, replacement and cleanup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_with_cover_stores_image() {
    let app = build_test_app(LIMIT);

    let response = send(
        &app,
        multipart_request(
            Method::POST,
            "/api/ebooks",
            &[
                Part::Text("title", "Dune"),
                Part::Text("bookLink", "http://x/dune.pdf"),
                png(&[0x89, 0x50, 0x4E, 0x47]),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;

    let image_ref = created["imageRef"].as_str().unwrap();
    assert!(image_ref.starts_with("ebook_covers/"));
    assert_eq!(created["imageUrl"], format!("memory://{image_ref}"));
    let (content_type, bytes) = app.images.get(image_ref).await.unwrap();
    assert_eq!(content_type, "image/png");
    assert_eq!(&bytes[..], &[0x89, 0x50, 0x4E, 0x47]);

    let id = created["id"].as_str().unwrap();
    let fetched =
        body_json(send(&app, empty_request(Method::GET, &format!("/api/ebooks/{id}"))).await).await;
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn content_type_is_guessed_from_file_name() {
    let app = build_test_app(LIMIT);

    let response = send(
        &app,
        multipart_request(
            Method::POST,
            "/api/ebooks",
            &[
                Part::Text("title", "Dune"),
                Part::Text("bookLink", "http://x/dune.pdf"),
                Part::File {
                    name: "image",
                    file_name: "cover.jpg",
                    content_type: None,
                    bytes: &[0xFF, 0xD8, 0xFF],
                },
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert!(created["imageRef"].as_str().unwrap().ends_with(".jpg"));
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let app = build_test_app(LIMIT);

    let response = send(
        &app,
        multipart_request(
            Method::POST,
            "/api/ebooks",
            &[
                Part::Text("title", "Dune"),
                Part::Text("bookLink", "http://x/dune.pdf"),
                Part::File {
                    name: "image",
                    file_name: "dune.pdf",
                    content_type: Some("application/pdf"),
                    bytes: b"%PDF-1.7",
                },
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["details"][0]["field"], "image");
    assert!(app.images.is_empty().await);
}

#[tokio::test]
async fn update_with_new_cover_releases_old_one() {
    let app = build_test_app(LIMIT);
    let created = body_json(
        send(
            &app,
            multipart_request(
                Method::POST,
                "/api/ebooks",
                &[
                    Part::Text("title", "Dune"),
                    Part::Text("bookLink", "http://x/dune.pdf"),
                    png(&[1]),
                ],
            ),
        )
        .await,
    )
    .await;
    let id = created["id"].as_str().unwrap();
    let old_ref = created["imageRef"].as_str().unwrap();

    let response = send(
        &app,
        multipart_request(
            Method::PUT,
            &format!("/api/ebooks/{id}"),
            &[Part::Text("title", ""), png(&[2])],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;

    let new_ref = updated["imageRef"].as_str().unwrap();
    assert_ne!(new_ref, old_ref);
    assert_eq!(updated["title"], "Dune");
    assert!(!app.images.contains(old_ref).await);
    assert!(app.images.contains(new_ref).await);
    assert_eq!(app.images.len().await, 1);
}

#[tokio::test]
async fn update_with_empty_form_changes_nothing() {
    let app = build_test_app(LIMIT);
    let created = body_json(
        send(
            &app,
            multipart_request(
                Method::POST,
                "/api/ebooks",
                &[
                    Part::Text("title", "Dune"),
                    Part::Text("bookLink", "http://x/dune.pdf"),
                    png(&[1]),
                ],
            ),
        )
        .await,
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let response = send(
        &app,
        multipart_request(
            Method::PUT,
            &format!("/api/ebooks/{id}"),
            &[Part::File {
                name: "image",
                file_name: "",
                content_type: Some("application/octet-stream"),
                bytes: &[],
            }],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, created);
}

#[tokio::test]
async fn delete_releases_cover() {
    let app = build_test_app(LIMIT);
    let created = body_json(
        send(
            &app,
            multipart_request(
                Method::POST,
                "/api/ebooks",
                &[
                    Part::Text("title", "Dune"),
                    Part::Text("bookLink", "http://x/dune.pdf"),
                    png(&[1]),
                ],
            ),
        )
        .await,
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let response = send(&app, empty_request(Method::DELETE, &format!("/api/ebooks/{id}"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.images.is_empty().await);
}

// ---------------------------------------------------------------------------
// Test: id handling and limits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_and_malformed_ids() {
    let app = build_test_app(LIMIT);
    let unknown = "0190a8d0-0000-7000-8000-000000000000";

    for method in [Method::GET, Method::DELETE] {
        let response = send(&app, empty_request(method.clone(), &format!("/api/ebooks/{unknown}"))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method}");

        let response = send(&app, empty_request(method.clone(), "/api/ebooks/not-a-uuid")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{method}");
    }

    let response = send(
        &app,
        multipart_request(
            Method::PUT,
            &format!("/api/ebooks/{unknown}"),
            &[Part::Text("title", "Dune 2")],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_upload_is_413() {
    let app = build_test_app(1024);
    let huge = vec![0u8; 256 * 1024];

    let response = send(
        &app,
        multipart_request(
            Method::POST,
            "/api/ebooks",
            &[
                Part::Text("title", "Dune"),
                Part::Text("bookLink", "http://x/dune.pdf"),
                png(&huge),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.images.is_empty().await);
}

#[tokio::test]
async fn list_returns_every_record() {
    let app = build_test_app(LIMIT);
    for title in ["Dune", "Hyperion"] {
        let response = send(
            &app,
            multipart_request(
                Method::POST,
                "/api/ebooks",
                &[Part::Text("title", title), Part::Text("bookLink", "http://x/book.pdf")],
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = send(&app, empty_request(Method::GET, "/api/ebooks")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let list = body_json(response).await;
    let titles: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles.len(), 2);
    assert!(titles.contains(&"Dune") && titles.contains(&"Hyperion"));
}

#[tokio::test]
async fn openapi_document_lists_ebook_routes() {
    let app = build_test_app(LIMIT);
    let response = send(&app, empty_request(Method::GET, "/docs/openapi.json")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let document = body_json(response).await;
    assert!(document["paths"]["/api/ebooks"]["post"].is_object());
    assert!(document["paths"]["/api/ebooks/{id}"]["delete"].is_object());
    assert!(document["components"]["schemas"]["Ebook"].is_object());
}

#[tokio::test]
async fn healthz_is_ok() {
    let app = build_test_app(LIMIT);
    let response = send(&app, empty_request(Method::GET, "/healthz")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Test: slow or failing image deletes
// ---------------------------------------------------------------------------

/// Memory image store whose deletes are slow or fail outright.
struct SluggishImages {
    inner: Arc<MemoryImageStore>,
    delete_delay: Duration,
    fail_delete: bool,
}

#[async_trait]
impl ImageStore for SluggishImages {
    fn backend(&self) -> &'static str {
        "sluggish"
    }

    async fn upload(&self, image: ImageUpload, namespace: &str) -> Result<StoredImage, MediaError> {
        self.inner.upload(image, namespace).await
    }

    async fn delete(&self, reference: &str) -> Result<Removal, MediaError> {
        tokio::time::sleep(self.delete_delay).await;
        if self.fail_delete {
            return Err(MediaError::Unavailable("delete refused".into()));
        }
        self.inner.delete(reference).await
    }
}

fn sluggish_app(request_timeout_ms: u64, delete_delay: Duration, fail_delete: bool) -> TestApp {
    let mut settings = Settings::default();
    settings.server.request_timeout_ms = request_timeout_ms;
    settings.storage.max_image_bytes = LIMIT;

    let images = Arc::new(MemoryImageStore::new());
    let store = Arc::new(SluggishImages {
        inner: images.clone(),
        delete_delay,
        fail_delete,
    });
    TestApp {
        router: build_router_with(&settings, store),
        images,
    }
}

async fn create_with_cover(app: &TestApp) -> serde_json::Value {
    let response = send(
        app,
        multipart_request(
            Method::POST,
            "/api/ebooks",
            &[
                Part::Text("title", "Dune"),
                Part::Text("bookLink", "http://x/dune.pdf"),
                png(&[1]),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

/// Poll until the memory store holds exactly `expected` images.
async fn wait_for_images(app: &TestApp, expected: usize) {
    for _ in 0..100 {
        if app.images.len().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "image store holds {} images, expected {expected}",
        app.images.len().await
    );
}

#[tokio::test]
async fn delete_still_releases_cover_after_request_timeout() {
    let app = sluggish_app(50, Duration::from_millis(300), false);
    let created = create_with_cover(&app).await;
    let id = created["id"].as_str().unwrap();

    let response = send(&app, empty_request(Method::DELETE, &format!("/api/ebooks/{id}"))).await;
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

    wait_for_images(&app, 0).await;
    let response = send(&app, empty_request(Method::GET, &format!("/api/ebooks/{id}"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_still_releases_old_cover_after_request_timeout() {
    let app = sluggish_app(50, Duration::from_millis(300), false);
    let created = create_with_cover(&app).await;
    let id = created["id"].as_str().unwrap();
    let old_ref = created["imageRef"].as_str().unwrap();

    let response = send(
        &app,
        multipart_request(Method::PUT, &format!("/api/ebooks/{id}"), &[png(&[2])]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

    wait_for_images(&app, 1).await;
    assert!(!app.images.contains(old_ref).await);
    let stored =
        body_json(send(&app, empty_request(Method::GET, &format!("/api/ebooks/{id}"))).await).await;
    assert!(app.images.contains(stored["imageRef"].as_str().unwrap()).await);
}

#[tokio::test]
async fn update_reports_cover_it_could_not_release() {
    let app = sluggish_app(15_000, Duration::ZERO, true);
    let created = create_with_cover(&app).await;
    let id = created["id"].as_str().unwrap();

    let response = send(
        &app,
        multipart_request(Method::PUT, &format!("/api/ebooks/{id}"), &[png(&[2])]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;

    assert_ne!(updated["imageRef"], created["imageRef"]);
    assert!(updated["warning"].as_str().unwrap().contains("delete refused"));

    let response = send(&app, empty_request(Method::DELETE, &format!("/api/ebooks/{id}"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["warning"].is_string());
}
