//! HTTP handlers for the ebooks module.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::json;
use shelf_http::error::AppError;
use shelf_media::ImageUpload;

use super::models::{CreateEbook, DeleteResponse, EbookPatch, EbookRecord, UpdateResponse};
use super::service::{EbookError, EbookService};
use crate::utils::non_blank;

type SharedService = Arc<EbookService>;

/// Routes mounted under `/api/ebooks`.
pub fn router(service: SharedService, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(list_ebooks).post(create_ebook))
        .route(
            "/{id}",
            get(get_ebook).put(update_ebook).delete(delete_ebook),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(service)
}

impl From<EbookError> for AppError {
    fn from(err: EbookError) -> Self {
        match err {
            EbookError::Validation { field, message } => AppError::validation(
                vec![json!({ "field": field, "error": message.clone() })],
                message,
            ),
            EbookError::NotFound(_) => AppError::not_found(err.to_string()),
            EbookError::Store(_) | EbookError::Media(_) => AppError::Internal(err.into()),
        }
    }
}

async fn list_ebooks(
    State(service): State<SharedService>,
) -> Result<Json<Vec<EbookRecord>>, AppError> {
    Ok(Json(service.list().await?))
}

async fn get_ebook(
    State(service): State<SharedService>,
    Path(id): Path<String>,
) -> Result<Json<EbookRecord>, AppError> {
    Ok(Json(service.get(&id).await?))
}

async fn create_ebook(
    State(service): State<SharedService>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<EbookRecord>), AppError> {
    let form = read_form(multipart).await?;
    let input = CreateEbook {
        title: form.title,
        book_link: form.book_link,
        image: form.image,
    };
    let record = run_to_completion(async move { service.create(input).await }).await?;

    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_ebook(
    State(service): State<SharedService>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<UpdateResponse>, AppError> {
    let form = read_form(multipart).await?;
    let patch = EbookPatch {
        title: form.title,
        book_link: form.book_link,
        image: form.image,
    };
    let updated = run_to_completion(async move { service.update(&id, patch).await }).await?;

    let warning = updated.previous_cover.warning();
    if let Some(warning) = &warning {
        tracing::warn!(id = %updated.record.id, %warning, "previous cover left behind");
    }

    Ok(Json(UpdateResponse {
        record: updated.record,
        warning,
    }))
}

async fn delete_ebook(
    State(service): State<SharedService>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = run_to_completion(async move { service.delete(&id).await }).await?;

    Ok(Json(DeleteResponse {
        message: "Ebook deleted successfully".to_string(),
        id: deleted.record.id,
        warning: deleted.cover.warning(),
    }))
}

/// Run a mutating service call on its own task. The task finishes even when
/// the request future is dropped by the timeout layer or a disconnect.
async fn run_to_completion<T, F>(operation: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, EbookError>> + Send + 'static,
    T: Send + 'static,
{
    let outcome = tokio::spawn(operation)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("ebook operation aborted: {e}")))?;
    Ok(outcome?)
}

/// Fields accepted by the create and update forms.
#[derive(Debug, Default)]
struct EbookForm {
    title: Option<String>,
    book_link: Option<String>,
    image: Option<ImageUpload>,
}

/// Read `title`, `bookLink` and `image` parts. Blank text and empty files
/// count as not supplied; other parts are ignored.
async fn read_form(mut multipart: Multipart) -> Result<EbookForm, AppError> {
    let mut form = EbookForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "title" => form.title = non_blank(Some(field.text().await.map_err(multipart_error)?)),
            "bookLink" => {
                form.book_link = non_blank(Some(field.text().await.map_err(multipart_error)?))
            }
            "image" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .or_else(|| {
                        file_name
                            .as_deref()
                            .and_then(|name| mime_guess::from_path(name).first())
                            .map(|mime| mime.to_string())
                    })
                    .unwrap_or_else(|| "application/octet-stream".to_string());

                let bytes = field.bytes().await.map_err(multipart_error)?;
                if bytes.is_empty() {
                    continue;
                }

                let mut upload = ImageUpload::new(bytes, content_type);
                if let Some(file_name) = file_name {
                    upload = upload.with_file_name(file_name);
                }
                form.image = Some(upload);
            }
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    Ok(form)
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::payload_too_large(err.body_text())
    } else {
        AppError::bad_request(err.body_text())
    }
}
