//! S3-compatible image store.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use shelf_kernel::settings::StorageSettings;
use uuid::Uuid;

use crate::{ImageStore, ImageUpload, MediaError, Removal, StoredImage};

/// Image store backed by an S3 bucket. The object key doubles as the image reference.
#[derive(Clone)]
pub struct S3ImageStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3ImageStore {
    pub async fn new(settings: &StorageSettings) -> anyhow::Result<Self> {
        let region = Region::new(settings.region.clone());

        let mut builder = match (&settings.access_key, &settings.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "shelf-media");
                aws_sdk_s3::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .region(region)
                    .credentials_provider(credentials)
            }
            // Fall back to the default provider chain (env, profile, instance role).
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };

        if let Some(endpoint) = &settings.endpoint {
            // Required for MinIO and other S3-compatible services
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Client::from_conf(builder.build());
        let bucket = settings.bucket.clone();

        match client.head_bucket().bucket(&bucket).send().await {
            Ok(_) => tracing::info!(target: "shelf-media", %bucket, "connected to S3 bucket"),
            Err(e) => tracing::warn!(
                target: "shelf-media",
                %bucket,
                error = %DisplayErrorContext(&e),
                "could not verify bucket; will attempt operations anyway"
            ),
        }

        Ok(Self {
            client,
            bucket,
            public_base_url: public_base_url(settings),
        })
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    fn backend(&self) -> &'static str {
        "s3"
    }

    async fn upload(&self, image: ImageUpload, namespace: &str) -> Result<StoredImage, MediaError> {
        let key = object_key(namespace, &image);
        let size = image.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(image.content_type)
            .body(ByteStream::from(image.bytes))
            .send()
            .await
            .map_err(|e| {
                let message = format!("put_object {key}: {}", DisplayErrorContext(&e));
                // A service error means S3 answered and refused the object
                if e.as_service_error().is_some() {
                    MediaError::Rejected(message)
                } else {
                    MediaError::Unavailable(message)
                }
            })?;

        tracing::debug!(target: "shelf-media", %key, size, "image uploaded");

        Ok(StoredImage {
            url: format!("{}/{}", self.public_base_url, key),
            reference: key,
        })
    }

    async fn delete(&self, reference: &str) -> Result<Removal, MediaError> {
        // S3 deletes are idempotent, so probe first to report objects that are already gone.
        if let Err(err) = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(reference)
            .send()
            .await
        {
            if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                return Ok(Removal::NotFound);
            }
            return Err(MediaError::Unavailable(format!(
                "head_object {reference}: {}",
                DisplayErrorContext(&err)
            )));
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(reference)
            .send()
            .await
            .map_err(|e| {
                MediaError::Unavailable(format!(
                    "delete_object {reference}: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(Removal::Deleted)
    }
}

fn object_key(namespace: &str, image: &ImageUpload) -> String {
    format!(
        "{}/{}.{}",
        namespace.trim_matches('/'),
        Uuid::now_v7(),
        image.extension()
    )
}

fn public_base_url(settings: &StorageSettings) -> String {
    if let Some(base) = &settings.public_base_url {
        return base.trim_end_matches('/').to_string();
    }
    match &settings.endpoint {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), settings.bucket),
        None => format!(
            "https://{}.s3.{}.amazonaws.com",
            settings.bucket, settings.region
        ),
    }
}
