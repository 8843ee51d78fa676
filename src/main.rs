use std::sync::Arc;

use anyhow::Context;
use shelf_app::modules::{self, ebooks};
use shelf_kernel::{settings::Settings, InitCtx, ModuleRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().with_context(|| "failed to load shelf settings")?;
    shelf_telemetry::init(&settings.telemetry)?;

    tracing::info!(
        env = ?settings.environment,
        storage = ?settings.storage.backend,
        "shelf-app bootstrap starting"
    );

    let db = shelf_db::connect(&settings.database)
        .await
        .with_context(|| "database is not reachable")?;
    let images = shelf_media::connect(&settings.storage)
        .await
        .with_context(|| "failed to set up the image store")?;

    let service = Arc::new(ebooks::EbookService::new(
        Arc::new(ebooks::SurrealEbookStore::new(db.clone())),
        images,
    ));

    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry, service, &settings);

    let ctx = InitCtx {
        settings: &settings,
    };
    registry.init_all(&ctx).await?;

    let applied = shelf_db::migrate(&db, &registry.collect_migrations()).await?;
    tracing::info!(applied, "migrations complete");

    registry.start_all(&ctx).await?;
    tracing::info!("shelf-app bootstrap complete");

    let served = shelf_http::start_server(&registry, &settings).await;
    registry.stop_all().await?;
    served
}
