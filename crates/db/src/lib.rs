//! SurrealDB connection factory and migration runner.

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use shelf_kernel::settings::DatabaseSettings;
use shelf_kernel::Migration;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

/// Shared database handle. Cloning is cheap and every clone talks to the same connection.
pub type Database = Surreal<Any>;

const MIGRATION_TABLE: &str = "_migration";

#[derive(Debug, Serialize, Deserialize)]
struct AppliedMigration {
    module: String,
    migration: String,
}

/// Connect, authenticate and select namespace/database, then verify the
/// server answers a health check.
pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<Database> {
    let endpoint = settings
        .endpoint
        .as_deref()
        .map(str::trim)
        .filter(|endpoint| !endpoint.is_empty())
        .ok_or_else(|| anyhow!("database.endpoint is not configured"))?;

    tracing::info!(target: "shelf-db", %endpoint, "connecting to SurrealDB");

    let db = any::connect(endpoint)
        .await
        .with_context(|| format!("failed to connect to SurrealDB at {endpoint}"))?;

    if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
        db.signin(Root {
            username: username.as_str(),
            password: password.as_str(),
        })
        .await
        .with_context(|| "failed to sign in to SurrealDB")?;
    }

    db.use_ns(&settings.namespace)
        .use_db(&settings.database)
        .await
        .with_context(|| {
            format!(
                "failed to select namespace '{}' / database '{}'",
                settings.namespace, settings.database
            )
        })?;

    db.health()
        .await
        .with_context(|| "database health check failed")?;

    tracing::info!(
        target: "shelf-db",
        namespace = %settings.namespace,
        database = %settings.database,
        "database connection ready"
    );
    Ok(db)
}

/// Apply every migration that has not been recorded yet. Returns the number applied.
pub async fn migrate(db: &Database, migrations: &[(String, Migration)]) -> anyhow::Result<usize> {
    db.query(format!("DEFINE TABLE IF NOT EXISTS {MIGRATION_TABLE} SCHEMALESS"))
        .await
        .and_then(|response| response.check())
        .with_context(|| "failed to prepare migration table")?;

    let mut applied = 0;
    for (module, migration) in migrations {
        let key = migration_key(module, migration);

        let existing: Option<AppliedMigration> = db
            .select((MIGRATION_TABLE, key.clone()))
            .await
            .with_context(|| format!("failed to look up migration {key}"))?;
        if existing.is_some() {
            tracing::debug!(target: "shelf-db", %key, "migration already applied");
            continue;
        }

        tracing::info!(target: "shelf-db", %module, migration = migration.id, "applying migration");

        db.query(migration.up)
            .await
            .and_then(|response| response.check())
            .with_context(|| format!("migration {key} failed"))?;

        let _: Option<AppliedMigration> = db
            .create((MIGRATION_TABLE, key.clone()))
            .content(AppliedMigration {
                module: module.clone(),
                migration: migration.id.to_string(),
            })
            .await
            .with_context(|| format!("failed to record migration {key}"))?;

        applied += 1;
    }

    Ok(applied)
}

fn migration_key(module: &str, migration: &Migration) -> String {
    format!("{}__{}", module, migration.id)
}
