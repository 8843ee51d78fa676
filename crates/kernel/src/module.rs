use async_trait::async_trait;
use axum::Router;

/// Context handed to modules during the lifecycle hooks.
pub struct InitCtx<'a> {
    pub settings: &'a crate::settings::Settings,
}

/// SurrealQL migration contributed by a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub id: &'static str,
    pub up: &'static str,
}

/// Lifecycle trait implemented by every feature module of the service.
#[async_trait]
pub trait Module: Sync + Send {
    /// Unique name for this module, also used as its route prefix
    fn name(&self) -> &'static str;

    /// Called during startup, before migrations run
    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Router for this module's endpoints, mounted under `/api/{name}`.
    /// The router must already carry its state.
    fn routes(&self) -> Router {
        Router::new()
    }

    /// OpenAPI fragment (`paths` and `components`) merged into the served document
    fn openapi(&self) -> Option<serde_json::Value> {
        None
    }

    /// Migrations executed in the order returned
    fn migrations(&self) -> Vec<Migration> {
        vec![]
    }

    /// Called after migrations are applied
    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called during shutdown
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
