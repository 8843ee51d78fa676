pub mod models;
pub mod routes;
pub mod service;
pub mod store;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use serde_json::json;
use shelf_kernel::{InitCtx, Migration, Module};

pub use models::{EbookId, EbookRecord, PLACEHOLDER_COVER_URL};
pub use service::{EbookError, EbookService, COVER_NAMESPACE};
pub use store::{EbookStore, MemoryEbookStore, SurrealEbookStore};

/// Room for the text parts and multipart framing on top of the image itself
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Ebook records with cover images, served under `/api/ebooks`
pub struct EbooksModule {
    service: Arc<EbookService>,
    body_limit: usize,
}

impl EbooksModule {
    pub fn new(service: Arc<EbookService>, max_image_bytes: usize) -> Self {
        Self {
            service,
            body_limit: max_image_bytes.saturating_add(FORM_OVERHEAD_BYTES),
        }
    }
}

#[async_trait]
impl Module for EbooksModule {
    fn name(&self) -> &'static str {
        "ebooks"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            body_limit = self.body_limit,
            "ebooks module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.service.clone(), self.body_limit)
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let error = json!({
            "description": "Error",
            "content": {
                "application/json": {
                    "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                }
            }
        });
        let id_param = json!({
            "name": "id",
            "in": "path",
            "required": true,
            "schema": { "type": "string", "format": "uuid" }
        });
        let record = json!({
            "description": "Ebook",
            "content": {
                "application/json": {
                    "schema": { "$ref": "#/components/schemas/Ebook" }
                }
            }
        });

        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List ebooks",
                        "tags": ["Ebooks"],
                        "responses": {
                            "200": {
                                "description": "All ebooks",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "array",
                                            "items": { "$ref": "#/components/schemas/Ebook" }
                                        }
                                    }
                                }
                            },
                            "500": error
                        }
                    },
                    "post": {
                        "summary": "Create an ebook",
                        "tags": ["Ebooks"],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "multipart/form-data": {
                                    "schema": { "$ref": "#/components/schemas/EbookForm" }
                                }
                            }
                        },
                        "responses": {
                            "201": record,
                            "400": error,
                            "500": error
                        }
                    }
                },
                "/{id}": {
                    "get": {
                        "summary": "Get an ebook",
                        "tags": ["Ebooks"],
                        "parameters": [id_param],
                        "responses": {
                            "200": record,
                            "400": error,
                            "404": error
                        }
                    },
                    "put": {
                        "summary": "Update an ebook; omitted or blank fields keep their value",
                        "tags": ["Ebooks"],
                        "parameters": [id_param],
                        "requestBody": {
                            "content": {
                                "multipart/form-data": {
                                    "schema": { "$ref": "#/components/schemas/EbookForm" }
                                }
                            }
                        },
                        "responses": {
                            "200": {
                                "description": "Updated ebook",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/EbookUpdated" }
                                    }
                                }
                            },
                            "400": error,
                            "404": error,
                            "500": error
                        }
                    },
                    "delete": {
                        "summary": "Delete an ebook and its cover",
                        "tags": ["Ebooks"],
                        "parameters": [id_param],
                        "responses": {
                            "200": {
                                "description": "Deleted",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/EbookDeleted" }
                                    }
                                }
                            },
                            "400": error,
                            "404": error,
                            "500": error
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Ebook": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string", "format": "uuid" },
                            "title": { "type": "string" },
                            "bookLink": { "type": "string", "description": "Download link" },
                            "imageUrl": { "type": "string", "description": "Cover URL or the placeholder" },
                            "imageRef": { "type": "string", "description": "Image store reference of an uploaded cover" }
                        },
                        "required": ["id", "title", "bookLink", "imageUrl"]
                    },
                    "EbookForm": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "bookLink": { "type": "string" },
                            "image": { "type": "string", "format": "binary" }
                        }
                    },
                    "EbookUpdated": {
                        "allOf": [
                            { "$ref": "#/components/schemas/Ebook" },
                            {
                                "type": "object",
                                "properties": {
                                    "warning": {
                                        "type": "string",
                                        "description": "Set when the replaced cover could not be deleted"
                                    }
                                }
                            }
                        ]
                    },
                    "EbookDeleted": {
                        "type": "object",
                        "properties": {
                            "message": { "type": "string" },
                            "id": { "type": "string", "format": "uuid" },
                            "warning": { "type": "string" }
                        },
                        "required": ["message", "id"]
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        store::migrations()
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "ebooks module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "ebooks module stopped");
        Ok(())
    }
}

/// Create the ebooks module around an already wired service
pub fn create_module(service: Arc<EbookService>, max_image_bytes: usize) -> Arc<dyn Module> {
    Arc::new(EbooksModule::new(service, max_image_bytes))
}
