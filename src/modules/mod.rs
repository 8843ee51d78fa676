pub mod ebooks;

use std::sync::Arc;

use shelf_kernel::{settings::Settings, ModuleRegistry};

/// Register all project-specific modules with the registry
pub fn register_all(
    registry: &mut ModuleRegistry,
    ebooks: Arc<ebooks::EbookService>,
    settings: &Settings,
) {
    registry.register(ebooks::create_module(
        ebooks,
        settings.storage.max_image_bytes,
    ));
}
