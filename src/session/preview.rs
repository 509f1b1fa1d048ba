//! Served previews of uploaded photos.
//!
//! A [`PreviewHandle`] owns its registry entry: the entry exists from upload
//! until the handle is dropped, which happens on reset or when a new upload
//! replaces it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::generation::SourceImage;

use super::random_token;

/// Id → image map behind `/preview/{id}`. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct PreviewRegistry {
    images: Arc<RwLock<HashMap<String, SourceImage>>>,
}

impl PreviewRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `image` under a fresh id.
    pub fn acquire(&self, image: SourceImage) -> PreviewHandle {
        let id = random_token();
        self.images
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), image);
        debug!("Acquired preview {}", id);
        PreviewHandle {
            id,
            registry: self.clone(),
        }
    }

    /// Image registered under `id`, if its handle is still alive.
    pub fn get(&self, id: &str) -> Option<SourceImage> {
        self.images
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Number of live previews.
    pub fn len(&self) -> usize {
        self.images
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when no preview is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, id: &str) {
        let removed = self
            .images
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if removed.is_some() {
            debug!("Released preview {}", id);
        }
    }
}

/// Scoped ownership of one registered preview.
#[derive(Debug)]
pub struct PreviewHandle {
    id: String,
    registry: PreviewRegistry,
}

impl PreviewHandle {
    /// Registry id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path the page loads the preview from.
    pub fn url(&self) -> String {
        format!("/preview/{}", self.id)
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.registry.release(&self.id);
    }
}
