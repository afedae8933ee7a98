//! In-memory preview resources.
//!
//! A preview is registered when an image is selected and served at
//! `/preview/{id}` until its [`PreviewHandle`] is dropped.

use bytes::Bytes;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::debug;
use uuid::Uuid;

use crate::models::MediaType;

#[derive(Debug, Clone)]
pub struct PreviewEntry {
    pub media_type: MediaType,
    pub data: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct PreviewStore {
    entries: Arc<RwLock<HashMap<Uuid, PreviewEntry>>>,
}

impl PreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, media_type: MediaType, data: Bytes) -> PreviewHandle {
        let id = Uuid::new_v4();
        debug!(%id, %media_type, bytes = data.len(), "preview acquired");
        self.entries.write().insert(id, PreviewEntry { media_type, data });
        PreviewHandle { id, store: self.clone() }
    }

    pub fn fetch(&self, id: &Uuid) -> Option<PreviewEntry> {
        self.entries.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn release(&self, id: &Uuid) {
        if self.entries.write().remove(id).is_some() {
            debug!(%id, "preview released");
        }
    }
}

/// Owning reference to a registered preview. Not `Clone`: the entry is
/// released exactly once, when this value is dropped.
#[derive(Debug)]
pub struct PreviewHandle {
    id: Uuid,
    store: PreviewStore,
}

impl PreviewHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> String {
        format!("/preview/{}", self.id)
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.store.release(&self.id);
    }
}
