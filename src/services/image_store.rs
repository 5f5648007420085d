use crate::models::{ImageId, UploadedImage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Trait for uploaded image storage
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store an image under its id
    async fn insert(&self, image: UploadedImage);

    /// Find image by id
    async fn get(&self, id: &ImageId) -> Option<UploadedImage>;

    /// Remove an image, returning whether it existed
    async fn remove(&self, id: &ImageId) -> bool;

    /// Drop every image uploaded before `cutoff`, returning how many were removed
    async fn evict_older_than(&self, cutoff: DateTime<Utc>) -> usize;

    async fn len(&self) -> usize;
}

/// In-memory image storage
pub struct InMemoryImageStore {
    images: Arc<RwLock<HashMap<ImageId, UploadedImage>>>,
}

impl InMemoryImageStore {
    pub fn new() -> Self {
        Self {
            images: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryImageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageStore for InMemoryImageStore {
    async fn insert(&self, image: UploadedImage) {
        let mut images = self.images.write().await;
        images.insert(image.id.clone(), image);
    }

    async fn get(&self, id: &ImageId) -> Option<UploadedImage> {
        let images = self.images.read().await;
        images.get(id).cloned()
    }

    async fn remove(&self, id: &ImageId) -> bool {
        let mut images = self.images.write().await;
        images.remove(id).is_some()
    }

    async fn evict_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut images = self.images.write().await;
        let before = images.len();
        images.retain(|_, image| image.uploaded_at >= cutoff);
        before - images.len()
    }

    async fn len(&self) -> usize {
        self.images.read().await.len()
    }
}
