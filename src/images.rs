//! Where uploaded images go. The rest of the crate only ever sees the
//! [`ImageRef`] a store hands back.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use axum::body::Bytes;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{BattleError, BattleResult};
use crate::model::ImageRef;

/// URL prefix the router serves [`LocalImageStore`] files under.
pub const IMAGE_ROUTE: &str = "/images";

/// An upload as it arrives from a client.
#[derive(Debug, Clone)]
pub enum ImagePayload {
    Bytes {
        data: Bytes,
        content_type: Option<String>,
    },
    Ref(String),
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn store(&self, data: Bytes, content_type: Option<&str>) -> BattleResult<ImageRef>;

    /// Drops an image this store handed out. Refs it never issued are ignored.
    async fn remove(&self, image_ref: &ImageRef) -> BattleResult<()>;
}

fn extension(content_type: Option<&str>) -> &'static str {
    match content_type {
        Some("image/png") => "png",
        Some("image/jpeg") => "jpg",
        Some("image/gif") => "gif",
        Some("image/webp") => "webp",
        _ => "bin",
    }
}

pub struct LocalImageStore {
    root: PathBuf,
}

impl LocalImageStore {
    pub async fn new(root: impl Into<PathBuf>) -> BattleResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn store(&self, data: Bytes, content_type: Option<&str>) -> BattleResult<ImageRef> {
        let file_name = format!("{}.{}", Uuid::new_v4().simple(), extension(content_type));
        tokio::fs::write(self.root.join(&file_name), &data).await?;
        debug!("stored {} bytes as {file_name}", data.len());
        ImageRef::parse(format!("{IMAGE_ROUTE}/{file_name}"))
    }

    async fn remove(&self, image_ref: &ImageRef) -> BattleResult<()> {
        let Some(file_name) = image_ref
            .as_str()
            .strip_prefix(IMAGE_ROUTE)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| !name.is_empty() && !name.contains(['/', '\\']) && !name.starts_with('.'))
        else {
            return Ok(());
        };
        match tokio::fs::remove_file(self.root.join(file_name)).await {
            Ok(()) => {
                debug!("removed {file_name}");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryImageStore {
    images: RwLock<HashMap<String, Bytes>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.images.read().await.len()
    }

    pub async fn get(&self, image_ref: &ImageRef) -> Option<Bytes> {
        self.images.read().await.get(image_ref.as_str()).cloned()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn store(&self, data: Bytes, _content_type: Option<&str>) -> BattleResult<ImageRef> {
        let image_ref = ImageRef::parse(format!("mem:{}", Uuid::new_v4().simple()))?;
        self.images
            .write()
            .await
            .insert(image_ref.as_str().to_owned(), data);
        Ok(image_ref)
    }

    async fn remove(&self, image_ref: &ImageRef) -> BattleResult<()> {
        self.images.write().await.remove(image_ref.as_str());
        Ok(())
    }
}

/// Rejects payloads that should never reach a store.
pub fn check_payload(payload: &ImagePayload, max_bytes: usize) -> BattleResult<()> {
    match payload {
        ImagePayload::Bytes { data, .. } if data.is_empty() => {
            Err(BattleError::invalid("image is empty"))
        }
        ImagePayload::Bytes { data, .. } if data.len() > max_bytes => Err(BattleError::invalid(
            format!("image is larger than {max_bytes} bytes"),
        )),
        ImagePayload::Bytes { .. } => Ok(()),
        ImagePayload::Ref(raw) => ImageRef::parse(raw.as_str()).map(|_| ()),
    }
}
