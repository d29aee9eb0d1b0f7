//! Media sinks for uploaded files.
//!
//! Files go to object storage when it is configured, otherwise to a local
//! directory sharded beneath `base_path/{shard}/{shard}/{file}`. Local
//! files are served back through `GET /media/{*key}`.

use crate::{
    clients::assets::{AssetError, AssetStore, AssetUpload, ResourceType},
    models::upload::{MediaKind, UploadRecord},
};
use bytes::Bytes;
use std::{
    collections::BTreeMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media storage not configured")]
    NotConfigured,
    #[error("invalid media key")]
    InvalidKey,
    #[error("media `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type MediaResult<T> = Result<T, MediaError>;

/// A validated file ready to be stored.
#[derive(Clone, Debug)]
pub struct MediaFile {
    pub file_name: String,
    pub content_type: String,
    pub kind: MediaKind,
    pub data: Bytes,
}

/// Where a stored file can be fetched from.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredMedia {
    pub url: String,
    pub thumbnail_url: Option<String>,
}

/// Files stored on local disk.
#[derive(Clone)]
pub struct LocalMedia {
    pub base_path: PathBuf,
}

const MAX_KEY_LEN: usize = 1024;
const LOCAL_URL_PREFIX: &str = "/media/";

impl LocalMedia {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Rejects keys that could escape `base_path`.
    fn ensure_key_safe(key: &str) -> MediaResult<()> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(MediaError::InvalidKey);
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(MediaError::InvalidKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(MediaError::InvalidKey);
        }
        Ok(())
    }

    /// Two-level shard for a file name, from the first two MD5 bytes.
    fn shards(file_name: &str) -> (String, String) {
        let digest = md5::compute(file_name);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn key_for(file_name: &str) -> String {
        let (a, b) = Self::shards(file_name);
        format!("{}/{}/{}", a, b, file_name)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        path.extend(key.split('/'));
        path
    }

    /// Write bytes to a temp file, fsync, then rename into place.
    pub async fn store(&self, id: Uuid, file: &MediaFile) -> MediaResult<String> {
        let file_name = format!("{}.{}", id, extension(&file.file_name, &file.content_type));
        let key = Self::key_for(&file_name);
        let path = self.path_for(&key);
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            MediaError::Io(io::Error::new(
                ErrorKind::Other,
                "media path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut out = File::create(&tmp_path).await?;
        let written = async {
            out.write_all(&file.data).await?;
            out.flush().await?;
            out.sync_all().await
        }
        .await;
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(MediaError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(MediaError::Io(err));
        }

        debug!("wrote {} bytes to {}", file.data.len(), path.display());
        Ok(key)
    }

    /// Open a stored file for streaming out.
    pub async fn open(&self, key: &str) -> MediaResult<(File, u64)> {
        Self::ensure_key_safe(key)?;
        let path = self.path_for(key);
        let file = File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                MediaError::NotFound(key.to_string())
            } else {
                MediaError::Io(err)
            }
        })?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// Remove a stored file and prune now-empty shard directories.
    pub async fn remove(&self, key: &str) -> MediaResult<()> {
        Self::ensure_key_safe(key)?;
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed media file {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("media file {} already missing", path.display());
            }
            Err(err) => return Err(MediaError::Io(err)),
        }

        let mut current = path.parent().map(Path::to_path_buf);
        while let Some(dir) = current {
            if !dir.starts_with(&self.base_path) || dir == self.base_path {
                break;
            }
            match fs::remove_dir(&dir).await {
                Ok(_) => current = dir.parent().map(Path::to_path_buf),
                Err(err) => {
                    debug!("stopped pruning at {}: {}", dir.display(), err);
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Pick a file extension from the original name, falling back to the MIME type.
fn extension(file_name: &str, content_type: &str) -> String {
    let from_name = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()));
    from_name.unwrap_or_else(|| {
        match content_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "video/mp4" => "mp4",
            "video/webm" => "webm",
            "video/quicktime" => "mov",
            _ => "bin",
        }
        .to_string()
    })
}

/// Chooses object storage first, local disk second.
#[derive(Clone)]
pub struct MediaStore {
    assets: Option<Arc<dyn AssetStore>>,
    local: Option<LocalMedia>,
}

impl MediaStore {
    pub fn new(assets: Option<Arc<dyn AssetStore>>, local: Option<LocalMedia>) -> Self {
        Self { assets, local }
    }

    pub fn local(&self) -> Option<&LocalMedia> {
        self.local.as_ref()
    }

    pub fn is_configured(&self) -> bool {
        self.assets.is_some() || self.local.is_some()
    }

    /// Store `file` for the upload `id`.
    ///
    /// `context` is attached to object-storage uploads so the listing tier
    /// can rebuild the record; local storage ignores it.
    pub async fn store(
        &self,
        id: Uuid,
        file: &MediaFile,
        context: BTreeMap<String, String>,
    ) -> MediaResult<StoredMedia> {
        if let Some(assets) = &self.assets {
            let resource_type = match file.kind {
                MediaKind::Video => ResourceType::Video,
                _ => ResourceType::Image,
            };
            let stored = assets
                .upload(AssetUpload {
                    public_id: id.to_string(),
                    resource_type,
                    file_name: file.file_name.clone(),
                    content_type: file.content_type.clone(),
                    data: file.data.clone(),
                    context,
                })
                .await?;
            info!("uploaded media {} to object storage", stored.public_id);
            let thumbnail_url = match file.kind {
                MediaKind::Video => assets.thumbnail_url(resource_type, &stored.public_id),
                _ => None,
            };
            return Ok(StoredMedia {
                url: stored.secure_url,
                thumbnail_url,
            });
        }

        if let Some(local) = &self.local {
            let key = local.store(id, file).await?;
            info!("stored media {} locally", key);
            return Ok(StoredMedia {
                url: format!("{}{}", LOCAL_URL_PREFIX, key),
                thumbnail_url: None,
            });
        }

        Err(MediaError::NotConfigured)
    }

    /// Delete the stored file behind a removed record. Links own no file.
    pub async fn remove(&self, record: &UploadRecord) -> MediaResult<()> {
        if record.kind == MediaKind::Link {
            return Ok(());
        }
        if let Some(key) = record.media_url.strip_prefix(LOCAL_URL_PREFIX) {
            return match &self.local {
                Some(local) => local.remove(key).await,
                None => Err(MediaError::NotConfigured),
            };
        }
        match &self.assets {
            Some(assets) => {
                let resource_type = match record.kind {
                    MediaKind::Video => ResourceType::Video,
                    _ => ResourceType::Image,
                };
                let public_id = assets.public_id_for(&record.id.to_string());
                assets.delete(resource_type, &public_id).await?;
                info!("deleted media {} from object storage", public_id);
                Ok(())
            }
            None => Err(MediaError::NotConfigured),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::fakes::FakeAssets;
    use tokio::io::AsyncReadExt;

    fn png(bytes: &'static [u8]) -> MediaFile {
        MediaFile {
            file_name: "Mock Up.PNG".into(),
            content_type: "image/png".into(),
            kind: MediaKind::Image,
            data: Bytes::from_static(bytes),
        }
    }

    #[tokio::test]
    async fn local_store_round_trips_and_prunes() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalMedia::new(dir.path());
        let id = Uuid::new_v4();

        let key = local.store(id, &png(b"\x89PNG data")).await.unwrap();
        assert!(key.ends_with(&format!("{}.png", id)));
        assert_eq!(key.split('/').count(), 3);

        let (mut file, len) = local.open(&key).await.unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"\x89PNG data");
        assert_eq!(len, 9);

        local.remove(&key).await.unwrap();
        assert!(matches!(local.open(&key).await, Err(MediaError::NotFound(_))));
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let local = LocalMedia::new("/tmp/unused");
        assert!(matches!(local.open("../etc/passwd").await, Err(MediaError::InvalidKey)));
        assert!(matches!(local.open("/abs").await, Err(MediaError::InvalidKey)));
    }

    #[tokio::test]
    async fn object_storage_is_preferred_over_local() {
        let dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeAssets::default());
        let store = MediaStore::new(
            Some(fake.clone() as Arc<dyn AssetStore>),
            Some(LocalMedia::new(dir.path())),
        );
        let mut ctx = BTreeMap::new();
        ctx.insert("email".to_string(), "a@example.com".to_string());

        let stored = store.store(Uuid::new_v4(), &png(b"x"), ctx).await.unwrap();
        assert!(stored.url.starts_with("https://cdn.test/"));
        assert_eq!(fake.resources.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_store_errors() {
        let store = MediaStore::new(None, None);
        assert!(!store.is_configured());
        let err = store
            .store(Uuid::new_v4(), &png(b"x"), BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::NotConfigured));
    }

    #[tokio::test]
    async fn removing_a_record_deletes_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(None, Some(LocalMedia::new(dir.path())));
        let id = Uuid::new_v4();
        let stored = store.store(id, &png(b"x"), BTreeMap::new()).await.unwrap();

        let record = UploadRecord {
            id,
            kind: MediaKind::Image,
            media_url: stored.url.clone(),
            thumbnail_url: None,
            uploader_name: "A".into(),
            uploader_email: "a@example.com".into(),
            product: "Card".into(),
            title: "t".into(),
            description: None,
            created_at: chrono::Utc::now(),
            karma_points: 15,
            status: Default::default(),
        };
        store.remove(&record).await.unwrap();

        let key = stored.url.trim_start_matches("/media/");
        let local = store.local().unwrap();
        assert!(matches!(local.open(key).await, Err(MediaError::NotFound(_))));
    }

    #[tokio::test]
    async fn removing_from_object_storage_uses_public_id() {
        let fake = Arc::new(FakeAssets::default());
        let store = MediaStore::new(Some(fake.clone() as Arc<dyn AssetStore>), None);
        let id = Uuid::new_v4();
        let stored = store.store(id, &png(b"x"), BTreeMap::new()).await.unwrap();
        assert_eq!(fake.resources.lock().unwrap().len(), 1);

        let record = UploadRecord {
            id,
            kind: MediaKind::Image,
            media_url: stored.url,
            thumbnail_url: None,
            uploader_name: "A".into(),
            uploader_email: "a@example.com".into(),
            product: "Card".into(),
            title: "t".into(),
            description: None,
            created_at: chrono::Utc::now(),
            karma_points: 15,
            status: Default::default(),
        };
        store.remove(&record).await.unwrap();
        assert!(fake.resources.lock().unwrap().is_empty());
    }

    #[test]
    fn extension_falls_back_to_mime() {
        assert_eq!(extension("clip", "video/quicktime"), "mov");
        assert_eq!(extension("a.JPEG", "image/jpeg"), "jpeg");
        assert_eq!(extension("weird.ex!t", "image/webp"), "webp");
    }
}
