use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// On-disk object store for order attachments.
///
/// Each attachment is a flat file at `{dir}/{key}` where the key is a
/// uuid-prefixed, sanitized filename. Objects are served back under the
/// public `/uploads/{key}` path.
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Attachment storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Store an attachment and return its durable public URL.
    pub async fn store(&self, filename: &str, data: &[u8]) -> Result<String> {
        let key = format!("{}-{}", Uuid::new_v4(), sanitize(filename));
        let path = self.object_path(&key);

        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        info!("Stored attachment {} ({} bytes)", key, data.len());
        Ok(format!("/uploads/{key}"))
    }

    /// Delete the object behind a public URL. A missing file counts as
    /// already gone.
    pub async fn delete_by_url(&self, url: &str) -> Result<()> {
        let Some(key) = url.strip_prefix("/uploads/") else {
            anyhow::bail!("not a storage URL: {url}");
        };
        // The key is generated by `store`; reject anything path-shaped.
        if key.contains('/') || key.contains("..") {
            anyhow::bail!("invalid storage key: {key}");
        }

        match fs::remove_file(self.object_path(key)).await {
            Ok(()) => {
                info!("Deleted attachment {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Attachment {} already gone", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Keep filenames filesystem- and URL-safe.
fn sanitize(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "uploaded_file".into()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_and_delete_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = Storage::new(tmp.path().to_path_buf()).await.unwrap();

        let url = storage.store("brief.pdf", b"content").await.unwrap();
        assert!(url.starts_with("/uploads/"));
        assert!(url.ends_with("brief.pdf"));

        let key = url.strip_prefix("/uploads/").unwrap();
        assert!(tmp.path().join(key).exists());

        storage.delete_by_url(&url).await.unwrap();
        assert!(!tmp.path().join(key).exists());

        // Deleting again is fine
        storage.delete_by_url(&url).await.unwrap();
    }

    #[tokio::test]
    async fn hostile_keys_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = Storage::new(tmp.path().to_path_buf()).await.unwrap();

        assert!(storage.delete_by_url("/uploads/../etc/passwd").await.is_err());
        assert!(storage.delete_by_url("https://elsewhere/x").await.is_err());
    }

    #[tokio::test]
    async fn filenames_are_sanitized() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = Storage::new(tmp.path().to_path_buf()).await.unwrap();

        let url = storage.store("../../sneaky name!.png", b"x").await.unwrap();
        let key = url.strip_prefix("/uploads/").unwrap();
        assert!(!key.contains('/'));
        assert!(!key.contains(' '));
        assert!(tmp.path().join(key).exists());
    }
}
