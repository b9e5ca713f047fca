//! Versioned JSON files under `<config>/.storage/`

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage key {key} has version {found}, this build reads version {expected}")]
    UnsupportedVersion {
        key: String,
        expected: u32,
        found: u32,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// On-disk envelope:
///
/// ```json
/// {"version": 1, "minor_version": 1, "key": "core.device_registry", "data": {...}}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    pub version: u32,
    pub minor_version: u32,
    pub key: String,
    pub data: T,
}

/// Data with a fixed storage key and schema version
pub trait Storable: Serialize + DeserializeOwned {
    const KEY: &'static str;
    const VERSION: u32;
    const MINOR_VERSION: u32 = 1;
}

#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: config_dir.as_ref().join(".storage"),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Read `T::KEY`. `Ok(None)` when the file does not exist yet.
    pub async fn load<T: Storable>(&self) -> StorageResult<Option<T>> {
        let path = self.file_path(T::KEY);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(key = T::KEY, "no storage file");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let file: StorageFile<T> = serde_json::from_str(&content)?;
        if file.version != T::VERSION {
            return Err(StorageError::UnsupportedVersion {
                key: T::KEY.to_string(),
                expected: T::VERSION,
                found: file.version,
            });
        }
        if file.minor_version > T::MINOR_VERSION {
            warn!(
                key = T::KEY,
                minor_version = file.minor_version,
                "storage written by a newer build"
            );
        }
        debug!(key = T::KEY, "loaded storage file");
        Ok(Some(file.data))
    }

    /// Write `data` atomically (temp file, then rename).
    pub async fn save<T: Storable>(&self, data: &T) -> StorageResult<()> {
        fs::create_dir_all(&self.dir).await?;

        let file = StorageFile {
            version: T::VERSION,
            minor_version: T::MINOR_VERSION,
            key: T::KEY.to_string(),
            data,
        };
        let content = serde_json::to_string_pretty(&file)?;
        let path = self.file_path(T::KEY);
        let tmp = self.file_path(&format!("{}.tmp", T::KEY));
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        debug!(key = T::KEY, "saved storage file");
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.file_path(key)).await {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Sample {
        items: Vec<String>,
    }

    impl Storable for Sample {
        const KEY: &'static str = "test.sample";
        const VERSION: u32 = 1;
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        assert_eq!(storage.load::<Sample>().await.unwrap(), None);

        let sample = Sample {
            items: vec!["a".into(), "b".into()],
        };
        storage.save(&sample).await.unwrap();

        let raw: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(".storage/test.sample")).unwrap(),
        )
        .unwrap();
        assert_eq!(raw["key"], "test.sample");
        assert_eq!(raw["version"], 1);
        assert!(!dir.path().join(".storage/test.sample.tmp").exists());

        assert_eq!(storage.load::<Sample>().await.unwrap(), Some(sample));
    }

    #[tokio::test]
    async fn test_rejects_other_major_version() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        std::fs::create_dir_all(storage.storage_dir()).unwrap();
        std::fs::write(
            storage.file_path("test.sample"),
            r#"{"version": 2, "minor_version": 1, "key": "test.sample", "data": {"items": []}}"#,
        )
        .unwrap();

        let err = storage.load::<Sample>().await.unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedVersion { found: 2, .. }));
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        storage.delete("nothing.here").await.unwrap();
    }
}
