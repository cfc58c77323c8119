// # File Target Store
//
// File-based implementation of TargetStore with crash recovery.
//
// ## Purpose
//
// Lets the daemon run against a plain JSON file: operators edit the target
// list, the engine writes the unreachable-addresses annotation back.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Automatic backup: the previous file is kept as `.backup`
// - Recovery: a file that fails to parse is restored from the backup
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "targets": [
//     {
//       "key": { "scope": "default", "name": "web" },
//       "addresses": ["10.0.0.1", "10.0.0.2:8080"],
//       "deleting": false,
//       "unreachable": ["10.0.0.2:8080"],
//       "last_synced": "2025-01-09T12:00:00Z"
//     }
//   ]
// }
// ```
//
// The file is re-read on every fetch and list, so edits made while the
// daemon runs are picked up by the next resync pass.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::config::StoreConfig;
use crate::store::StoredTarget;
use crate::target::{Target, TargetKey};
use crate::traits::{TargetStore, TargetStoreFactory};

/// Targets file format version
const TARGETS_FILE_VERSION: &str = "1.0";

/// Serializable targets file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TargetsFile {
    version: String,
    #[serde(default)]
    targets: Vec<StoredTarget>,
}

/// JSON file target store
///
/// # Example
///
/// ```rust,no_run
/// use reach_core::store::FileTargetStore;
/// use reach_core::TargetStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileTargetStore::new("/var/lib/reach/targets.json").await?;
///
///     for target in store.list_targets().await? {
///         println!("{}: {:?}", target.key, target.addresses);
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileTargetStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file
    write_lock: Mutex<()>,
}

impl FileTargetStore {
    /// Open a targets file, creating its directory if needed
    ///
    /// A missing file is treated as an empty target list. A corrupted file
    /// is restored from its backup when one exists.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let store = Self {
            path,
            write_lock: Mutex::new(()),
        };

        let targets = store.load_with_recovery().await?;
        tracing::debug!(
            "Opened targets file {}: {} targets",
            store.path.display(),
            targets.len()
        );

        Ok(store)
    }

    /// Insert or replace a target definition, keeping any annotation
    pub async fn insert(&self, target: Target) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        let mut targets = self.load_with_recovery().await?;

        match targets.iter_mut().find(|t| t.key == target.key) {
            Some(stored) => {
                stored.addresses = target.addresses;
                stored.deleting = target.deleting;
            }
            None => targets.push(StoredTarget::from(target)),
        }

        self.write(targets).await
    }

    /// Remove a target from the file
    pub async fn delete(&self, key: &TargetKey) -> Result<bool, Error> {
        let _guard = self.write_lock.lock().await;
        let mut targets = self.load_with_recovery().await?;

        let before = targets.len();
        targets.retain(|t| &t.key != key);
        if targets.len() == before {
            return Ok(false);
        }

        self.write(targets).await?;
        Ok(true)
    }

    /// Full stored record of a target
    pub async fn get(&self, key: &TargetKey) -> Result<Option<StoredTarget>, Error> {
        let targets = self.load_with_recovery().await?;
        Ok(targets.into_iter().find(|t| &t.key == key))
    }

    /// Path of the targets file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load targets, falling back to the backup if the file is corrupted
    async fn load_with_recovery(&self) -> Result<Vec<StoredTarget>, Error> {
        match Self::load(&self.path).await {
            Ok(targets) => Ok(targets),
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Targets file {} appears corrupted: {}. Attempting recovery from backup.",
                    self.path.display(),
                    e
                );

                let backup_path = Self::backup_path(&self.path);
                if !backup_path.exists() {
                    return Err(Error::store(format!(
                        "Targets file {} is corrupted and no backup exists",
                        self.path.display()
                    )));
                }

                let targets = Self::load(&backup_path).await.map_err(|backup_err| {
                    Error::store(format!(
                        "Targets file {} and its backup are both unreadable: {}",
                        self.path.display(),
                        backup_err
                    ))
                })?;

                if let Err(e) = fs::copy(&backup_path, &self.path).await {
                    tracing::error!("Failed to restore targets file from backup: {}", e);
                } else {
                    tracing::info!("Restored targets file from backup: {} targets", targets.len());
                }

                Ok(targets)
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<Vec<StoredTarget>, Error> {
        if !path.exists() {
            tracing::debug!("Targets file does not exist: {}", path.display());
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path).await?;
        let file: TargetsFile = serde_json::from_str(&content)?;

        if file.version != TARGETS_FILE_VERSION {
            tracing::warn!(
                "Targets file version mismatch: expected {}, got {}. Attempting to load anyway.",
                TARGETS_FILE_VERSION,
                file.version
            );
        }

        Ok(file.targets)
    }

    /// Write targets atomically, keeping the previous file as backup
    async fn write(&self, targets: Vec<StoredTarget>) -> Result<(), Error> {
        let file = TargetsFile {
            version: TARGETS_FILE_VERSION.to_string(),
            targets,
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        {
            let mut temp = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            temp.write_all(json.as_bytes()).await?;
            temp.flush().await?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Targets written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl TargetStore for FileTargetStore {
    async fn fetch_target(&self, key: &TargetKey) -> Result<Target, Error> {
        self.get(key)
            .await?
            .map(|stored| stored.to_target())
            .ok_or_else(|| Error::not_found(key))
    }

    async fn write_annotation(&self, target: &Target, unreachable: &[String]) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        let mut targets = self.load_with_recovery().await?;

        let stored = targets
            .iter_mut()
            .find(|t| t.key == target.key)
            .ok_or_else(|| Error::not_found(&target.key))?;
        stored.annotate(unreachable);

        self.write(targets).await
    }

    async fn list_targets(&self) -> Result<Vec<Target>, Error> {
        let targets = self.load_with_recovery().await?;
        Ok(targets.iter().map(StoredTarget::to_target).collect())
    }

    fn store_name(&self) -> &'static str {
        "file"
    }
}

/// Factory for [`FileTargetStore`]
pub struct FileTargetStoreFactory;

#[async_trait]
impl TargetStoreFactory for FileTargetStoreFactory {
    async fn create(&self, config: &StoreConfig) -> Result<Box<dyn TargetStore>, Error> {
        match config {
            StoreConfig::File { path } => Ok(Box::new(FileTargetStore::new(path).await?)),
            other => Err(Error::config(format!(
                "File store factory cannot build a '{}' store",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn web() -> Target {
        Target::new(
            TargetKey::new("default", "web"),
            vec!["10.0.0.1".to_string(), "10.0.0.2:8080".to_string()],
        )
    }

    #[tokio::test]
    async fn test_file_store_basic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("targets.json");

        let store = FileTargetStore::new(&path).await.unwrap();
        assert!(store.list_targets().await.unwrap().is_empty());

        store.insert(web()).await.unwrap();
        assert!(path.exists());

        let fetched = store.fetch_target(&web().key).await.unwrap();
        assert_eq!(fetched, web());

        let reopened = FileTargetStore::new(&path).await.unwrap();
        assert_eq!(reopened.list_targets().await.unwrap(), vec![web()]);
    }

    #[tokio::test]
    async fn test_annotation_is_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("targets.json");

        let store = FileTargetStore::new(&path).await.unwrap();
        store.insert(web()).await.unwrap();
        store
            .write_annotation(&web(), &["10.0.0.2:8080".to_string()])
            .await
            .unwrap();

        let reopened = FileTargetStore::new(&path).await.unwrap();
        let stored = reopened.get(&web().key).await.unwrap().unwrap();
        assert_eq!(stored.unreachable, vec!["10.0.0.2:8080".to_string()]);
        assert!(stored.last_synced.is_some());
    }

    #[tokio::test]
    async fn test_external_edits_are_visible() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("targets.json");
        let store = FileTargetStore::new(&path).await.unwrap();

        let json = r#"{
            "version": "1.0",
            "targets": [
                { "key": { "scope": "prod", "name": "db" }, "addresses": ["10.1.0.1"], "deleting": true }
            ]
        }"#;
        fs::write(&path, json).await.unwrap();

        let db = store
            .fetch_target(&TargetKey::new("prod", "db"))
            .await
            .unwrap();
        assert!(db.deleting);
        assert_eq!(db.addresses, vec!["10.1.0.1".to_string()]);
    }

    #[tokio::test]
    async fn test_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("targets.json");

        let store = FileTargetStore::new(&path).await.unwrap();
        store.insert(web()).await.unwrap();
        // Second write leaves the first one in the backup
        store
            .write_annotation(&web(), &["10.0.0.1".to_string()])
            .await
            .unwrap();
        assert!(FileTargetStore::backup_path(&path).exists());

        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = FileTargetStore::new(&path).await.unwrap();
        let stored = recovered.get(&web().key).await.unwrap().unwrap();
        assert!(
            stored.unreachable.is_empty(),
            "backup holds the state before the last write"
        );
    }

    #[tokio::test]
    async fn test_missing_target() {
        let dir = tempdir().unwrap();
        let store = FileTargetStore::new(dir.path().join("targets.json"))
            .await
            .unwrap();

        assert!(store.fetch_target(&web().key).await.unwrap_err().is_not_found());
        assert!(store.write_annotation(&web(), &[]).await.unwrap_err().is_not_found());
        assert!(!store.delete(&web().key).await.unwrap());
    }
}
