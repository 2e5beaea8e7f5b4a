use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use harvester_common::{HarvesterError, Result, Snapshot};
use tokio::fs;
use tracing::debug;

use crate::traits::Backend;

const TMP_SUFFIX: &str = ".tmp";

/// Whole-snapshot JSON file: `{"Gauges":{...},"Counters":{...}}`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("snapshot"));
        name.push(TMP_SUFFIX);
        self.path.with_file_name(name)
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

#[async_trait]
impl Backend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let data = serde_json::to_vec(snapshot)
            .map_err(|e| HarvesterError::InternalError(format!("encode snapshot: {e}")))?;

        let tmp = self.tmp_path();
        fs::write(&tmp, &data).await?;
        if let Err(err) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }

        debug!(path = %self.path.display(), metrics = snapshot.len(), "snapshot written");
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot> {
        let data = fs::read(&self.path).await?;
        serde_json::from_slice(&data).map_err(|e| {
            HarvesterError::InternalError(format!(
                "decode snapshot {}: {e}",
                self.path.display()
            ))
        })
    }

    async fn ping(&self) -> Result<()> {
        let dir = self.parent_dir();
        let metadata = fs::metadata(dir).await?;
        if !metadata.is_dir() {
            return Err(HarvesterError::InvalidArgument(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        Ok(())
    }

    fn is_transient(&self, err: &HarvesterError) -> bool {
        err.is_permission_denied()
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use super::*;

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.gauges.insert("Alloc".to_string(), 0.1 + 0.2);
        snapshot.gauges.insert("Tiny".to_string(), 5e-324);
        snapshot.counters.insert("PollCount".to_string(), i64::MAX);
        snapshot
    }

    #[tokio::test]
    async fn save_then_load_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("metrics.json"));

        backend.save(&sample()).await.unwrap();
        assert_eq!(backend.load().await.unwrap(), sample());
        assert!(!backend.tmp_path().exists());
    }

    #[tokio::test]
    async fn save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("metrics.json"));

        backend.save(&sample()).await.unwrap();
        backend.save(&Snapshot::default()).await.unwrap();

        let raw = std::fs::read_to_string(backend.path()).unwrap();
        assert_eq!(raw, r#"{"Gauges":{},"Counters":{}}"#);
    }

    #[tokio::test]
    async fn load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("absent.json"));

        match backend.load().await.unwrap_err() {
            HarvesterError::Io(err) => assert_eq!(err.kind(), ErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("metrics.json"));
        backend.save(&sample()).await.unwrap();

        // A directory squatting on the temp path makes the write fail before the rename.
        std::fs::create_dir(backend.tmp_path()).unwrap();
        assert!(backend.save(&Snapshot::default()).await.is_err());
        assert_eq!(backend.load().await.unwrap(), sample());
    }

    #[tokio::test]
    async fn ping_checks_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileBackend::new(dir.path().join("m.json")).ping().await.is_ok());
        assert!(
            FileBackend::new(dir.path().join("missing/m.json"))
                .ping()
                .await
                .is_err()
        );
    }

    #[test]
    fn only_permission_errors_are_transient() {
        let backend = FileBackend::new("/tmp/metrics-db.json");
        let denied = HarvesterError::Io(std::io::Error::from(ErrorKind::PermissionDenied));
        let missing = HarvesterError::Io(std::io::Error::from(ErrorKind::NotFound));
        assert!(backend.is_transient(&denied));
        assert!(!backend.is_transient(&missing));
    }
}
