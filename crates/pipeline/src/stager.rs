//! Staging of job inputs and outputs between blob storage and local temp files.
//!
//! Every local file a job touches is wrapped in a [`StagedFile`], which
//! removes it when dropped. Temp files therefore disappear on success, on
//! error propagation, on cancellation and during panic unwinding alike.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::blob::BlobStore;
use crate::error::JobError;

/// Scoped temp file, deleted on drop.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Temp file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove temp file",
            ),
        }
    }
}

/// Downloads inputs, uploads outputs and hands out temp file guards.
#[derive(Clone)]
pub struct ResourceStager {
    blobs: Arc<dyn BlobStore>,
    bucket: String,
    temp_dir: PathBuf,
}

impl ResourceStager {
    pub fn new(blobs: Arc<dyn BlobStore>, bucket: impl Into<String>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            blobs,
            bucket: bucket.into(),
            temp_dir: temp_dir.into(),
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Reserve a temp file named `name` under the temp root.
    ///
    /// The file itself is not created; the guard removes it if anything does.
    pub async fn temp_file(&self, name: &str) -> Result<StagedFile, JobError> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        Ok(StagedFile {
            path: self.temp_dir.join(name),
        })
    }

    /// Download `key` into a temp file named `name`.
    pub async fn download(&self, key: &str, name: &str) -> Result<StagedFile, JobError> {
        // Guard first so a partial download is removed as well.
        let staged = self.temp_file(name).await?;
        self.blobs.get(&self.bucket, key, staged.path()).await?;
        tracing::debug!(key, path = %staged.path().display(), "Input staged");
        Ok(staged)
    }

    /// Upload a staged file under `key`.
    pub async fn upload(&self, file: &StagedFile, key: &str) -> Result<(), JobError> {
        self.blobs.put(&self.bucket, key, file.path()).await?;
        tracing::debug!(key, path = %file.path().display(), "Output uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBlobStore;

    fn stager(dir: &Path, blobs: Arc<MemoryBlobStore>) -> ResourceStager {
        ResourceStager::new(blobs, "media", dir.join("work"))
    }

    #[tokio::test]
    async fn download_creates_temp_root_and_cleans_up_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.insert("media", "uploads/a.mkv", b"source".to_vec());
        let stager = stager(tmp.path(), blobs);

        let staged = stager.download("uploads/a.mkv", "job.mkv").await.unwrap();
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"source");
        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(!path.exists());
        assert!(tmp.path().join("work").is_dir());
    }

    #[tokio::test]
    async fn missing_blob_leaves_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let stager = stager(tmp.path(), Arc::new(MemoryBlobStore::new()));

        let err = stager.download("uploads/missing.mp4", "job.mp4").await.unwrap_err();
        assert!(matches!(err, JobError::NotFound { entity: "blob", .. }));
        assert!(!tmp.path().join("work").join("job.mp4").exists());
    }

    #[tokio::test]
    async fn upload_reads_staged_file() {
        let tmp = tempfile::tempdir().unwrap();
        let blobs = Arc::new(MemoryBlobStore::new());
        let stager = stager(tmp.path(), blobs.clone());

        let out = stager.temp_file("result.png").await.unwrap();
        std::fs::write(out.path(), b"png").unwrap();
        stager.upload(&out, "results/result.png").await.unwrap();
        assert_eq!(blobs.object("media", "results/result.png").unwrap(), b"png");
    }

    #[test]
    fn guard_removes_file_during_unwind() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("raw.mp4");
        std::fs::write(&path, b"frames").unwrap();

        let guarded = path.clone();
        let result = std::panic::catch_unwind(move || {
            let _staged = StagedFile { path: guarded };
            panic!("pipeline bug");
        });
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
