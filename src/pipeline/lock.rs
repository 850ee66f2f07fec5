// src/pipeline/lock.rs

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

/// Exclusive run lock backed by a lock file.
///
/// Two runs racing on the same tables would interleave drops and creates, so
/// a run holds this for its whole duration. The file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Create the lock file, failing with [`AppError::Locked`] if it exists.
    pub async fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(AppError::Locked(path)),
            Err(e) => return Err(AppError::Io(e)),
        };

        let owner = format!(
            "pid={} acquired_at={}\n",
            std::process::id(),
            Utc::now().to_rfc3339()
        );
        file.write_all(owner.as_bytes()).await?;
        file.flush().await?;

        log::debug!("Acquired run lock {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to release run lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn second_acquire_is_rejected_until_release() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("locks/dwh.lock");

        let lock = RunLock::acquire(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(lock.path(), path);

        let err = RunLock::acquire(&path).await.unwrap_err();
        assert!(matches!(err, AppError::Locked(ref p) if p == &path));

        drop(lock);
        assert!(!path.exists());
        assert!(RunLock::acquire(&path).await.is_ok());
    }
}
