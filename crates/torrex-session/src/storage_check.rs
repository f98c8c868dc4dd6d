//! Verify that a torrent's files are present before resuming it from stored data.

use std::path::{Path, PathBuf};

use torrex_torrent_core::FileSpec;

/// Outcome of a storage check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCheckResult {
    /// Every file exists with at least its expected size.
    Ok,
    /// The save path itself is missing.
    SavePathMissing,
    /// A file is absent.
    MissingFile(PathBuf),
    /// A file is shorter than expected.
    MismatchingFileSize(PathBuf),
}

/// Check `files` under `save_path`, stopping at the first problem.
pub async fn check_file_storage(save_path: &Path, files: &[FileSpec]) -> StorageCheckResult {
    if tokio::fs::metadata(save_path).await.is_err() {
        return StorageCheckResult::SavePathMissing;
    }
    for file in files {
        let full_path = save_path.join(&file.path);
        match tokio::fs::metadata(&full_path).await {
            Err(_) => return StorageCheckResult::MissingFile(full_path),
            Ok(meta) if meta.len() < file.size => {
                return StorageCheckResult::MismatchingFileSize(full_path);
            }
            Ok(_) => {}
        }
    }
    StorageCheckResult::Ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(path: &str, size: u64) -> FileSpec {
        FileSpec {
            path: path.to_string(),
            size,
        }
    }

    #[tokio::test]
    async fn reports_first_problem() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        tokio::fs::create_dir_all(dir.path().join("album")).await?;
        tokio::fs::write(dir.path().join("album/a.flac"), vec![0_u8; 8]).await?;

        let complete = [spec("album/a.flac", 8)];
        assert_eq!(
            check_file_storage(dir.path(), &complete).await,
            StorageCheckResult::Ok
        );

        let short = [spec("album/a.flac", 16)];
        assert_eq!(
            check_file_storage(dir.path(), &short).await,
            StorageCheckResult::MismatchingFileSize(dir.path().join("album/a.flac"))
        );

        let missing = [spec("album/a.flac", 8), spec("album/b.flac", 1)];
        assert_eq!(
            check_file_storage(dir.path(), &missing).await,
            StorageCheckResult::MissingFile(dir.path().join("album/b.flac"))
        );

        assert_eq!(
            check_file_storage(&dir.path().join("absent"), &complete).await,
            StorageCheckResult::SavePathMissing
        );
        Ok(())
    }
}
