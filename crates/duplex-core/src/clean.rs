//! Output directory purge.

use std::io::ErrorKind;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Remove everything inside `dir`, keeping the directory itself.
///
/// A missing directory is not an error. Entries that cannot be removed are
/// logged and skipped; the number of removed entries is returned.
pub async fn purge_output_dir(dir: &Path) -> Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(dir = %dir.display(), "nothing to purge");
            return Ok(0);
        }
        Err(e) => return Err(CoreError::io(dir, e)),
    };

    let mut removed = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CoreError::io(dir, e))?
    {
        let path = entry.path();
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);

        let result = if is_dir {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };

        match result {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to purge build artifact");
            }
        }
    }

    tracing::debug!(dir = %dir.display(), removed, "purged output directory");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_directory_is_fine() {
        let dir = TempDir::new().unwrap();
        let removed = purge_output_dir(&dir.path().join("build/website"))
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn removes_nested_artifacts_but_keeps_directory() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("build/website");
        std::fs::create_dir_all(out.join("assets/img")).unwrap();
        std::fs::write(out.join("main.js"), "bundle").unwrap();
        std::fs::write(out.join("assets/img/logo.png"), [0u8; 4]).unwrap();

        let removed = purge_output_dir(&out).await.unwrap();
        assert_eq!(removed, 2);
        assert!(out.is_dir());
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn sibling_outputs_are_untouched() {
        let dir = TempDir::new().unwrap();
        let website = dir.path().join("build/website");
        let server = dir.path().join("build/server");
        std::fs::create_dir_all(&website).unwrap();
        std::fs::create_dir_all(&server).unwrap();
        std::fs::write(website.join("main.js"), "a").unwrap();
        std::fs::write(server.join("backend.js"), "b").unwrap();

        purge_output_dir(&website).await.unwrap();
        assert!(server.join("backend.js").is_file());
    }
}
