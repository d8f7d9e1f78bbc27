use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::info;

/// Destination for exported JSON files.
#[async_trait]
pub trait DownloadSink: Send + Sync {
    async fn save(&self, filename: &str, contents: &[u8]) -> Result<PathBuf>;
}

/// Writes exports into a directory, creating it on first use.
pub struct DirectoryDownloads {
    dir: PathBuf,
}

impl DirectoryDownloads {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DownloadSink for DirectoryDownloads {
    async fn save(&self, filename: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.dir.join(safe_file_name(filename)?);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create download dir '{}'", self.dir.display()))?;
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        info!(path = %path.display(), bytes = contents.len(), "downloads: saved export");
        Ok(path)
    }
}

/// Server-supplied names are reduced to their final component.
fn safe_file_name(filename: &str) -> Result<&str> {
    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow!("invalid export filename '{filename}'"))
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    #[test]
    fn strips_directories_from_server_names() {
        assert_eq!(safe_file_name("../../etc/passwd").expect("name"), "passwd");
        assert_eq!(
            safe_file_name("patient_1_export.json").expect("name"),
            "patient_1_export.json"
        );
        assert!(safe_file_name("..").is_err());
        assert!(safe_file_name("").is_err());
    }

    #[tokio::test]
    async fn saves_into_created_directory() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("diagnostician_downloads_{suffix}"));
        let sink = DirectoryDownloads::new(dir.join("nested"));

        let path = sink.save("export.json", b"{}").await.expect("save");
        assert_eq!(path, dir.join("nested").join("export.json"));
        assert_eq!(tokio::fs::read(&path).await.expect("read"), b"{}");

        tokio::fs::remove_dir_all(dir).await.expect("cleanup");
    }
}
