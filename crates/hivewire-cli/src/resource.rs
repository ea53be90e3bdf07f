use async_trait::async_trait;
use hivewire_core::HivewireResult;
use hivewire_pipeline::ResourceSource;

/// Reads perception resources from local files: `file://path` or a bare
/// path. Deployments with networked feeds supply their own source.
pub struct FileResourceSource;

impl FileResourceSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FileResourceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceSource for FileResourceSource {
    async fn read(&self, uri: &str) -> HivewireResult<String> {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        Ok(tokio::fs::read_to_string(path).await.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_file_uri() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("feed.txt");
        tokio::fs::write(&path, "AI agents on the rise\n").await.unwrap();

        let source = FileResourceSource::new();
        let uri = format!("file://{}", path.display());
        let content = source.read(&uri).await.unwrap();
        assert!(content.contains("AI agents"));
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let source = FileResourceSource::new();
        assert_eq!(source.read("file:///nope/feed.txt").await.unwrap(), "");
    }
}
