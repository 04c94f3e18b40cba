use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tokio::io::AsyncWriteExt;

use super::{normalize_range, ListStore, StorageError};

/// One newline-delimited file per key under `base_dir`.
///
/// File names are the base64url (unpadded) encoding of the key, so any key is
/// a valid file name. Values must not contain a newline; serialized JSON
/// never does.
pub struct FileListStore {
    base_dir: PathBuf,
}

impl FileListStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.log", URL_SAFE_NO_PAD.encode(key.as_bytes())))
    }

    async fn read_lines(path: &Path) -> Result<Vec<String>, StorageError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(content
                .split('\n')
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ListStore for FileListStore {
    async fn push(&self, key: &str, value: String) -> Result<(), StorageError> {
        if value.contains('\n') {
            return Err(StorageError::InvalidValue(
                "file list values must be single-line".to_string(),
            ));
        }
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for_key(key))
            .await?;
        let mut line = value;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StorageError> {
        let mut lines = Self::read_lines(&self.path_for_key(key)).await?;
        Ok(match normalize_range(lines.len(), start, stop) {
            Some((a, b)) => {
                lines.truncate(b + 1);
                lines.drain(..a);
                lines
            }
            None => Vec::new(),
        })
    }

    async fn trim_to_last(&self, key: &str, max: usize) -> Result<(), StorageError> {
        let path = self.path_for_key(key);
        let lines = Self::read_lines(&path).await?;
        if lines.len() <= max {
            return Ok(());
        }
        let mut kept = lines[lines.len() - max..].join("\n");
        if !kept.is_empty() {
            kept.push('\n');
        }
        // Replace via rename so readers never observe a half-written file.
        let tmp = path.with_extension("log.tmp");
        tokio::fs::write(&tmp, kept).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_and_range_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileListStore::new(dir.path());
        for i in 0..4 {
            store.push("atsbuddy:logs", format!("line-{i}")).await.unwrap();
        }
        assert_eq!(
            store.range("atsbuddy:logs", 1, 2).await.unwrap(),
            vec!["line-1", "line-2"]
        );
        assert_eq!(
            store.range("atsbuddy:logs", -1, -1).await.unwrap(),
            vec!["line-3"]
        );
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileListStore::new(dir.path().join("not-created-yet"));
        assert!(store.range("k", 0, -1).await.unwrap().is_empty());
        store.trim_to_last("k", 10).await.unwrap();
    }

    #[tokio::test]
    async fn test_key_is_url_safe_encoded() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileListStore::new(dir.path());
        store.push("a/b:req:?", "v".to_string()).await.unwrap();
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].contains('/'));
        assert!(!names[0].contains('='));
        assert!(names[0].ends_with(".log"));
    }

    #[tokio::test]
    async fn test_trim_rewrites_tail() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileListStore::new(dir.path());
        for i in 0..6 {
            store.push("k", format!("{i}")).await.unwrap();
        }
        store.trim_to_last("k", 2).await.unwrap();
        store.trim_to_last("k", 2).await.unwrap();
        assert_eq!(store.range("k", 0, -1).await.unwrap(), vec!["4", "5"]);
        store.push("k", "6".to_string()).await.unwrap();
        assert_eq!(store.range("k", 0, -1).await.unwrap(), vec!["4", "5", "6"]);
    }

    #[tokio::test]
    async fn test_rejects_multiline_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileListStore::new(dir.path());
        let err = store.push("k", "a\nb".to_string()).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidValue(_)));
    }
}
