//! Local file transport. The version token is the SHA-256 of the file
//! contents, so an edit made by anything else between read and write is
//! caught the same way a stale GitHub SHA is.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::info;

use crate::transport::{DocumentTransport, RemoteDocument, TransportError, VersionToken};

#[derive(Debug)]
pub struct FileTransport {
    root: PathBuf,
    /// Serializes compare-and-swap within this process.
    write_lock: Mutex<()>,
}

impl FileTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    async fn read(&self, file: &Path) -> Result<Option<String>, TransportError> {
        match tokio::fs::read(file).await {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|err| TransportError::Decode(err.to_string())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Write through a sibling temp file so readers never see a torn file.
    async fn write(&self, file: &Path, text: &str) -> Result<(), TransportError> {
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = file.with_extension("jalt-tmp");
        tokio::fs::write(&tmp, text.as_bytes()).await?;
        tokio::fs::rename(&tmp, file).await?;
        Ok(())
    }
}

pub fn content_digest(text: &str) -> VersionToken {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    VersionToken::new(format!("{:x}", hasher.finalize()))
}

#[async_trait]
impl DocumentTransport for FileTransport {
    async fn get(&self, path: &str) -> Result<Option<RemoteDocument>, TransportError> {
        let text = self.read(&self.resolve(path)).await?;
        Ok(text.map(|text| RemoteDocument {
            version: content_digest(&text),
            text,
        }))
    }

    async fn create(&self, path: &str, text: &str, message: &str) -> Result<(), TransportError> {
        let file = self.resolve(path);
        let _guard = self.write_lock.lock().await;
        if self.read(&file).await?.is_some() {
            return Err(TransportError::Conflict { path: path.to_string() });
        }
        self.write(&file, text).await?;
        info!(path = %file.display(), message, "journal file created");
        Ok(())
    }

    async fn update(
        &self,
        path: &str,
        text: &str,
        expected: &VersionToken,
        message: &str,
    ) -> Result<(), TransportError> {
        let file = self.resolve(path);
        let _guard = self.write_lock.lock().await;
        let current = self.read(&file).await?;
        match current {
            Some(current) if content_digest(&current) == *expected => {}
            _ => return Err(TransportError::Conflict { path: path.to_string() }),
        }
        self.write(&file, text).await?;
        info!(path = %file.display(), message, "journal file updated");
        Ok(())
    }

    fn locate(&self, path: &str) -> String {
        self.resolve(path).display().to_string()
    }
}
