//! In-process transport used by tests and `--dry-run`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::transport::{DocumentTransport, RemoteDocument, TransportError, VersionToken};

#[derive(Debug, Clone)]
struct Stored {
    text: String,
    revision: u64,
    /// Change descriptions, oldest first.
    messages: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryTransport {
    docs: Mutex<HashMap<String, Stored>>,
    /// When set, every call fails with `Unavailable`.
    offline: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document as if it had been created earlier.
    pub async fn with_document(self, path: &str, text: &str) -> Self {
        self.docs.lock().await.insert(
            path.to_string(),
            Stored {
                text: text.to_string(),
                revision: 1,
                messages: vec!["seed".to_string()],
            },
        );
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn text(&self, path: &str) -> Option<String> {
        self.docs.lock().await.get(path).map(|d| d.text.clone())
    }

    pub async fn messages(&self, path: &str) -> Vec<String> {
        self.docs
            .lock()
            .await
            .get(path)
            .map(|d| d.messages.clone())
            .unwrap_or_default()
    }

    fn check_online(&self) -> Result<(), TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("memory transport is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentTransport for MemoryTransport {
    async fn get(&self, path: &str) -> Result<Option<RemoteDocument>, TransportError> {
        self.check_online()?;
        Ok(self.docs.lock().await.get(path).map(|d| RemoteDocument {
            text: d.text.clone(),
            version: VersionToken::new(d.revision.to_string()),
        }))
    }

    async fn create(&self, path: &str, text: &str, message: &str) -> Result<(), TransportError> {
        self.check_online()?;
        let mut docs = self.docs.lock().await;
        if docs.contains_key(path) {
            return Err(TransportError::Conflict { path: path.to_string() });
        }
        docs.insert(
            path.to_string(),
            Stored {
                text: text.to_string(),
                revision: 1,
                messages: vec![message.to_string()],
            },
        );
        Ok(())
    }

    async fn update(
        &self,
        path: &str,
        text: &str,
        expected: &VersionToken,
        message: &str,
    ) -> Result<(), TransportError> {
        self.check_online()?;
        let mut docs = self.docs.lock().await;
        let Some(doc) = docs.get_mut(path) else {
            return Err(TransportError::Conflict { path: path.to_string() });
        };
        if doc.revision.to_string() != expected.as_str() {
            return Err(TransportError::Conflict { path: path.to_string() });
        }
        doc.text = text.to_string();
        doc.revision += 1;
        doc.messages.push(message.to_string());
        Ok(())
    }

    fn locate(&self, path: &str) -> String {
        format!("memory://{path}")
    }
}
