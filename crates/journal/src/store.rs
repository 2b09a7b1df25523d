//! Fetch, append, write back.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::format::{commit_message, format_entry, format_header};
use crate::reader::{self, JournalStats};
use crate::transport::{DocumentTransport, TransportError};

#[derive(Debug, Error)]
pub enum JournalError {
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl JournalError {
    /// True when another writer got there first.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_conflict(),
        }
    }
}

/// What a successful append did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReceipt {
    /// The document did not exist and was created with a header.
    pub created: bool,
    /// Whitespace-delimited words in the appended text.
    pub words: usize,
    pub at: NaiveDateTime,
}

#[derive(Clone)]
pub struct JournalStore {
    transport: Arc<dyn DocumentTransport>,
    path: String,
    title: String,
}

impl JournalStore {
    pub fn new(
        transport: Arc<dyn DocumentTransport>,
        path: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            path: path.into(),
            title: title.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Where a human can look at the document.
    pub fn location(&self) -> String {
        self.transport.locate(&self.path)
    }

    /// Append one entry stamped with `now`.
    ///
    /// Exactly one write is issued. The create path is taken only when the
    /// transport confirms the document is absent; a failed lookup fails the
    /// append. A concurrent writer makes the update fail with a conflict,
    /// which is returned as is rather than retried.
    pub async fn append(&self, text: &str, now: DateTime<Tz>) -> Result<AppendReceipt, JournalError> {
        let at = now.naive_local();
        let current = self.transport.get(&self.path).await?;
        let entry = format_entry(text, at);
        let message = commit_message(at);

        let created = match current {
            Some(doc) => {
                let updated = doc.text + &entry;
                self.transport
                    .update(&self.path, &updated, &doc.version, &message)
                    .await?;
                false
            }
            None => {
                let mut updated = format_header(&self.title, at.date());
                updated.push_str(&entry);
                self.transport.create(&self.path, &updated, &message).await?;
                info!(path = %self.path, "journal created");
                true
            }
        };

        let words = reader::word_count(text);
        debug!(path = %self.path, words, created, "entry appended");
        Ok(AppendReceipt { created, words, at })
    }

    /// Document text, `None` when it does not exist yet.
    pub async fn fetch_text(&self) -> Result<Option<String>, JournalError> {
        Ok(self.transport.get(&self.path).await?.map(|doc| doc.text))
    }

    /// Document text, or an empty string when it is absent or unreachable.
    pub async fn current_text(&self) -> String {
        match self.fetch_text().await {
            Ok(text) => text.unwrap_or_default(),
            Err(err) => {
                warn!(path = %self.path, %err, "journal fetch failed; treating as absent");
                String::new()
            }
        }
    }

    pub async fn stats(&self) -> Result<Option<JournalStats>, JournalError> {
        Ok(self
            .fetch_text()
            .await?
            .map(|text| JournalStats::from_text(&text)))
    }

    pub async fn last_entry(&self) -> Result<Option<String>, JournalError> {
        Ok(self
            .fetch_text()
            .await?
            .and_then(|text| reader::last_entry(&text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{DEFAULT_TITLE, ENTRY_MARKER};
    use crate::memory::MemoryTransport;
    use crate::reader::{entry_count, last_entry, word_count};
    use crate::transport::{RemoteDocument, VersionToken};
    use async_trait::async_trait;
    use chrono::TimeZone;

    const PATH: &str = "journal.md";

    fn paris(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
        chrono_tz::Europe::Paris
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
    }

    fn store_over(transport: Arc<MemoryTransport>) -> JournalStore {
        JournalStore::new(transport, PATH, DEFAULT_TITLE)
    }

    fn header_line() -> String {
        format!("# 📔 {DEFAULT_TITLE}")
    }

    #[tokio::test]
    async fn first_append_creates_with_header() {
        let transport = Arc::new(MemoryTransport::new());
        let store = store_over(transport.clone());

        let receipt = store
            .append("Had a good day", paris(2024, 1, 5, 20, 0))
            .await
            .unwrap();
        assert!(receipt.created);
        assert_eq!(receipt.words, 4);

        let text = store.current_text().await;
        assert!(text.starts_with(&header_line()));
        assert!(text.contains("*Created on 2024-01-05*"));
        assert!(text.contains("## 📝 2024-01-05 - 20:00"));
        assert!(text.contains("Had a good day"));
        assert_eq!(text.matches(&header_line()).count(), 1);
        assert_eq!(
            transport.messages(PATH).await,
            vec!["✏️ New entry - 2024-01-05 20:00".to_string()]
        );
    }

    #[tokio::test]
    async fn absent_document_reads_as_empty() {
        let store = store_over(Arc::new(MemoryTransport::new()));
        let text = store.current_text().await;
        assert_eq!(text, "");
        assert_eq!(entry_count(&text), 0);
        assert_eq!(word_count(&text), 0);
        assert_eq!(store.stats().await.unwrap(), None);
        assert_eq!(store.last_entry().await.unwrap(), None);
    }

    #[tokio::test]
    async fn sequential_appends_only_extend() {
        let transport = Arc::new(MemoryTransport::new());
        let store = store_over(transport.clone());

        let mut previous = String::new();
        for n in 1..=5u32 {
            let receipt = store
                .append(&format!("entry number {n}"), paris(2024, 2, n, 21, 30))
                .await
                .unwrap();
            assert_eq!(receipt.created, n == 1);

            let text = store.current_text().await;
            assert!(text.starts_with(&previous), "append rewrote earlier bytes");
            assert_eq!(entry_count(&text), n as usize);
            assert_eq!(text.matches(&header_line()).count(), 1);
            previous = text;
        }
        assert_eq!(transport.messages(PATH).await.len(), 5);
        assert_eq!(
            last_entry(&previous).unwrap(),
            "## 📝 2024-02-05 - 21:30\nentry number 5\n"
        );
    }

    #[tokio::test]
    async fn header_date_follows_timezone() {
        let store = store_over(Arc::new(MemoryTransport::new()));
        // 23:30 UTC on the 5th is already the 6th in Paris.
        let now = chrono::Utc
            .with_ymd_and_hms(2024, 1, 5, 23, 30, 0)
            .unwrap()
            .with_timezone(&chrono_tz::Europe::Paris);
        store.append("late", now).await.unwrap();
        let text = store.current_text().await;
        assert!(text.contains("*Created on 2024-01-06*"));
        assert!(text.contains("## 📝 2024-01-06 - 00:30"));
    }

    #[tokio::test]
    async fn fetch_failure_never_creates() {
        let transport = Arc::new(MemoryTransport::new());
        let store = store_over(transport.clone());
        store.append("first", paris(2024, 1, 5, 20, 0)).await.unwrap();
        let before = transport.text(PATH).await;

        transport.set_offline(true);
        assert!(store.append("second", paris(2024, 1, 6, 20, 0)).await.is_err());
        assert_eq!(store.current_text().await, "");
        assert!(store.fetch_text().await.is_err());

        transport.set_offline(false);
        assert_eq!(transport.text(PATH).await, before);
    }

    /// Lets another writer commit between our read and our write.
    struct RacingTransport {
        inner: MemoryTransport,
        rival_text: String,
    }

    #[async_trait]
    impl DocumentTransport for RacingTransport {
        async fn get(&self, path: &str) -> Result<Option<RemoteDocument>, TransportError> {
            let seen = self.inner.get(path).await?;
            if let Some(doc) = &seen {
                self.inner
                    .update(path, &self.rival_text, &doc.version, "rival")
                    .await?;
            }
            Ok(seen)
        }

        async fn create(&self, path: &str, text: &str, message: &str) -> Result<(), TransportError> {
            self.inner.create(path, text, message).await
        }

        async fn update(
            &self,
            path: &str,
            text: &str,
            expected: &VersionToken,
            message: &str,
        ) -> Result<(), TransportError> {
            self.inner.update(path, text, expected, message).await
        }

        fn locate(&self, path: &str) -> String {
            self.inner.locate(path)
        }
    }

    #[tokio::test]
    async fn stale_version_fails_without_corruption() {
        let original = "# 📔 Personal Journal\n\n*Created on 2024-01-01*\n\n---\n";
        let rival_text = format!("{original}{ENTRY_MARKER} 2024-01-02 - 10:00\nrival\n\n---\n");
        let transport = Arc::new(RacingTransport {
            inner: MemoryTransport::new().with_document(PATH, original).await,
            rival_text: rival_text.clone(),
        });
        let store = JournalStore::new(transport.clone(), PATH, DEFAULT_TITLE);

        let err = store
            .append("mine", paris(2024, 1, 2, 11, 0))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(transport.inner.text(PATH).await, Some(rival_text));
    }

    #[tokio::test]
    async fn location_comes_from_transport() {
        let store = store_over(Arc::new(MemoryTransport::new()));
        assert_eq!(store.location(), "memory://journal.md");
        assert_eq!(store.path(), PATH);
    }
}
