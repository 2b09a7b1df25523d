//! Key-addressed, versioned blob storage the journal is persisted through.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Opaque revision identifier returned by [`DocumentTransport::get`] and
/// handed back on update.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document that exists remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDocument {
    pub text: String,
    pub version: VersionToken,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("version conflict on {path}: document changed since it was read")]
    Conflict { path: String },
    #[error("storage rejected credentials: {0}")]
    Unauthorized(String),
    #[error("storage returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("could not decode stored document: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Storage backend contract.
///
/// `get` distinguishes a document that is confirmed absent (`Ok(None)`) from
/// a failed lookup (`Err`). `update` must refuse to write when `expected` no
/// longer names the current revision.
#[async_trait]
pub trait DocumentTransport: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<RemoteDocument>, TransportError>;

    async fn create(&self, path: &str, text: &str, message: &str) -> Result<(), TransportError>;

    async fn update(
        &self,
        path: &str,
        text: &str,
        expected: &VersionToken,
        message: &str,
    ) -> Result<(), TransportError>;

    /// Human-facing location of the document (URL or filesystem path).
    fn locate(&self, path: &str) -> String;
}
