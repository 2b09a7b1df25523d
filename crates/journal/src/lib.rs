//! Append-only markdown journal persisted through a versioned document store.
//!
//! - [`format`]: the canonical entry/header layout.
//! - [`reader`]: statistics and last-entry views parsed from the text.
//! - [`store`]: fetch, append, conflict-checked write.
//! - [`transport`] and its implementations ([`github`], [`file`], [`memory`]).

pub mod file;
pub mod format;
pub mod github;
pub mod memory;
pub mod reader;
pub mod store;
pub mod transport;

pub use file::FileTransport;
pub use format::{DEFAULT_TITLE, ENTRY_MARKER, SEPARATOR, format_entry, format_header};
pub use github::{GithubOptions, GithubTransport};
pub use memory::MemoryTransport;
pub use reader::{Entries, Entry, JournalStats, entries, entry_count, last_entry, word_count};
pub use store::{AppendReceipt, JournalError, JournalStore};
pub use transport::{DocumentTransport, RemoteDocument, TransportError, VersionToken};
