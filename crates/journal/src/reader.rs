//! Read-only views derived by re-parsing the whole document.
//!
//! Entries are never stored as a list; [`entries`] walks the text lazily and
//! yields one [`Entry`] per marker. The iterator borrows the text, is cheap to
//! clone, and can be restarted by calling [`entries`] again.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::format::{ENTRY_MARKER, SEPARATOR, parse_heading};

/// One entry as found in the document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    /// Everything between this entry's marker and the next marker (or EOF).
    segment: &'a str,
}

impl<'a> Entry<'a> {
    /// Heading line and body, cut before the closing separator.
    fn content(&self) -> &'a str {
        if let Some(end) = self.segment.find(SEPARATOR) {
            &self.segment[..end]
        } else if let Some(stripped) = self.segment.strip_suffix(SEPARATOR.trim_end_matches('\n')) {
            // Document whose final newline was removed by hand.
            stripped
        } else {
            self.segment
        }
    }

    /// `"2024-01-05 - 20:00"` for well-formed entries.
    pub fn heading(&self) -> &'a str {
        let content = self.content();
        content.split_once('\n').map_or(content, |(head, _)| head).trim()
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        parse_heading(self.heading())
    }

    /// The user's text, exactly as it was appended.
    pub fn body(&self) -> &'a str {
        match self.content().split_once('\n') {
            Some((_, rest)) => rest.strip_suffix('\n').unwrap_or(rest),
            None => "",
        }
    }

    /// Self-contained markdown starting with `## 📝` and ending just before
    /// the separator line.
    pub fn fragment(&self) -> String {
        format!("{}{}", ENTRY_MARKER.trim_start_matches('\n'), self.content())
    }
}

/// Lazy iterator over the entries of a document.
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    rest: Option<&'a str>,
}

impl<'a> Iterator for Entries<'a> {
    type Item = Entry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.rest?;
        let segment = match rest.find(ENTRY_MARKER) {
            Some(next) => {
                self.rest = Some(&rest[next + ENTRY_MARKER.len()..]);
                &rest[..next]
            }
            None => {
                self.rest = None;
                rest
            }
        };
        Some(Entry { segment })
    }
}

pub fn entries(text: &str) -> Entries<'_> {
    let rest = text
        .find(ENTRY_MARKER)
        .map(|start| &text[start + ENTRY_MARKER.len()..]);
    Entries { rest }
}

/// Number of entry markers in the document.
pub fn entry_count(text: &str) -> usize {
    entries(text).count()
}

/// Whitespace-delimited tokens over the whole document, header included.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Fragment of the most recent entry, or `None` when the journal has no
/// entries yet.
pub fn last_entry(text: &str) -> Option<String> {
    entries(text).last().map(|entry| entry.fragment())
}

/// Summary shown by `/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JournalStats {
    pub entries: usize,
    pub words: usize,
    /// Date of the first entry whose heading parses.
    pub first_entry: Option<NaiveDate>,
    pub last_entry_at: Option<NaiveDateTime>,
}

impl JournalStats {
    pub fn from_text(text: &str) -> Self {
        let mut stats = Self {
            words: word_count(text),
            ..Self::default()
        };
        for entry in entries(text) {
            stats.entries += 1;
            if let Some(at) = entry.timestamp() {
                if stats.first_entry.is_none() {
                    stats.first_entry = Some(at.date());
                }
                stats.last_entry_at = Some(at);
            }
        }
        stats
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}
