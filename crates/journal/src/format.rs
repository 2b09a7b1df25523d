//! Canonical markdown layout of the journal document.
//!
//! Every string the store writes is produced here so that the reader can
//! rely on one fixed layout:
//!
//! ```text
//! # 📔 <title>
//!
//! *Created on 2024-01-05*
//!
//! ---
//!
//! ## 📝 2024-01-05 - 20:00
//! <body, verbatim>
//!
//! ---
//! ```

use chrono::{NaiveDate, NaiveDateTime};

/// Prefix that opens every entry. Counting occurrences of this string is
/// how entries are counted.
pub const ENTRY_MARKER: &str = "\n## 📝";

/// Line that closes every entry (and the header).
pub const SEPARATOR: &str = "\n---\n";

pub const DEFAULT_TITLE: &str = "Personal Journal";

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// Render one entry. `at` is wall-clock time in the journal's timezone.
///
/// The body is inserted verbatim; markdown in it is not escaped, so a body
/// containing the marker or the separator will confuse later parsing.
pub fn format_entry(text: &str, at: NaiveDateTime) -> String {
    format!(
        "{ENTRY_MARKER} {} - {}\n{text}\n{SEPARATOR}",
        at.format(DATE_FORMAT),
        at.format(TIME_FORMAT),
    )
}

/// Render the one-time preamble written when the document is created.
pub fn format_header(title: &str, created: NaiveDate) -> String {
    format!(
        "# 📔 {title}\n\n*Created on {}*\n{SEPARATOR}",
        created.format(DATE_FORMAT)
    )
}

/// Change description attached to each write.
pub fn commit_message(at: NaiveDateTime) -> String {
    format!("✏️ New entry - {}", at.format("%Y-%m-%d %H:%M"))
}

/// Inverse of the heading written by [`format_entry`]: `"2024-01-05 - 20:00"`.
pub(crate) fn parse_heading(heading: &str) -> Option<NaiveDateTime> {
    let (date, time) = heading.trim().split_once(" - ")?;
    let date = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT).ok()?;
    let time = chrono::NaiveTime::parse_from_str(time.trim(), TIME_FORMAT).ok()?;
    Some(date.and_time(time))
}
