//! Chat commands → journal operations.
//!
//! The router knows nothing about HTTP; it turns a message into an
//! [`Action`] and, for free text, performs the append and renders the
//! outcome.  Unauthorized callers never reach the store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info};

use jalt_config::AppConfig;
use jalt_journal::{JournalStats, JournalStore};

/// Parsed inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Stats,
    Last,
    Link,
    Unknown(String),
    /// Anything that is not a command becomes an entry.
    Entry(String),
}

impl Command {
    pub fn parse(text: &str) -> Self {
        let line = normalize_telegram_command(text);
        match line.split_whitespace().next().unwrap_or_default() {
            "/start" => Self::Start,
            "/help" => Self::Help,
            "/stats" => Self::Stats,
            "/last" => Self::Last,
            "/link" | "/github" => Self::Link,
            cmd if cmd.starts_with('/') => Self::Unknown(cmd.to_string()),
            _ => Self::Entry(text.to_string()),
        }
    }
}

/// What the transport loop should do with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Drop the message without answering.
    Silent,
    Reply(String),
    /// Acknowledge, then call [`CommandRouter::record`] with this text.
    Record(String),
}

pub const SAVING: &str = "✍️ Saving…";

const NOT_AUTHORIZED_START: &str = "❌ Sorry, you are not allowed to use this bot.";
const NOT_AUTHORIZED: &str = "❌ You are not allowed to use this bot.";

const WELCOME: &str = "🎉 Welcome to your personal journal!

📝 How to use this bot:
• Just send a message to create an entry
• /stats shows your statistics
• /last shows your latest entry
• /help shows these instructions again

Every message is saved with full version history.

Start now by sending your first message 📖";

const HELP: &str = "📚 Just Another Journaling Tool - jalt

Commands:
• /start - start the bot
• /help - show this help
• /stats - journal statistics
• /last - your latest entry
• /link - where your journal lives

Supported content:
• Plain text
• Emojis 😊
• Links
• Basic markdown

Send any message to create an entry!";

pub struct CommandRouter {
    config: Arc<AppConfig>,
    store: JournalStore,
    tz: Tz,
}

impl CommandRouter {
    pub fn new(config: Arc<AppConfig>, store: JournalStore) -> Self {
        let tz = config.timezone();
        Self { config, store, tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    /// Authorize and run a command.  Free text is returned as
    /// [`Action::Record`] so the caller can acknowledge before the write.
    pub async fn dispatch(&self, user_id: i64, text: &str) -> Action {
        let command = Command::parse(text);
        if !self.config.is_authorized(user_id) {
            debug!(user_id, ?command, "rejected unauthorized caller");
            return match command {
                Command::Start => Action::Reply(NOT_AUTHORIZED_START.to_string()),
                Command::Entry(_) => Action::Reply(NOT_AUTHORIZED.to_string()),
                _ => Action::Silent,
            };
        }

        match command {
            Command::Start => Action::Reply(WELCOME.to_string()),
            Command::Help => Action::Reply(HELP.to_string()),
            Command::Stats => Action::Reply(self.stats_reply().await),
            Command::Last => Action::Reply(self.last_reply().await),
            Command::Link => Action::Reply(format!(
                "🔗 Your journal:\n{}",
                self.store.location()
            )),
            Command::Unknown(cmd) => Action::Reply(format!("unknown command {cmd}. use /help")),
            Command::Entry(text) => Action::Record(text),
        }
    }

    /// Append `text` and describe the outcome for the user.
    pub async fn record(&self, text: &str, now: DateTime<Tz>) -> String {
        match self.store.append(text, now).await {
            Ok(receipt) => {
                info!(
                    words = receipt.words,
                    created = receipt.created,
                    preview = %preview(text, 50),
                    "entry saved"
                );
                format!(
                    "✅ Entry saved!\n\n📅 {} - {} words added to your journal.",
                    receipt.at.format("%H:%M"),
                    receipt.words
                )
            }
            Err(err) => {
                error!(%err, conflict = err.is_conflict(), "saving entry failed");
                "❌ Could not save your entry. Please try again.".to_string()
            }
        }
    }

    async fn stats_reply(&self) -> String {
        match self.store.stats().await {
            Ok(Some(stats)) => render_stats(&stats),
            Ok(None) => "📊 No entries yet. Start writing!".to_string(),
            Err(err) => {
                error!(%err, "reading journal for /stats failed");
                format!("❌ Could not read your journal: {err}")
            }
        }
    }

    async fn last_reply(&self) -> String {
        match self.store.fetch_text().await {
            Ok(None) => "📖 Your journal is empty for now.".to_string(),
            Ok(Some(text)) => match jalt_journal::last_entry(&text) {
                Some(entry) => format!("Your latest entry:\n\n{entry}"),
                None => "No entry found.".to_string(),
            },
            Err(err) => {
                error!(%err, "reading journal for /last failed");
                format!("❌ Error: {err}")
            }
        }
    }
}

fn render_stats(stats: &JournalStats) -> String {
    let mut lines = vec![
        "📊 Journal statistics".to_string(),
        String::new(),
        format!("• 📝 Entries: {}", stats.entries),
        format!("• 📖 Total words: {}", stats.words),
    ];
    if let Some(first) = stats.first_entry {
        lines.push(format!("• 📅 First entry: {}", first.format("%Y-%m-%d")));
    }
    if let Some(last) = stats.last_entry_at {
        lines.push(format!("• 🕒 Latest entry: {}", last.format("%Y-%m-%d %H:%M")));
    }
    lines.join("\n")
}

/// First `max_chars` characters, for logs.
fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}

/// Strip `@botname` from a leading command and collapse the gap before its
/// arguments.  Plain text is only trimmed.
pub fn normalize_telegram_command(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return trimmed.to_string();
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or("").trim();

    let command = command
        .split_once('@')
        .map(|(base, _)| base)
        .unwrap_or(command);

    if rest.is_empty() {
        command.to_string()
    } else {
        format!("{command} {rest}")
    }
}
