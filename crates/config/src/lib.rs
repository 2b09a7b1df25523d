use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

// ── Storage backend ───────────────────────────────────────────────────────────

/// Where the journal document is persisted.
///
/// | Backend  | Version token                    |
/// |----------|----------------------------------|
/// | `github` | blob SHA from the contents API   |
/// | `file`   | SHA-256 of the local file        |
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Github,
    File,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(Self::Github),
            "file" => Ok(Self::File),
            other => bail!("unknown storage backend `{other}` (expected github or file)"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Path of the document inside the repository (or under `storage.local_root`).
    pub path: String,
    /// Title written into the header when the document is created.
    pub title: String,
    /// IANA timezone name used for entry timestamps and the reminder.
    /// Falls back to UTC when the name is unrecognised.
    pub timezone: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: "journal.md".to_string(),
            title: "Personal Journal".to_string(),
            timezone: "Europe/Paris".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// `owner/name` of the repository holding the journal.
    pub repo: String,
    pub branch: String,
    pub api_base_url: String,
    /// Personal access token.  Usually supplied through `GITHUB_TOKEN`.
    /// Read from the file but never written back.
    #[serde(skip_serializing)]
    pub token: String,
    pub http_timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            repo: String::new(),
            branch: "main".to_string(),
            api_base_url: "https://api.github.com".to_string(),
            token: String::new(),
            http_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory the `file` backend resolves `journal.path` against.
    pub local_root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Github,
            local_root: ".jalt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot API token.  Usually supplied through `TELEGRAM_BOT_TOKEN`.
    /// Read from the file but never written back.
    #[serde(skip_serializing)]
    pub bot_token: String,
    /// Telegram user ids allowed to use the bot.  Empty means anyone.
    pub authorized_users: Vec<i64>,
    pub reminder_enabled: bool,
    /// Local time (`HH:MM`, in `journal.timezone`) of the daily reminder.
    pub reminder_time: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            authorized_users: vec![],
            reminder_enabled: true,
            reminder_time: "20:00".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub journal: JournalConfig,
    pub github: GithubConfig,
    pub storage: StorageConfig,
    pub telegram: TelegramConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load the TOML file at `path` (defaults when it does not exist) and
    /// apply environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path.as_ref()) {
            config = toml::from_str(&raw)
                .with_context(|| format!("parse {}", path.as_ref().display()))?;
        }
        config.apply_env_with(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Environment overrides.  Set, non-empty variables win over the file.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token.trim().to_string();
        }
        if let Some(token) = get("GITHUB_TOKEN") {
            self.github.token = token.trim().to_string();
        }
        if let Some(repo) = get("GITHUB_REPO") {
            self.github.repo = repo.trim().to_string();
        }
        if let Some(branch) = get("GITHUB_BRANCH") {
            self.github.branch = branch.trim().to_string();
        }
        if let Some(file) = get("JOURNAL_FILE") {
            self.journal.path = file.trim().to_string();
        }
        if let Some(tz) = get("TIMEZONE") {
            self.journal.timezone = tz.trim().to_string();
        }
        if let Some(users) = get("AUTHORIZED_USERS") {
            self.telegram.authorized_users =
                parse_allow_list(&users).context("AUTHORIZED_USERS")?;
        }
        if let Some(backend) = get("JOURNAL_BACKEND") {
            self.storage.backend = backend.parse()?;
        }
        Ok(())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// The configured timezone, or UTC when the name does not parse.
    pub fn timezone(&self) -> Tz {
        self.journal.timezone.parse().unwrap_or_else(|_| {
            tracing::warn!(tz = %self.journal.timezone, "unrecognised timezone; falling back to UTC");
            chrono_tz::UTC
        })
    }

    pub fn reminder_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.telegram.reminder_time.trim(), "%H:%M")
            .with_context(|| format!("invalid reminder_time `{}` (expected HH:MM)", self.telegram.reminder_time))
    }

    /// Empty allow-list means no restriction.
    pub fn is_authorized(&self, user_id: i64) -> bool {
        self.telegram.authorized_users.is_empty()
            || self.telegram.authorized_users.contains(&user_id)
    }

    /// Problems that prevent the selected backend or the bot from working.
    pub fn validate(&self, needs_bot: bool) -> Result<()> {
        if self.journal.path.trim().is_empty() {
            bail!("journal.path is empty (set JOURNAL_FILE)");
        }
        if self.storage.backend == StorageBackend::Github {
            if self.github.repo.trim().is_empty() {
                bail!("github.repo is empty (set GITHUB_REPO to owner/name)");
            }
            if !self.github.repo.contains('/') {
                bail!("github.repo `{}` must look like owner/name", self.github.repo);
            }
            if self.github.token.trim().is_empty() {
                bail!("GITHUB_TOKEN is not set");
            }
        }
        if needs_bot && self.telegram.bot_token.trim().is_empty() {
            bail!("TELEGRAM_BOT_TOKEN is not set");
        }
        if self.telegram.reminder_enabled {
            self.reminder_time()?;
        }
        Ok(())
    }
}

/// Parse `"123, 456,,"` into `[123, 456]`.  Blank items are skipped; anything
/// else that is not an integer is an error.
pub fn parse_allow_list(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<i64>()
                .with_context(|| format!("`{item}` is not a Telegram user id"))
        })
        .collect()
}

/// Show the first and last two characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.trim().chars().collect();
    match chars.len() {
        0 => "(unset)".to_string(),
        n if n <= 6 => "*".repeat(n),
        n => format!(
            "{}{}…{}",
            chars[0],
            chars[1],
            chars[n - 2..].iter().collect::<String>()
        ),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
