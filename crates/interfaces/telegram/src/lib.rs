use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use jalt_config::AppConfig;
use jalt_journal::JournalStore;

pub mod reminder;
pub mod router;

pub use router::{Action, Command, CommandRouter};

/// Long-poll timeout passed to `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u64 = 25;
const MAX_MESSAGE_CHARS: usize = 3500;

/// Run the bot until the process is stopped.
pub async fn start_bot(config: Arc<AppConfig>, store: JournalStore) -> Result<()> {
    let token = config.telegram.bot_token.trim().to_string();
    if token.is_empty() {
        bail!("TELEGRAM_BOT_TOKEN is not set");
    }

    let api = TelegramApi::new(&token)?;
    let router = Arc::new(CommandRouter::new(config.clone(), store));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if config.telegram.reminder_enabled {
        let at = config.reminder_time()?;
        reminder::spawn_daily_reminder(
            api.clone(),
            config.telegram.authorized_users.clone(),
            router.timezone(),
            at,
            shutdown_rx,
        );
    }

    info!(
        tz = %router.timezone(),
        authorized = config.telegram.authorized_users.len(),
        "telegram bot started; listening for updates"
    );

    let mut offset: i64 = 0;
    loop {
        let updates = tokio::select! {
            updates = api.fetch_updates(offset) => updates,
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                let _ = shutdown_tx.send(true);
                return Ok(());
            }
        };
        let updates = match updates {
            Ok(u) => u,
            Err(err) => {
                let err_str = err.to_string();
                if err_str.contains("409") {
                    // Another instance is polling; back off and let it win.
                    warn!("409 Conflict: another bot instance is running; waiting 15s before retrying");
                    tokio::time::sleep(Duration::from_secs(15)).await;
                } else {
                    warn!(%err, "getUpdates failed; retrying in 5s");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                continue;
            }
        };

        for update in updates {
            offset = update.update_id + 1;

            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text else {
                continue;
            };
            let Some(user) = message.from else {
                continue;
            };

            let api = api.clone();
            let router = router.clone();
            let chat_id = message.chat.id;
            tokio::spawn(async move {
                handle_message(&api, &router, chat_id, user.id, &text).await;
            });
        }

        tokio::time::sleep(Duration::from_millis(300)).await;
    }
}

async fn handle_message(api: &TelegramApi, router: &CommandRouter, chat_id: i64, user_id: i64, text: &str) {
    match router.dispatch(user_id, text).await {
        Action::Silent => {}
        Action::Reply(reply) => {
            for chunk in chunk_message(&reply, MAX_MESSAGE_CHARS) {
                if let Err(err) = api.send_message(chat_id, &chunk).await {
                    warn!(chat_id, %err, "sendMessage failed");
                }
            }
        }
        Action::Record(entry) => {
            let ack = api.send_message(chat_id, crate::router::SAVING).await;
            let outcome = router.record(&entry, router.now()).await;
            let delivered = match ack {
                Ok(message_id) => api.edit_message_text(chat_id, message_id, &outcome).await,
                Err(err) => Err(err),
            };
            if let Err(err) = delivered {
                debug!(chat_id, %err, "could not edit acknowledgement; sending outcome instead");
                if let Err(err) = api.send_message(chat_id, &outcome).await {
                    warn!(chat_id, %err, "sendMessage failed");
                }
            }
        }
    }
}

/// Thin Bot API client.
///
/// The bot token is part of every request URL, so errors leave here with
/// the URL stripped.
#[derive(Debug, Clone)]
pub struct TelegramApi {
    client: Client,
    base_url: String,
}

impl TelegramApi {
    pub fn new(token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("https://api.telegram.org/bot{token}"),
        })
    }

    async fn fetch_updates(&self, offset: i64) -> Result<Vec<TelegramUpdate>> {
        let url = format!("{}/getUpdates", self.base_url);
        let response = self
            .client
            .get(url)
            .query(&[
                ("timeout", POLL_TIMEOUT_SECS.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(reqwest::Error::without_url)?;

        let payload: TelegramResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(reqwest::Error::without_url)?;
        payload.into_result("telegram getUpdates failed").map(Option::unwrap_or_default)
    }

    /// Returns the id of the sent message.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64> {
        let url = format!("{}/sendMessage", self.base_url);
        let body = SendMessageRequest {
            chat_id,
            text,
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(reqwest::Error::without_url)?;

        let payload: TelegramResponse<SentMessage> = response
            .json()
            .await
            .map_err(reqwest::Error::without_url)?;
        let sent = payload
            .into_result("telegram sendMessage failed")?
            .context("sendMessage returned no message")?;
        Ok(sent.message_id)
    }

    pub async fn edit_message_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        let url = format!("{}/editMessageText", self.base_url);
        let body = EditMessageRequest {
            chat_id,
            message_id,
            text,
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(reqwest::Error::without_url)?;

        let payload: TelegramResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(reqwest::Error::without_url)?;
        payload.into_result("telegram editMessageText failed")?;
        Ok(())
    }
}

fn chunk_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    let max_chars = max_chars.max(1);
    for line in text.lines() {
        // Lines longer than a whole chunk are cut on char boundaries.
        let mut rest = line;
        loop {
            let cut = rest
                .char_indices()
                .nth(max_chars)
                .map_or(rest.len(), |(index, _)| index);
            let (piece, tail) = rest.split_at(cut);
            let piece_len = piece.chars().count() + 1;
            if current_len > 0 && current_len + piece_len > max_chars {
                chunks.push(current.trim_end().to_string());
                current.clear();
                current_len = 0;
            }
            current.push_str(piece);
            current.push('\n');
            current_len += piece_len;
            if tail.is_empty() {
                break;
            }
            rest = tail;
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim_end().to_string());
    }

    if chunks.is_empty() {
        chunks.push(text.to_string());
    }
    chunks
}

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> TelegramResponse<T> {
    fn into_result(self, fallback: &str) -> Result<Option<T>> {
        if !self.ok {
            let description = self.description.unwrap_or_else(|| fallback.to_string());
            bail!(description);
        }
        Ok(self.result)
    }
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    chat: TelegramChat,
    from: Option<TelegramUser>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
struct EditMessageRequest<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
}
