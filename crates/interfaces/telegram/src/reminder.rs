//! Daily "time to write" reminder.

use std::time::Duration;

use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::TelegramApi;

pub const REMINDER_TEXT: &str =
    "🌙 Good evening! Time to write in your journal!\n\nHow did your day go?";

/// First instant strictly after `now` whose local wall-clock time is `at`.
///
/// On a spring-forward day where `at` does not exist the reminder fires at
/// the first instant after the gap; on a fall-back day it fires at the
/// earlier of the two occurrences.
pub fn next_fire_after(now: DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    loop {
        if let Some(candidate) = resolve_local(tz, day, at) {
            if candidate > now {
                return candidate;
            }
        }
        day = day
            .checked_add_days(Days::new(1))
            .unwrap_or(NaiveDate::MAX);
    }
}

fn resolve_local(tz: Tz, day: NaiveDate, at: NaiveTime) -> Option<DateTime<Tz>> {
    let local = day.and_time(at);
    match tz.from_local_datetime(&local) {
        LocalResult::Single(t) => Some(t),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        // Ordinary DST gaps are an hour. A longer one (a skipped calendar
        // day) still resolves to nothing and the caller tries the next day.
        LocalResult::None => tz
            .from_local_datetime(&(local + chrono::Duration::hours(1)))
            .earliest(),
    }
}

/// Spawn the reminder loop.  Ends when `shutdown` flips to `true`.
pub fn spawn_daily_reminder(
    api: TelegramApi,
    recipients: Vec<i64>,
    tz: Tz,
    at: NaiveTime,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now().with_timezone(&tz);
            let next = next_fire_after(now, at);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next = %next, "daily reminder scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            send_reminders(&api, &recipients).await;
        }
    })
}

async fn send_reminders(api: &TelegramApi, recipients: &[i64]) {
    if recipients.is_empty() {
        warn!("no authorized users configured; daily reminder skipped");
        return;
    }
    for &chat_id in recipients {
        match api.send_message(chat_id, REMINDER_TEXT).await {
            Ok(_) => info!(chat_id, "daily reminder sent"),
            Err(err) => warn!(chat_id, %err, "daily reminder failed"),
        }
    }
}
