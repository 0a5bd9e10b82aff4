//! System instruction sent ahead of every conversation.

use chrono::{DateTime, TimeZone};

/// Build the system instruction.
///
/// Parts are joined with single spaces; the mention clause and the trends
/// list only appear when non-empty.
pub fn system_prompt<Tz: TimeZone>(
    bot_name: &str,
    now: &DateTime<Tz>,
    mention_clause: Option<&str>,
    trends: &[String],
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut parts = vec![format!(
        "Always respond in Japanese and in one concise line. The bot's name is {}. \
         Today is {} ({}). The current time is {}.",
        bot_name,
        now.format("%Y-%m-%d"),
        now.format("%A"),
        now.format("%H:%M:%S"),
    )];

    if let Some(clause) = mention_clause.filter(|c| !c.is_empty()) {
        parts.push(format!("The message mentions the following users: {clause}."));
    }

    if !trends.is_empty() {
        parts.push(format!("Trends: {}", trends.join(", ")));
    }

    parts.join(" ")
}
