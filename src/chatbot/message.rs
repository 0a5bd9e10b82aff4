//! Platform-neutral inbound message and the text rewriting applied around it.
//!
//! Mention tokens are stripped before text reaches the model, and broadcast
//! mentions are defused before model output reaches the channel.

use regex::Regex;
use std::sync::LazyLock;

/// `<@123>` or the legacy nickname form `<@!123>`.
static USER_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?(\d+)>").expect("valid mention regex"));

static BROADCAST_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(everyone|here)").expect("valid broadcast regex"));

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    /// MIME type as reported by the platform, if any.
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|mime| mime.starts_with("image/"))
    }
}

/// Another user mentioned alongside the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionedUser {
    pub id: u64,
    pub username: String,
    pub nickname: Option<String>,
    pub roles: Vec<String>,
}

impl MentionedUser {
    fn describe(&self) -> String {
        format!(
            "User {} (Id: {}, Nickname: {}, Roles: {})",
            self.username,
            self.id,
            self.nickname.as_deref().unwrap_or("No nickname"),
            self.roles.join(", ")
        )
    }
}

/// A message as seen by the engine.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message_id: u64,
    pub channel_id: u64,
    /// `None` for direct messages.
    pub guild_id: Option<u64>,
    pub author_id: u64,
    pub author_is_bot: bool,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub mentions_bot: bool,
    /// Mentioned users other than the bot.
    pub mentioned_users: Vec<MentionedUser>,
    pub bot_id: u64,
    pub bot_name: String,
}

impl InboundMessage {
    /// Content length in UTF-16 code units, the unit Discord clients count in.
    ///
    /// Characters outside the Basic Multilingual Plane (most emoji) count twice.
    pub fn content_len(&self) -> usize {
        self.content.encode_utf16().count()
    }

    pub fn has_broadcast_mention(&self) -> bool {
        self.content.contains("@here") || self.content.contains("@everyone")
    }

    /// URL of the first image attachment.
    pub fn first_image_url(&self) -> Option<&str> {
        self.attachments
            .iter()
            .find(|a| a.is_image())
            .map(|a| a.url.as_str())
    }

    /// Content with the bot's first mention token removed, trimmed.
    pub fn stripped_content(&self) -> String {
        strip_bot_mention(&self.content, self.bot_id)
    }

    /// `User a (...); User b (...)`, or `None` when nobody else was mentioned.
    pub fn mention_clause(&self) -> Option<String> {
        let clause = self
            .mentioned_users
            .iter()
            .filter(|u| u.id != self.bot_id)
            .map(MentionedUser::describe)
            .collect::<Vec<_>>()
            .join("; ");

        (!clause.is_empty()).then_some(clause)
    }
}

/// Remove the first mention of `bot_id` and trim the result.
pub fn strip_bot_mention(content: &str, bot_id: u64) -> String {
    let target = bot_id.to_string();
    let found = USER_MENTION
        .captures_iter(content)
        .find(|caps| caps.get(1).is_some_and(|id| id.as_str() == target))
        .and_then(|caps| caps.get(0));

    match found {
        Some(m) => {
            let mut stripped = String::with_capacity(content.len());
            stripped.push_str(&content[..m.start()]);
            stripped.push_str(&content[m.end()..]);
            stripped.trim().to_string()
        }
        None => content.trim().to_string(),
    }
}

/// Rewrite `@everyone` / `@here` as `[at]everyone` / `[at]here`.
pub fn sanitize_broadcast_mentions(text: &str) -> String {
    BROADCAST_MENTION.replace_all(text, "[at]$1").into_owned()
}

/// Safely truncate a string to at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT: u64 = 42;

    fn make_msg(content: &str) -> InboundMessage {
        InboundMessage {
            message_id: 1,
            channel_id: 10,
            guild_id: Some(100),
            author_id: 7,
            author_is_bot: false,
            content: content.to_string(),
            attachments: vec![],
            mentions_bot: true,
            mentioned_users: vec![],
            bot_id: BOT,
            bot_name: "Mochi".to_string(),
        }
    }

    #[test]
    fn test_strip_plain_mention() {
        assert_eq!(strip_bot_mention("<@42> hello", BOT), "hello");
    }

    #[test]
    fn test_strip_nickname_mention() {
        assert_eq!(strip_bot_mention("hey <@!42>  ", BOT), "hey");
    }

    #[test]
    fn test_strip_only_first_mention() {
        assert_eq!(strip_bot_mention("<@42> ping <@42>", BOT), "ping <@42>");
    }

    #[test]
    fn test_strip_leaves_other_users() {
        assert_eq!(strip_bot_mention("<@7> and <@42> hi", BOT), "<@7> and  hi");
    }

    #[test]
    fn test_strip_does_not_match_id_prefix() {
        assert_eq!(strip_bot_mention("<@420> hi", BOT), "<@420> hi");
    }

    #[test]
    fn test_sanitize_everyone() {
        assert_eq!(sanitize_broadcast_mentions("@everyone hi"), "[at]everyone hi");
    }

    #[test]
    fn test_sanitize_here_and_repeats() {
        assert_eq!(
            sanitize_broadcast_mentions("@here and @here again, @everyone"),
            "[at]here and [at]here again, [at]everyone"
        );
    }

    #[test]
    fn test_sanitize_untouched() {
        assert_eq!(sanitize_broadcast_mentions("mail me at a@b.c"), "mail me at a@b.c");
    }

    #[test]
    fn test_broadcast_detection() {
        assert!(make_msg("<@42> @everyone look").has_broadcast_mention());
        assert!(make_msg("<@42> @here").has_broadcast_mention());
        assert!(!make_msg("<@42> everyone here?").has_broadcast_mention());
    }

    #[test]
    fn test_first_image_url_skips_non_images() {
        let mut msg = make_msg("<@42> look");
        msg.attachments = vec![
            Attachment { url: "https://cdn/a.txt".into(), content_type: Some("text/plain".into()) },
            Attachment { url: "https://cdn/b.bin".into(), content_type: None },
            Attachment { url: "https://cdn/c.png".into(), content_type: Some("image/png".into()) },
            Attachment { url: "https://cdn/d.jpg".into(), content_type: Some("image/jpeg".into()) },
        ];
        assert_eq!(msg.first_image_url(), Some("https://cdn/c.png"));
    }

    #[test]
    fn test_mention_clause() {
        let mut msg = make_msg("<@42> who is <@8>?");
        assert_eq!(msg.mention_clause(), None);

        msg.mentioned_users = vec![
            MentionedUser {
                id: 8,
                username: "hana".into(),
                nickname: Some("Hana-chan".into()),
                roles: vec!["Admin".into(), "Artist".into()],
            },
            MentionedUser { id: 9, username: "ken".into(), nickname: None, roles: vec![] },
        ];

        assert_eq!(
            msg.mention_clause().unwrap(),
            "User hana (Id: 8, Nickname: Hana-chan, Roles: Admin, Artist); \
             User ken (Id: 9, Nickname: No nickname, Roles: )"
        );
    }

    #[test]
    fn test_content_len_counts_utf16_units() {
        assert_eq!(make_msg("トレンド").content_len(), 4);
        assert_eq!(make_msg("hi😀").content_len(), 4);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("こんにちは", 2), "こん");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
