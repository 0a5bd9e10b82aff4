//! Chatbot engine - admits mentions, asks the model, relays the answer.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chatbot::api::ChatPlatform;
use crate::chatbot::history::ConversationStore;
use crate::chatbot::message::{sanitize_broadcast_mentions, InboundMessage};
use crate::chatbot::prompt::system_prompt;
use crate::chatbot::rate_limit::{Admission, RateLimiter};
use crate::config::{
    Config, TrendFailurePolicy, DEFAULT_RATE_LIMIT_SECONDS, DEFAULT_TEXT_MODEL,
    DEFAULT_VISION_MODEL,
};
use crate::llm::{self, ChatEntry, CompletionApi};
use crate::trend::{contains_trend_or_synonyms, TrendError, TrendSource};

/// Longest message (in UTF-16 code units, mention included) the bot will forward.
pub const MAX_CONTENT_CHARS: usize = 250;

pub const NOT_ALLOWED_SERVER: &str =
    "I am not allowed to respond in this server. Please contact the administrator.";
pub const USER_EXCLUDED: &str =
    "You are not allowed to use this bot. Please contact the administrator.";
pub const RATE_LIMITED: &str =
    "You are sending too many requests. Please wait a moment and try again.";
pub const TOO_LONG: &str = "Your message is too long. Please keep it under 250 characters.";
pub const GENERIC_ERROR: &str = "An error occurred while processing your request.";
pub const BUSY: &str = "The service is busy right now. Please try again in a moment.";

/// Chatbot configuration.
#[derive(Debug, Clone)]
pub struct ChatbotConfig {
    pub allowed_servers: HashSet<u64>,
    pub excluded_users: HashSet<u64>,
    pub enable_trend: bool,
    pub trend_failure_policy: TrendFailurePolicy,
    pub text_model: String,
    pub vision_model: String,
    pub timezone: Tz,
    pub rate_limit_window: Duration,
}

impl ChatbotConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allowed_servers: config.allowed_servers.clone(),
            excluded_users: config.excluded_users.clone(),
            enable_trend: config.enable_trend,
            trend_failure_policy: config.trend_failure_policy,
            text_model: config.text_model.clone(),
            vision_model: config.vision_model.clone(),
            timezone: config.timezone,
            rate_limit_window: config.rate_limit_window,
        }
    }

    /// Direct messages (no guild) are always allowed.
    pub fn is_allowed_server(&self, guild_id: Option<u64>) -> bool {
        guild_id.is_none_or(|id| self.allowed_servers.contains(&id))
    }

    pub fn is_excluded(&self, user_id: u64) -> bool {
        self.excluded_users.contains(&user_id)
    }
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            allowed_servers: HashSet::new(),
            excluded_users: HashSet::new(),
            enable_trend: false,
            trend_failure_policy: TrendFailurePolicy::Abort,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            timezone: chrono_tz::Asia::Tokyo,
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_SECONDS),
        }
    }
}

/// Why a message was dropped without a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotMentioned,
    FromBot,
    BroadcastMention,
}

/// Admission checks that answer with a canned reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    ServerNotAllowed,
    UserExcluded,
    RateLimited,
    TooLong,
}

impl Rejection {
    pub fn reply_text(self) -> &'static str {
        match self {
            Rejection::ServerNotAllowed => NOT_ALLOWED_SERVER,
            Rejection::UserExcluded => USER_EXCLUDED,
            Rejection::RateLimited => RATE_LIMITED,
            Rejection::TooLong => TOO_LONG,
        }
    }
}

/// What the engine did with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ignored(IgnoreReason),
    Rejected(Rejection),
    Replied,
    /// The model answered without content.
    EmptyCompletion,
    Failed { retryable: bool },
}

/// Upstream failure while building or running the completion.
#[derive(Debug)]
pub enum HandlerError {
    Trend(TrendError),
    Llm(llm::Error),
}

impl HandlerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            HandlerError::Trend(e) => e.is_retryable(),
            HandlerError::Llm(e) => e.is_retryable(),
        }
    }

    /// What the user is told.
    pub fn fallback_text(&self) -> &'static str {
        if self.is_retryable() { BUSY } else { GENERIC_ERROR }
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::Trend(e) => write!(f, "{e}"),
            HandlerError::Llm(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for HandlerError {}

/// The chatbot engine.
///
/// Owns the conversation store and the rate limiter; both live as long as
/// the engine and are guarded for interleaved handler invocations.
pub struct ChatbotEngine {
    config: ChatbotConfig,
    platform: Arc<dyn ChatPlatform>,
    llm: Arc<dyn CompletionApi>,
    trends: Arc<dyn TrendSource>,
    history: Mutex<ConversationStore>,
    limiter: Mutex<RateLimiter>,
}

impl ChatbotEngine {
    pub fn new(
        config: ChatbotConfig,
        platform: Arc<dyn ChatPlatform>,
        llm: Arc<dyn CompletionApi>,
        trends: Arc<dyn TrendSource>,
    ) -> Self {
        let limiter = RateLimiter::new(config.rate_limit_window);
        Self {
            config,
            platform,
            llm,
            trends,
            history: Mutex::new(ConversationStore::new()),
            limiter: Mutex::new(limiter),
        }
    }

    /// Handle an incoming message. Sends at most one reply.
    pub async fn handle_message(&self, msg: InboundMessage) -> Outcome {
        if msg.author_is_bot {
            return Outcome::Ignored(IgnoreReason::FromBot);
        }
        if !msg.mentions_bot {
            return Outcome::Ignored(IgnoreReason::NotMentioned);
        }

        if let Err(outcome) = self.admit(&msg).await {
            return outcome;
        }

        let preview: String = msg.content.chars().take(50).collect();
        info!("📨 {} in {:?}: \"{}\"", msg.author_id, msg.guild_id, preview);

        self.start_typing(msg.channel_id);

        let content = msg.stripped_content();
        let history = {
            let mut store = self.history.lock().await;
            store.push(msg.author_id, ChatEntry::user(content.as_str()));
            store.window(msg.author_id)
        };

        match self.ask_model(&msg, &content, history).await {
            Ok(Some(answer)) => {
                let sanitized = sanitize_broadcast_mentions(&answer);
                if self.send_reply(&msg, &sanitized).await {
                    let mut store = self.history.lock().await;
                    store.push(msg.author_id, ChatEntry::assistant(answer));
                }
                info!("💬 Replied to {} ({} chars)", msg.author_id, sanitized.chars().count());
                Outcome::Replied
            }
            Ok(None) => {
                warn!("Completion for {} had no content", msg.author_id);
                self.send_reply(&msg, GENERIC_ERROR).await;
                Outcome::EmptyCompletion
            }
            Err(e) => {
                let retryable = e.is_retryable();
                warn!("Failed to answer {} (retryable: {}): {}", msg.author_id, retryable, e);
                self.send_reply(&msg, e.fallback_text()).await;
                Outcome::Failed { retryable }
            }
        }
    }

    /// Run the admission checks in order, replying on the first failure.
    async fn admit(&self, msg: &InboundMessage) -> Result<(), Outcome> {
        if !self.config.is_allowed_server(msg.guild_id) {
            info!("Refusing guild {:?} (not allowed)", msg.guild_id);
            return Err(self.reject(msg, Rejection::ServerNotAllowed).await);
        }

        if msg.has_broadcast_mention() {
            debug!("Ignoring broadcast mention from {}", msg.author_id);
            return Err(Outcome::Ignored(IgnoreReason::BroadcastMention));
        }

        if self.config.is_excluded(msg.author_id) {
            info!("Refusing excluded user {}", msg.author_id);
            return Err(self.reject(msg, Rejection::UserExcluded).await);
        }

        let admission = {
            let mut limiter = self.limiter.lock().await;
            limiter.check(msg.author_id, Instant::now())
        };
        if let Admission::Limited { retry_after } = admission {
            info!(
                "{} | message is currently restricted ({}ms left)",
                msg.author_id,
                retry_after.as_millis()
            );
            return Err(self.reject(msg, Rejection::RateLimited).await);
        }

        let len = msg.content_len();
        if len > MAX_CONTENT_CHARS {
            info!("Message from {} too long ({} UTF-16 units)", msg.author_id, len);
            return Err(self.reject(msg, Rejection::TooLong).await);
        }

        Ok(())
    }

    async fn reject(&self, msg: &InboundMessage, rejection: Rejection) -> Outcome {
        self.send_reply(msg, rejection.reply_text()).await;
        Outcome::Rejected(rejection)
    }

    async fn ask_model(
        &self,
        msg: &InboundMessage,
        content: &str,
        history: Vec<ChatEntry>,
    ) -> Result<Option<String>, HandlerError> {
        let trends = self.fetch_trends(content).await?;

        let now = chrono::Utc::now().with_timezone(&self.config.timezone);
        let mention_clause = msg.mention_clause();
        let system = system_prompt(&msg.bot_name, &now, mention_clause.as_deref(), &trends);

        let image_url = msg.first_image_url();
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatEntry::system(system));
        messages.extend(history);
        if let Some(url) = image_url {
            messages.push(ChatEntry::user_image(url));
        }

        let model = if image_url.is_some() {
            &self.config.vision_model
        } else {
            &self.config.text_model
        };

        info!("🤖 Asking {}: {} message(s), {} trend(s)", model, messages.len(), trends.len());
        self.llm
            .complete(model, &messages)
            .await
            .map_err(HandlerError::Llm)
    }

    async fn fetch_trends(&self, content: &str) -> Result<Vec<String>, HandlerError> {
        if !self.config.enable_trend || !contains_trend_or_synonyms(content) {
            return Ok(Vec::new());
        }

        match self.trends.today_trends().await {
            Ok(trends) => Ok(trends),
            Err(e) => match self.config.trend_failure_policy {
                TrendFailurePolicy::Abort => Err(HandlerError::Trend(e)),
                TrendFailurePolicy::Degrade => {
                    warn!("Trends unavailable, answering without them: {e}");
                    Ok(Vec::new())
                }
            },
        }
    }

    async fn send_reply(&self, msg: &InboundMessage, text: &str) -> bool {
        match self.platform.reply(msg, text).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to reply to message {}: {}", msg.message_id, e);
                false
            }
        }
    }

    /// Fire-and-forget; the reply does not wait for it.
    fn start_typing(&self, channel_id: u64) {
        let platform = Arc::clone(&self.platform);
        tokio::spawn(async move {
            if let Err(e) = platform.send_typing(channel_id).await {
                debug!("Failed to send typing indicator: {e}");
            }
        });
    }
}
