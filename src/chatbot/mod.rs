//! Chatbot module - relays Discord mentions to a hosted LLM.

pub mod api;
pub mod discord;
pub mod engine;
pub mod history;
pub mod message;
pub mod prompt;
pub mod rate_limit;


pub use api::{ChatPlatform, PlatformError};
pub use discord::{DiscordClient, Handler};
pub use engine::{ChatbotConfig, ChatbotEngine, Outcome};
pub use message::{Attachment, InboundMessage, MentionedUser};
