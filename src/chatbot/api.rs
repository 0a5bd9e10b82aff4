//! The chat platform as seen by the engine.

use async_trait::async_trait;

use crate::chatbot::message::InboundMessage;

#[derive(Debug)]
pub struct PlatformError(pub String);

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "platform error: {}", self.0)
    }
}

impl std::error::Error for PlatformError {}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Reply to `msg` in its channel.
    async fn reply(&self, msg: &InboundMessage, text: &str) -> Result<(), PlatformError>;

    /// Show the typing indicator in a channel.
    async fn send_typing(&self, channel_id: u64) -> Result<(), PlatformError>;
}
