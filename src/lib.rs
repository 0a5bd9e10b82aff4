//! Discord bot that answers mentions through a hosted LLM.

pub mod chatbot;
pub mod config;
pub mod llm;
pub mod trend;
