//! Terminal chat client for OpenAI-compatible chat-completion services.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
