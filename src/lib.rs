// Public modules
pub mod chat;
pub mod chunk;
pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod render;
pub mod sse;

// Re-exports
pub use chunk::StreamChunk;
pub use client::{GeminiClient, OpenAiClient, Provider, ProviderKind};
pub use config::Settings;
pub use error::{Error, Result};
pub use history::ChatHistory;
pub use render::{LiveDisplay, RenderStyle};
