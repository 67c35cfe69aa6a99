//! Core chat session management.
//!
//! The session owns the provider collection, the bounded conversation
//! history, and the render style. It orchestrates each exchange: stream the
//! response, and commit the user/assistant pair to history only when a
//! non-empty response completed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::client::{ModelInfo, Provider, ProviderKind};
use crate::error::{Error, Result};
use crate::history::{ChatHistory, Role};
use crate::render::{LiveDisplay, RenderStyle};

/// Result of one send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The provider returned a non-empty response; the exchange was
    /// committed to history.
    Completed(String),

    /// The provider completed but produced no text. Nothing was committed.
    Empty,

    /// The request failed or was interrupted. Nothing was committed.
    Failed,
}

/// A chat session that manages conversation state and provider interactions.
///
/// The session holds one client per configured provider and routes each
/// exchange to the current one. History is shared across provider switches,
/// so a conversation can continue on a different backend.
pub struct ChatSession {
    providers: Vec<Box<dyn Provider>>,
    current: usize,
    history: ChatHistory,
    use_markdown: bool,
    interrupt: Option<Arc<AtomicBool>>,
}

impl ChatSession {
    /// Creates a session over the given providers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when `providers` is empty.
    pub fn new(
        providers: Vec<Box<dyn Provider>>,
        max_history: usize,
        use_markdown: bool,
    ) -> Result<Self> {
        if providers.is_empty() {
            return Err(Error::configuration("no providers configured"));
        }
        Ok(Self {
            providers,
            current: 0,
            history: ChatHistory::with_max_len(max_history),
            use_markdown,
            interrupt: None,
        })
    }

    /// Installs an interrupt flag checked during streaming.
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// The current provider.
    pub fn provider(&self) -> &dyn Provider {
        self.providers[self.current].as_ref()
    }

    /// Kinds of all configured providers, in construction order.
    pub fn provider_kinds(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    /// The current provider's model table.
    pub fn models(&self) -> &'static [ModelInfo] {
        self.provider().models()
    }

    /// The currently selected model identifier.
    pub fn model(&self) -> &str {
        self.provider().model()
    }

    /// Selects a model by identifier. Returns false when the current
    /// provider does not offer it.
    pub fn set_model(&mut self, model: &str) -> bool {
        let known = self.models().iter().any(|info| info.id == model);
        if known {
            self.providers[self.current].set_model(model.to_string());
        }
        known
    }

    /// Selects a model by 1-based menu position. Returns the chosen
    /// identifier, or `None` when the position is out of range.
    pub fn set_model_by_index(&mut self, index: usize) -> Option<&'static str> {
        let info = *self.models().get(index.checked_sub(1)?)?;
        self.providers[self.current].set_model(info.id.to_string());
        Some(info.id)
    }

    /// Switches to the provider of the given kind and resets its model to
    /// the default. Returns false when that provider is not configured.
    /// History carries over.
    pub fn switch_provider(&mut self, kind: ProviderKind) -> bool {
        let Some(index) = self.providers.iter().position(|p| p.kind() == kind) else {
            return false;
        };
        self.current = index;
        let default_model = self.models()[0].id.to_string();
        self.providers[self.current].set_model(default_model);
        true
    }

    /// Whether responses render as markdown.
    pub fn use_markdown(&self) -> bool {
        self.use_markdown
    }

    /// Toggles markdown rendering for subsequent responses.
    pub fn set_markdown(&mut self, on: bool) {
        self.use_markdown = on;
    }

    /// The conversation history.
    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    /// Clears the conversation history.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    fn style(&self) -> RenderStyle {
        if self.use_markdown {
            RenderStyle::Markdown
        } else {
            RenderStyle::Plain
        }
    }

    /// Sends a user message and streams the response.
    ///
    /// On a completed non-empty response the user prompt and the full
    /// response are appended to history as a pair and the history is
    /// trimmed to its bound. On failure, interruption, or an empty
    /// response the history is left exactly as it was.
    pub async fn send(&mut self, prompt: &str, display: &mut LiveDisplay) -> ExchangeOutcome {
        if let Some(flag) = &self.interrupt {
            flag.store(false, Ordering::Relaxed);
        }

        let response = self.providers[self.current]
            .stream_response(
                prompt,
                &self.history,
                self.style(),
                display,
                self.interrupt.as_deref(),
            )
            .await;

        match response {
            Some(text) if !text.is_empty() => {
                self.history.push(Role::User, prompt);
                self.history.push(Role::Assistant, text.clone());
                self.history.trim();
                ExchangeOutcome::Completed(text)
            }
            Some(_) => ExchangeOutcome::Empty,
            None => ExchangeOutcome::Failed,
        }
    }
}
