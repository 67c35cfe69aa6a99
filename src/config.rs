//! Configuration for the chat application.
//!
//! Settings are resolved from the environment (provider credentials) plus
//! command-line arguments. At least one provider credential must be present
//! or startup fails.

use std::env;

use arrrg_derive::CommandLine;

use crate::error::{Error, Result};
use crate::history::DEFAULT_MAX_HISTORY;
use crate::render::DEFAULT_REFRESH_PER_SECOND;

/// Environment variable holding the Gemini API key.
pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";

/// Environment variable holding the OpenAI API key.
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Default sampling temperature for provider requests.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default maximum output tokens for provider requests.
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Command-line arguments for the terai binary.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Provider to start with.
    #[arrrg(optional, "Provider to start with (gemini or openai)", "PROVIDER")]
    pub provider: Option<String>,

    /// Model to start with.
    #[arrrg(optional, "Model to start with (defaults to the provider's first model)", "MODEL")]
    pub model: Option<String>,

    /// Maximum number of stored history turns.
    #[arrrg(optional, "Max history turns to keep (default: 20)", "TURNS")]
    pub max_history: Option<usize>,

    /// Disable markdown rendering of responses.
    #[arrrg(flag, "Render responses as plain text instead of markdown")]
    pub no_markdown: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Resolved application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Gemini API key, if configured.
    pub gemini_api_key: Option<String>,

    /// OpenAI API key, if configured.
    pub openai_api_key: Option<String>,

    /// Maximum number of stored history turns.
    pub max_history_length: usize,

    /// Sampling temperature sent with every request.
    pub temperature: f32,

    /// Maximum output tokens requested per response.
    pub max_tokens: u32,

    /// Whether responses render as markdown by default.
    pub use_markdown: bool,

    /// Whether ANSI colors and styles are emitted.
    pub use_color: bool,

    /// Live region redraw rate, in frames per second.
    pub refresh_per_second: u32,
}

impl Settings {
    /// Resolves settings from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when neither provider credential is
    /// present; this is fatal at startup.
    pub fn from_env() -> Result<Self> {
        let gemini_api_key = non_empty_var(GEMINI_API_KEY);
        let openai_api_key = non_empty_var(OPENAI_API_KEY);

        if gemini_api_key.is_none() && openai_api_key.is_none() {
            return Err(Error::configuration(format!(
                "no API keys found; set {GEMINI_API_KEY} or {OPENAI_API_KEY}"
            )));
        }

        Ok(Self {
            gemini_api_key,
            openai_api_key,
            ..Self::defaults()
        })
    }

    /// Returns settings with default knobs and no credentials. Used by tests
    /// and as the base for [`from_env`](Settings::from_env).
    pub fn defaults() -> Self {
        Self {
            gemini_api_key: None,
            openai_api_key: None,
            max_history_length: DEFAULT_MAX_HISTORY,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            use_markdown: true,
            use_color: true,
            refresh_per_second: DEFAULT_REFRESH_PER_SECOND,
        }
    }

    /// Applies command-line overrides on top of the resolved settings.
    pub fn apply_args(mut self, args: &ChatArgs) -> Self {
        if let Some(max_history) = args.max_history {
            self.max_history_length = max_history;
        }
        if args.no_markdown {
            self.use_markdown = false;
        }
        if args.no_color {
            self.use_color = false;
        }
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}
