//! Command parsing for the chat application.
//!
//! Commands are bare words typed at the prompt, so `quit` exits and `clear`
//! resets the history. Anything that does not parse as a command is sent to
//! the provider as a regular message.

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Clear the conversation history.
    Clear,

    /// Change the model. `None` opens the interactive picker.
    Model(Option<String>),

    /// Change the provider. `None` opens the interactive picker.
    Provider(Option<String>),

    /// Toggle markdown rendering.
    Markdown(bool),

    /// Show the current configuration.
    ShowConfig,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for chat commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use terai::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("quit"), Some(ChatCommand::Quit));
/// assert_eq!(parse_command("model"), Some(ChatCommand::Model(None)));
/// assert!(parse_command("what is rust?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    let mut parts = input.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "quit" | "exit" | "q" if argument.is_none() => ChatCommand::Quit,
        "clear" if argument.is_none() => ChatCommand::Clear,
        "help" | "?" if argument.is_none() => ChatCommand::Help,
        "config" if argument.is_none() => ChatCommand::ShowConfig,
        "model" => ChatCommand::Model(argument.map(|s| s.to_string())),
        "provider" => ChatCommand::Provider(argument.map(|s| s.to_string())),
        "markdown" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::Markdown(value),
            None => ChatCommand::Invalid("markdown expects 'on' or 'off'".to_string()),
        },
        _ => return None,
    };

    Some(result)
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  model [name]       Change the model (no argument lists choices)
  provider [name]    Change the provider (gemini or openai)
  markdown on|off    Toggle markdown rendering
  config             Show current configuration
  clear              Clear conversation history
  help               Show this help message
  quit               Exit the chat

Anything else is sent to the AI as a message."#
}
