//! Interactive terminal chat with streaming AI providers.
//!
//! This binary provides a streaming REPL interface for chatting with
//! Gemini-style and OpenAI-style backends, with live markdown rendering.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with default settings
//! terai
//!
//! # Start on a specific provider and model
//! terai --provider openai --model gpt-4o-mini
//!
//! # Plain text output (useful for piping)
//! terai --no-markdown --no-color
//! ```
//!
//! At least one of `GEMINI_API_KEY` or `OPENAI_API_KEY` must be set.
//!
//! # Commands
//!
//! While chatting, you can use bare-word commands:
//! - `help` - Show available commands
//! - `clear` - Clear conversation history
//! - `model` - Change the model
//! - `provider` - Change the provider
//! - `config` - Show the current configuration
//! - `quit` - Exit the application

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use terai::chat::{ChatCommand, ChatSession, ExchangeOutcome, help_text, parse_command};
use terai::client::{GeminiClient, OpenAiClient, Provider, ProviderKind};
use terai::config::{ChatArgs, Settings};
use terai::render::LiveDisplay;

/// Main entry point for the terai application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("terai [OPTIONS]");

    let settings = match Settings::from_env() {
        Ok(settings) => settings.apply_args(&args),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let mut providers: Vec<Box<dyn Provider>> = Vec::new();
    if settings.gemini_api_key.is_some() {
        providers.push(Box::new(GeminiClient::new(&settings)?));
    }
    if settings.openai_api_key.is_some() {
        providers.push(Box::new(OpenAiClient::new(&settings)?));
    }

    // Flag for interrupt handling during streaming
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    let mut session = ChatSession::new(
        providers,
        settings.max_history_length,
        settings.use_markdown,
    )?
    .with_interrupt(interrupted.clone());

    let mut display = LiveDisplay::new()
        .with_color(settings.use_color)
        .with_refresh_per_second(settings.refresh_per_second);
    let mut rl = DefaultEditor::new()?;

    if let Some(name) = &args.provider {
        match ProviderKind::from_str(name) {
            Ok(kind) if session.switch_provider(kind) => {}
            Ok(kind) => {
                eprintln!("Provider {kind} is not configured (missing API key)");
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
    }
    if let Some(model) = &args.model
        && !session.set_model(model)
    {
        eprintln!(
            "Model {:?} is not offered by provider {}",
            model,
            session.provider().kind()
        );
        std::process::exit(1);
    }

    println!("Terminal AI");
    println!("========================================");
    println!(
        "Provider: {} (model: {})",
        session.provider().kind().label(),
        session.model()
    );
    println!("Type 'help' for commands, 'quit' to exit\n");

    if !session.provider().validate_connection().await {
        display.print_error("Could not verify the provider connection; requests may fail.");
    }

    loop {
        // Reset interrupt flag before each input
        interrupted.store(false, Ordering::Relaxed);

        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Clear => {
                            session.clear_history();
                            display.print_info("Conversation cleared.");
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {line}");
                            }
                        }
                        ChatCommand::Model(choice) => {
                            change_model(&mut session, &mut rl, &mut display, choice);
                        }
                        ChatCommand::Provider(choice) => {
                            change_provider(&mut session, &mut rl, &mut display, choice);
                        }
                        ChatCommand::Markdown(on) => {
                            session.set_markdown(on);
                            if on {
                                display.print_info("Markdown rendering enabled.");
                            } else {
                                display.print_info("Markdown rendering disabled.");
                            }
                        }
                        ChatCommand::ShowConfig => {
                            print_config(&session);
                        }
                        ChatCommand::Invalid(message) => {
                            display.print_error(&message);
                        }
                    }
                    continue;
                }

                // Regular message - send to the provider
                println!("AI:");
                match session.send(line, &mut display).await {
                    ExchangeOutcome::Completed(_) => {}
                    ExchangeOutcome::Empty => {
                        display.print_info("No response received.");
                    }
                    ExchangeOutcome::Failed => {}
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                display.print_error(&format!("Input error: {err}"));
                break;
            }
        }
    }

    Ok(())
}

/// Changes the model, either directly by name or through a numbered menu.
fn change_model(
    session: &mut ChatSession,
    rl: &mut DefaultEditor,
    display: &mut LiveDisplay,
    choice: Option<String>,
) {
    if let Some(name) = choice {
        apply_model_choice(session, display, &name);
        return;
    }

    println!(
        "    Available {} models:",
        session.provider().kind().label()
    );
    for (i, info) in session.models().iter().enumerate() {
        let marker = if info.id == session.model() { " *" } else { "" };
        println!("      {}. {} - {}{}", i + 1, info.id, info.description, marker);
    }
    match rl.readline("Select model (number) or 'cancel': ") {
        Ok(input) => {
            let input = input.trim();
            if input.eq_ignore_ascii_case("cancel") || input.is_empty() {
                display.print_info("Model unchanged.");
            } else {
                apply_model_choice(session, display, input);
            }
        }
        Err(_) => display.print_info("Model unchanged."),
    }
}

fn apply_model_choice(session: &mut ChatSession, display: &mut LiveDisplay, input: &str) {
    let chosen = match input.parse::<usize>() {
        Ok(index) => session.set_model_by_index(index).map(|id| id.to_string()),
        Err(_) => session.set_model(input).then(|| input.to_string()),
    };
    match chosen {
        Some(model) => display.print_info(&format!("Model changed to: {model}")),
        None => display.print_error("Invalid model choice."),
    }
}

/// Changes the provider, either directly by name or through a numbered menu.
fn change_provider(
    session: &mut ChatSession,
    rl: &mut DefaultEditor,
    display: &mut LiveDisplay,
    choice: Option<String>,
) {
    if let Some(name) = choice {
        apply_provider_choice(session, display, &name);
        return;
    }

    let kinds = session.provider_kinds();
    if kinds.len() <= 1 {
        display.print_info("Only one provider is configured.");
        return;
    }

    println!("    Available providers:");
    for (i, kind) in kinds.iter().enumerate() {
        let marker = if *kind == session.provider().kind() {
            " *"
        } else {
            ""
        };
        println!("      {}. {}{}", i + 1, kind.label(), marker);
    }
    match rl.readline("Select provider (number) or 'cancel': ") {
        Ok(input) => {
            let input = input.trim();
            if input.eq_ignore_ascii_case("cancel") || input.is_empty() {
                display.print_info("Provider unchanged.");
                return;
            }
            let by_index = input
                .parse::<usize>()
                .ok()
                .and_then(|i| kinds.get(i.checked_sub(1)?).copied());
            match by_index {
                Some(kind) => {
                    session.switch_provider(kind);
                    announce_provider(session, display);
                }
                None => apply_provider_choice(session, display, input),
            }
        }
        Err(_) => display.print_info("Provider unchanged."),
    }
}

fn apply_provider_choice(session: &mut ChatSession, display: &mut LiveDisplay, input: &str) {
    match ProviderKind::from_str(input) {
        Ok(kind) => {
            if session.switch_provider(kind) {
                announce_provider(session, display);
            } else {
                display.print_error(&format!(
                    "Provider {} is not configured (missing API key)",
                    kind.label()
                ));
            }
        }
        Err(e) => display.print_error(&e.to_string()),
    }
}

fn announce_provider(session: &ChatSession, display: &mut LiveDisplay) {
    display.print_info(&format!(
        "Switched to {} (model: {})",
        session.provider().kind().label(),
        session.model()
    ));
}

fn print_config(session: &ChatSession) {
    println!("    Current Configuration:");
    println!("      Provider: {}", session.provider().kind().label());
    println!("      Model: {}", session.model());
    println!(
        "      Markdown: {}",
        if session.use_markdown() { "on" } else { "off" }
    );
    println!(
        "      History: {} of {} turns",
        session.history().len(),
        session.history().max_len()
    );
}
