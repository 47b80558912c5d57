/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `chat`: Interactive chat REPL
- `ask`: One turn against the active session
- `sessions`, `models`, `upload`, `serve`, `auth`: the remaining subcommands

Handlers are thin: they build a [`ConversationController`] from
configuration and print what it returns.
*/

use crate::config::Config;
use crate::controller::{ConversationController, TurnOptions, TurnReply};
use crate::error::Result;
use colored::Colorize;
use std::io::Write;
use tokio_util::sync::CancellationToken;

pub mod auth;
pub mod models;
pub mod serve;
pub mod sessions;
pub mod special_commands;
pub mod upload;

/// Run one turn, streaming fragments to stdout when `stream` is set
///
/// Ctrl-C while a reply streams cancels that reply only.
///
/// # Errors
///
/// Returns error for oversized input, a turn already in flight, or a
/// storage failure. Provider failures come back as an annotated reply.
pub async fn run_turn(
    controller: &ConversationController,
    text: &str,
    options: &TurnOptions,
    stream: bool,
) -> Result<Option<TurnReply>> {
    if !stream {
        let reply = controller.send_turn(text, options).await?;
        if let Some(reply) = &reply {
            print_reply(&reply.text, reply.is_error);
        }
        return Ok(reply);
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let mut started = false;
    let result = controller
        .send_turn_streaming(text, options, cancel, |fragment| {
            if !started {
                print!("\n{} ", "AI:".blue().bold());
                started = true;
            }
            print!("{}", fragment);
            let _ = std::io::stdout().flush();
        })
        .await;
    interrupt.abort();

    if let Ok(Some(reply)) = &result {
        if reply.cancelled {
            println!("\n{}", "(cancelled)".dimmed());
        }
        println!("\n");
    }
    result
}

fn print_reply(text: &str, is_error: bool) {
    if is_error {
        println!("\n{}\n", text.red());
    } else {
        println!("\n{} {}\n", "AI:".blue().bold(), text);
    }
}

// Interactive chat handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Runs a readline loop over the conversation controller. Lines starting
    //! with `/` are special commands; everything else is a chat turn.

    use super::*;
    use crate::commands::sessions::{
        print_sessions_table, print_stats, print_transcript, short_id, write_export,
    };
    use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
    use crate::export::search_messages;
    use crate::session::display_title;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    /// Start interactive chat mode
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `model` - Initial model identifier
    /// * `session` - Session to resume by id or prefix
    /// * `stream` - Stream replies as they arrive
    /// * `rag` - Augment prompts with uploaded documents
    pub async fn run_chat(
        config: Config,
        model: Option<String>,
        session: Option<String>,
        stream: bool,
        rag: bool,
    ) -> Result<()> {
        tracing::info!("Starting interactive chat mode");

        let controller = ConversationController::from_config(&config)?;
        if let Some(id) = session.as_deref() {
            controller.switch_session(id)?;
        }
        let rag = rag && config.retrieval.enabled && controller.has_retrieval();
        let mut options = TurnOptions::new(model, rag);

        let mut rl = DefaultEditor::new()?;
        print_welcome_banner(&controller, &options)?;

        loop {
            let prompt = format!("{} ", "You:".green().bold());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(trimmed);

                    let command = match parse_special_command(trimmed) {
                        Ok(command) => command,
                        Err(e) => {
                            eprintln!("{}\n", e.to_string().red());
                            continue;
                        }
                    };

                    match command {
                        SpecialCommand::Exit => break,
                        SpecialCommand::None => {
                            if let Err(e) = run_turn(&controller, trimmed, &options, stream).await
                            {
                                eprintln!("{} {}\n", "Error:".red().bold(), e);
                            }
                        }
                        other => {
                            if let Err(e) =
                                handle_special(&controller, &config, &mut options, other).await
                            {
                                eprintln!("{} {}\n", "Error:".red().bold(), e);
                            }
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        controller.wait_for_background_tasks().await;
        println!("Goodbye!");
        Ok(())
    }

    /// Apply one special command
    ///
    /// # Errors
    ///
    /// Returns error when the command's session or storage operation fails
    pub async fn handle_special(
        controller: &ConversationController,
        config: &Config,
        options: &mut TurnOptions,
        command: SpecialCommand,
    ) -> Result<()> {
        match command {
            SpecialCommand::NewSession(title) => {
                let session = controller.create_session(title.as_deref())?;
                println!(
                    "Started session {} ({})\n",
                    short_id(&session.id).cyan(),
                    display_title(&session)
                );
            }
            SpecialCommand::ListSessions => {
                let active = controller.active_session()?;
                print_sessions_table(&controller.sessions()?, &active.id);
            }
            SpecialCommand::SwitchSession(id) => {
                let session = controller.switch_session(&id)?;
                println!(
                    "Switched to {} ({})\n",
                    short_id(&session.id).cyan(),
                    display_title(&session)
                );
                print_transcript(&controller.messages()?);
            }
            SpecialCommand::DeleteSession(id) => {
                let deleted = controller.delete_session(&id).await?;
                let active = controller.active_session()?;
                println!(
                    "Deleted {}. Active session: {} ({})\n",
                    short_id(&deleted),
                    short_id(&active.id).cyan(),
                    display_title(&active)
                );
            }
            SpecialCommand::Rename(title) => {
                let active = controller.active_session()?;
                controller.rename_session(&active.id, &title)?;
                println!("Renamed session to {}\n", title.bold());
            }
            SpecialCommand::SwitchModel(model) => {
                let resolved = controller.orchestrator().resolve(Some(&model))?;
                if resolved.fell_back {
                    println!(
                        "{} Unknown model '{}'; using {}:{}\n",
                        "Warning:".yellow().bold(),
                        model,
                        resolved.provider.id(),
                        resolved.model
                    );
                } else {
                    println!(
                        "Now using {} ({})\n",
                        resolved.model.cyan(),
                        resolved.provider.display_name()
                    );
                }
                options.model = Some(model);
            }
            SpecialCommand::ListModels => {
                crate::commands::models::list_models(config, None, false)?;
            }
            SpecialCommand::Export { format, path } => {
                let messages = controller.messages()?;
                let written = write_export(&messages, format, path.as_deref())?;
                println!("Exported to {}\n", written.display());
            }
            SpecialCommand::Search(query) => {
                let messages = controller.messages()?;
                let hits = search_messages(&messages, &query);
                if hits.is_empty() {
                    println!("No messages match '{}'\n", query);
                }
                for (index, message) in hits {
                    println!("[{}] {}: {}", index + 1, message.sender.label(), message.text);
                }
                println!();
            }
            SpecialCommand::Stats => {
                print_stats(&controller.messages()?);
                println!();
            }
            SpecialCommand::Clear => {
                controller.clear_messages()?;
                println!("Conversation cleared\n");
            }
            SpecialCommand::Help => print_help(),
            SpecialCommand::Exit | SpecialCommand::None => {}
        }
        Ok(())
    }

    fn print_welcome_banner(controller: &ConversationController, options: &TurnOptions) -> Result<()> {
        let active = controller.active_session()?;
        let resolved = controller.orchestrator().resolve(options.model.as_deref())?;

        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                 Botchat - Interactive Chat                   ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!(
            "Session: {} ({})",
            short_id(&active.id).cyan(),
            display_title(&active)
        );
        println!(
            "Model:   {} via {}",
            resolved.model.cyan(),
            resolved.provider.display_name()
        );
        if options.retrieval {
            println!("Documents: {}", "retrieval on".green());
        }
        println!("\nType '/help' for available commands, 'exit' to quit\n");
        Ok(())
    }
}

// Single-shot handler
pub mod ask {
    use super::*;

    /// Send one message to the active session and print the reply
    ///
    /// # Errors
    ///
    /// Returns error for empty or oversized input or a storage failure
    pub async fn run_ask(
        config: Config,
        message: String,
        model: Option<String>,
        stream: bool,
        rag: bool,
    ) -> Result<()> {
        let controller = ConversationController::from_config(&config)?;
        let rag = rag && config.retrieval.enabled && controller.has_retrieval();
        let options = TurnOptions::new(model, rag);

        let reply = run_turn(&controller, &message, &options, stream).await?;
        if reply.is_none() {
            return Err(crate::error::BotchatError::Validation(
                "Message cannot be empty".to_string(),
            )
            .into());
        }
        controller.wait_for_background_tasks().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::special_commands::SpecialCommand;
    use crate::controller::ControllerSettings;
    use crate::export::ExportFormat;
    use crate::orchestrator::Orchestrator;
    use crate::providers::ProviderRegistry;
    use crate::session::SessionStore;
    use crate::storage::MemorySessionRepository;
    use crate::test_utils::{temp_dir, ScriptedProvider};
    use std::sync::Arc;

    fn controller(provider: ScriptedProvider) -> ConversationController {
        let mut registry = ProviderRegistry::new("openai", "gpt-4o-mini");
        registry.register(Arc::new(provider));
        let store = SessionStore::open(Arc::new(MemorySessionRepository::new())).unwrap();
        ConversationController::new(
            store,
            Orchestrator::new(Arc::new(registry)),
            None,
            ControllerSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_run_turn_non_streaming() {
        let controller = controller(ScriptedProvider::replying("openai", "Hello!"));
        let reply = run_turn(&controller, "hi", &TurnOptions::default(), false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.text, "Hello!");
        assert_eq!(controller.messages().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_run_turn_streaming_accumulates() {
        let controller = controller(ScriptedProvider::streaming("openai", &["Hel", "lo"]));
        let reply = run_turn(&controller, "hi", &TurnOptions::default(), true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.text, "Hello");
        assert!(!reply.cancelled);
    }

    #[tokio::test]
    async fn test_handle_special_session_commands() {
        let controller = controller(ScriptedProvider::replying("openai", "ok"));
        let config = Config::default();
        let mut options = TurnOptions::default();
        let first = controller.active_session().unwrap();

        chat::handle_special(
            &controller,
            &config,
            &mut options,
            SpecialCommand::NewSession(Some("Second".to_string())),
        )
        .await
        .unwrap();
        assert_eq!(controller.sessions().unwrap().len(), 2);
        assert_eq!(controller.active_session().unwrap().title, "Second");

        chat::handle_special(
            &controller,
            &config,
            &mut options,
            SpecialCommand::Rename("Renamed".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(controller.active_session().unwrap().title, "Renamed");

        chat::handle_special(
            &controller,
            &config,
            &mut options,
            SpecialCommand::SwitchSession(first.id.clone()),
        )
        .await
        .unwrap();
        assert_eq!(controller.active_session().unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_handle_special_model_and_clear() {
        let controller = controller(ScriptedProvider::replying("openai", "ok"));
        let config = Config::default();
        let mut options = TurnOptions::default();

        chat::handle_special(
            &controller,
            &config,
            &mut options,
            SpecialCommand::SwitchModel("gpt-3.5-turbo".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(options.model.as_deref(), Some("gpt-3.5-turbo"));

        controller.send_turn("hi", &options).await.unwrap();
        chat::handle_special(&controller, &config, &mut options, SpecialCommand::Clear)
            .await
            .unwrap();
        assert!(controller.messages().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handle_special_export_writes_file() {
        let controller = controller(ScriptedProvider::replying("openai", "ok"));
        controller
            .send_turn("hi", &TurnOptions::default())
            .await
            .unwrap();
        let dir = temp_dir();
        let path = dir.path().join("out.md");

        chat::handle_special(
            &controller,
            &Config::default(),
            &mut TurnOptions::default(),
            SpecialCommand::Export {
                format: ExportFormat::Markdown,
                path: Some(path.clone()),
            },
        )
        .await
        .unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("**USER**: hi"));
    }
}
