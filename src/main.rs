//! Botchat - multi-provider LLM chat
//!
#![doc = "Main entry point for the Botchat application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use botchat::cli::{Cli, Commands, ModelCommand};
use botchat::commands;
use botchat::config::Config;

/// Configuration file used when `--config` is not given
const DEFAULT_CONFIG_PATH: &str = "botchat.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_tracing(cli.verbose, cli.json_logs);

    let config_path = cli.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let config = Config::load(config_path, &cli)?;
    config.validate()?;

    match cli.command {
        Commands::Chat {
            model,
            session,
            no_stream,
            no_rag,
        } => {
            let stream = config.chat.stream && !no_stream;
            commands::chat::run_chat(config, model, session, stream, !no_rag).await
        }
        Commands::Ask {
            message,
            model,
            no_stream,
            no_rag,
        } => {
            let stream = config.chat.stream && !no_stream;
            commands::ask::run_ask(config, message, model, stream, !no_rag).await
        }
        Commands::Sessions { command } => {
            let controller = botchat::ConversationController::from_config(&config)?;
            commands::sessions::handle_sessions(&controller, command).await
        }
        Commands::Models { command } => match command {
            ModelCommand::List { provider, json } => {
                commands::models::list_models(&config, provider.as_deref(), json)
            }
        },
        Commands::Upload { file, session } => {
            let controller = botchat::ConversationController::from_config(&config)?;
            commands::upload::upload_file(&controller, &file, session.as_deref()).await?;
            Ok(())
        }
        Commands::Serve { bind } => commands::serve::run_serve(config, bind).await,
        Commands::Auth { provider } => commands::auth::authenticate(&provider),
    }
}

/// Initialize tracing on stderr with an environment filter
///
/// `RUST_LOG` wins; otherwise `--verbose` selects debug output.
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "botchat=debug" } else { "botchat=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
