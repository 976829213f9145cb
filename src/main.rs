use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::io::Write;
use tracing_subscriber::{fmt, EnvFilter};

use relaygram::{config::Config, relay, security};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
}

/// `relaygram` - Telegram to OpenAI conversation relay.
#[derive(Parser, Debug)]
#[command(name = "relaygram")]
#[command(version)]
#[command(about = "Session-bounded Telegram to OpenAI conversation relay.", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the relay (long-polls Telegram until interrupted)
    #[command(long_about = "\
Start the relay.

Long-polls the Telegram Bot API and relays allowed users' messages to the
configured OpenAI models. Requires telegram.bot_token and openai.api_key
(or the TELEGRAM_BOT_TOKEN / OPENAI_API_KEY environment variables).

Examples:
  relaygram run
  TELEGRAM_BOT_TOKEN=... OPENAI_API_KEY=... ALLOWED_USERS=alice relaygram run")]
    Run,

    /// Show effective configuration (secrets redacted)
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// Generate shell completion script to stdout
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Dump the full configuration JSON Schema to stdout
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("RELAYGRAM_CONFIG_DIR", config_dir);
    }

    // Completions must remain stdout-only and should not load config or
    // initialize logging, so sourced scripts stay clean.
    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        write_shell_completion(*shell, &mut stdout)?;
        return Ok(());
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = Config::load_or_init().await?;

    match cli.command {
        Commands::Completions { .. } => unreachable!(),

        Commands::Run => {
            config.validate()?;
            relay::run(config).await
        }

        Commands::Status => {
            println!("relaygram status");
            println!();
            println!("Version:      {}", env!("CARGO_PKG_VERSION"));
            println!("Config:       {}", config.config_path.display());
            println!();
            println!(
                "Bot token:    {}",
                if config.telegram.bot_token.is_empty() {
                    "(not set)".to_string()
                } else {
                    security::redact(&config.telegram.bot_token)
                }
            );
            println!(
                "API key:      {}",
                if config.openai.api_key.is_empty() {
                    "(not set)".to_string()
                } else {
                    security::redact(&config.openai.api_key)
                }
            );
            println!("Chat model:   {}", config.openai.chat_model);
            println!(
                "TTS:          {} (voice: {})",
                config.openai.tts_model, config.openai.tts_voice
            );
            println!(
                "Image:        {} ({})",
                config.openai.image_model, config.openai.image_size
            );
            println!("Transcribe:   {}", config.openai.transcribe_model);
            println!();
            println!(
                "Allowed:      {}",
                if config.telegram.allowed_users.is_empty() {
                    "(nobody - every sender is refused)".to_string()
                } else {
                    config.telegram.allowed_users.join(", ")
                }
            );
            println!("Max history:  {} messages", config.history.max_messages);
            println!("Retention:    {}s idle", config.history.retention_secs);
            Ok(())
        }

        Commands::Config { config_command } => match config_command {
            ConfigCommands::Schema => {
                let schema = schemars::schema_for!(Config);
                println!(
                    "{}",
                    serde_json::to_string_pretty(&schema).expect("failed to serialize JSON Schema")
                );
                Ok(())
            }
        },
    }
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name, writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name, writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, Parser};

    #[test]
    fn cli_definition_has_no_flag_conflicts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn completions_cli_parses_supported_shells() {
        for shell in ["bash", "fish", "zsh"] {
            let cli = Cli::try_parse_from(["relaygram", "completions", shell])
                .expect("completions invocation should parse");
            match cli.command {
                Commands::Completions { .. } => {}
                other => panic!("expected completions command, got {other:?}"),
            }
        }
    }

    #[test]
    fn completion_generation_mentions_binary_name() {
        let mut output = Vec::new();
        write_shell_completion(CompletionShell::Bash, &mut output)
            .expect("completion generation should succeed");
        let script = String::from_utf8(output).expect("completion output should be valid utf-8");
        assert!(script.contains("relaygram"));
    }
}
