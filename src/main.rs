use clap::{Parser, Subcommand};
use physio_chat::Result;
use physio_chat::commands::{add, ask, chat, delete, history, run_interactive_config, seed, show_config};
use physio_chat::config::{Config, get_config_dir};

#[derive(Parser)]
#[command(name = "physio-chat")]
#[command(about = "Chat with your exercise log: natural-language SQL with chart rendering")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// Ask a single question and exit
    Ask {
        /// The question, e.g. "How many squats did I do in May?"
        question: String,
    },
    /// Insert random exercise entries for testing
    Seed {
        /// Number of entries to generate
        #[arg(long, default_value_t = 10)]
        count: u32,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show recorded entries, optionally filtered
    History {
        /// Earliest date to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Latest date to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Exercise type, e.g. "Squat"
        #[arg(long = "type")]
        exercise_type: Option<String>,
        /// Specific entry ID
        #[arg(long)]
        id: Option<i64>,
    },
    /// Record one exercise entry manually
    Add {
        /// Repetition count
        #[arg(long)]
        count: i64,
        /// Exercise type, e.g. "Squat"
        #[arg(long = "type")]
        exercise_type: String,
        /// Timestamp (YYYY-MM-DD or "YYYY-MM-DD HH:MM:SS"), defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    /// Delete entries matching the filters, or everything with --all
    Delete {
        /// Earliest date to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Latest date to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Exercise type, e.g. "Squat"
        #[arg(long = "type")]
        exercise_type: Option<String>,
        /// Specific entry ID
        #[arg(long)]
        id: Option<i64>,
        /// Delete every entry and reset IDs
        #[arg(long)]
        all: bool,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Configure model names and endpoint
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(get_config_dir().map_err(anyhow::Error::from)?)?;

    match cli.command {
        Commands::Chat => {
            chat(config).await?;
        }
        Commands::Ask { question } => {
            ask(config, &question).await?;
        }
        Commands::Seed { count, yes } => {
            seed(config, count, yes).await?;
        }
        Commands::History {
            from,
            to,
            exercise_type,
            id,
        } => {
            history(config, from, to, exercise_type, id).await?;
        }
        Commands::Add {
            count,
            exercise_type,
            at,
        } => {
            add(config, count, exercise_type, at).await?;
        }
        Commands::Delete {
            from,
            to,
            exercise_type,
            id,
            all,
            yes,
        } => {
            delete(config, from, to, exercise_type, id, all, yes).await?;
        }
        Commands::Config { show } => {
            if show {
                show_config(&config)?;
            } else {
                run_interactive_config(config)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["physio-chat", "chat"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Chat);
        }
    }

    #[test]
    fn ask_takes_a_question() {
        let cli = Cli::try_parse_from(["physio-chat", "ask", "How many squats?"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask { question } = parsed.command {
                assert_eq!(question, "How many squats?");
            }
        }
    }

    #[test]
    fn seed_defaults_to_ten() {
        let cli = Cli::try_parse_from(["physio-chat", "seed"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Seed { count, yes } = parsed.command {
                assert_eq!(count, 10);
                assert!(!yes);
            }
        }
    }

    #[test]
    fn history_accepts_filters() {
        let cli = Cli::try_parse_from([
            "physio-chat",
            "history",
            "--from",
            "2024-05-01",
            "--type",
            "Squat",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::History {
                from,
                exercise_type,
                ..
            } = parsed.command
            {
                assert_eq!(from.as_deref(), Some("2024-05-01"));
                assert_eq!(exercise_type.as_deref(), Some("Squat"));
            }
        }
    }

    #[test]
    fn delete_requires_no_positional_args() {
        let cli = Cli::try_parse_from(["physio-chat", "delete", "--all", "--yes"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Delete { all, yes, .. } = parsed.command {
                assert!(all);
                assert!(yes);
            }
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["physio-chat", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["physio-chat", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }
}
