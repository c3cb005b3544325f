use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use console::style;
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::info;

use crate::agent::{Conversation, DataVisualisationTool, Orchestrator, SqlQueryTool};
use crate::config::Config;
use crate::database::Database;
use crate::database::models::{EntryFilter, NewEntry};
use crate::embeddings::EmbeddingClient;
use crate::llm::ChatClient;
use crate::render::{TerminalRenderer, format_table};
use crate::retrieval::{ExampleStore, default_corpus};

const EXERCISE_TYPES: [&str; 2] = ["Squat", "Push Up"];

/// Interactive chat session. One orchestrator turn per line of input; the
/// full transcript lives only as long as the session.
pub async fn chat(config: Config) -> Result<()> {
    let orchestrator = build_orchestrator(&config).await?;
    let mut conversation = Conversation::new();

    println!(
        "{}",
        style("Ask any question related to your exercise history! (type 'exit' to quit)").dim()
    );

    loop {
        let input: String = Input::new()
            .with_prompt(style("You").cyan().bold().to_string())
            .allow_empty(true)
            .interact_text()
            .context("Failed to read input")?;

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
            break;
        }

        let spinner = thinking_spinner();
        let outcome = orchestrator.run_turn(&mut conversation, trimmed).await;
        spinner.finish_and_clear();

        println!("{} {}", style("Assistant").green().bold(), outcome.reply);
    }

    info!(
        "Session {} ended after {} turns",
        conversation.session_id(),
        conversation.len()
    );
    Ok(())
}

/// One-shot question, no session loop.
pub async fn ask(config: Config, question: &str) -> Result<()> {
    let orchestrator = build_orchestrator(&config).await?;
    let mut conversation = Conversation::new();

    let spinner = thinking_spinner();
    let outcome = orchestrator.run_turn(&mut conversation, question).await;
    spinner.finish_and_clear();

    println!("{}", outcome.reply);
    Ok(())
}

/// Insert `count` random entries spread over the past year, 09:00-22:00.
pub async fn seed(config: Config, count: u32, assume_yes: bool) -> Result<()> {
    if !assume_yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Add {} random entries to the exercise log?", count))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let database = Database::new(config.database_path()).await?;
    let progress = ProgressBar::new(u64::from(count));
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} entries")
            .context("Invalid progress template")?,
    );

    let mut rng = rand::thread_rng();
    let now = chrono::Local::now().naive_local();
    for _ in 0..count {
        let days_ago = rng.gen_range(0..365);
        let minutes = rng.gen_range(9 * 60..22 * 60);
        let date = now.date() - Duration::days(days_ago);
        let datetime = NaiveDateTime::new(
            date,
            NaiveTime::from_num_seconds_from_midnight_opt(
                minutes * 60,
                rng.gen_range(0..1_000_000) * 1000,
            )
            .unwrap_or(NaiveTime::MIN),
        );

        let entry = NewEntry {
            datetime,
            count: rng.gen_range(1..=40),
            physio_type: EXERCISE_TYPES[rng.gen_range(0..EXERCISE_TYPES.len())].to_string(),
        };
        database.insert_entry(entry).await?;
        progress.inc(1);
    }
    progress.finish();

    println!("{} random entries added successfully!", count);
    Ok(())
}

/// Filtered history, newest first.
pub async fn history(
    config: Config,
    from: Option<String>,
    to: Option<String>,
    exercise_type: Option<String>,
    id: Option<i64>,
) -> Result<()> {
    let database = Database::new(config.database_path()).await?;
    let filter = build_filter(from, to, exercise_type, id)?;
    let entries = database.list_entries(&filter).await?;

    if entries.is_empty() {
        println!("No matching records found. Try adjusting your filters.");
        return Ok(());
    }

    let columns = vec![
        "ID".to_string(),
        "Date".to_string(),
        "Time".to_string(),
        "Count".to_string(),
        "Type".to_string(),
    ];
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|entry| {
            vec![
                entry.id.to_string(),
                entry.datetime.date().to_string(),
                entry.datetime.time().format("%H:%M:%S").to_string(),
                entry.count.to_string(),
                entry.physio_type.clone(),
            ]
        })
        .collect();

    println!("{}", format_table(&columns, &rows));
    println!("{} records found.", entries.len());
    Ok(())
}

/// Manual entry, defaulting to now.
pub async fn add(
    config: Config,
    count: i64,
    physio_type: String,
    at: Option<String>,
) -> Result<()> {
    if count < 1 {
        bail!("Count must be at least 1");
    }

    let datetime = match at {
        Some(ref text) => parse_datetime(text, false)?,
        None => chrono::Local::now().naive_local(),
    };

    let database = Database::new(config.database_path()).await?;
    let entry = database
        .insert_entry(NewEntry {
            datetime,
            count,
            physio_type,
        })
        .await?;

    println!(
        "Recorded entry {}: {} x {} at {}",
        entry.id, entry.count, entry.physio_type, entry.datetime
    );
    Ok(())
}

/// Filtered delete, or `--all` to clear the table and reset IDs. A delete
/// with no filters is refused rather than silently clearing everything.
pub async fn delete(
    config: Config,
    from: Option<String>,
    to: Option<String>,
    exercise_type: Option<String>,
    id: Option<i64>,
    all: bool,
    assume_yes: bool,
) -> Result<()> {
    let database = Database::new(config.database_path()).await?;

    if all {
        if !assume_yes {
            let confirmed = Confirm::new()
                .with_prompt("This will delete ALL records permanently. Are you sure?")
                .default(false)
                .interact()
                .context("Failed to read confirmation")?;
            if !confirmed {
                println!("Aborted.");
                return Ok(());
            }
        }
        let deleted = database.delete_all_entries().await?;
        println!("All records deleted ({} entries removed).", deleted);
        return Ok(());
    }

    let filter = build_filter(from, to, exercise_type, id)?;
    if filter.is_empty() {
        bail!("Refusing to delete without filters; pass --all to clear the whole log");
    }

    if !assume_yes {
        let confirmed = Confirm::new()
            .with_prompt("Delete the selected records? This action cannot be undone.")
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let deleted = database.delete_entries(&filter).await?;
    println!("Successfully deleted {} records.", deleted);
    Ok(())
}

/// Print the effective configuration.
pub fn show_config(config: &Config) -> Result<()> {
    println!("Configuration directory: {}", config.base_dir.display());
    println!("Database: {}", config.database_path().display());
    println!();
    println!("[openai]");
    println!("base_url = {}", config.openai.base_url);
    println!("chat_model = {}", config.openai.chat_model);
    println!("embedding_model = {}", config.openai.embedding_model);
    println!("timeout_seconds = {}", config.openai.timeout_seconds);
    println!();
    println!("[agent]");
    println!("top_k = {}", config.agent.top_k);
    println!("retrieval_k = {}", config.agent.retrieval_k);
    println!("max_tool_calls = {}", config.agent.max_tool_calls);
    println!("enforce_select_only = {}", config.agent.enforce_select_only);
    Ok(())
}

/// Interactive configuration editor.
pub fn run_interactive_config(mut config: Config) -> Result<()> {
    config.openai.base_url = Input::new()
        .with_prompt("OpenAI-compatible base URL")
        .default(config.openai.base_url.clone())
        .interact_text()
        .context("Failed to read base URL")?;

    config.openai.chat_model = Input::new()
        .with_prompt("Chat model")
        .default(config.openai.chat_model.clone())
        .interact_text()
        .context("Failed to read chat model")?;

    config.openai.embedding_model = Input::new()
        .with_prompt("Embedding model")
        .default(config.openai.embedding_model.clone())
        .interact_text()
        .context("Failed to read embedding model")?;

    config.save()?;
    println!("Configuration saved.");
    Ok(())
}

async fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let api_key = config.api_key().context(
        "To use the chatbot, set your OpenAI key in the OPENAI_KEY environment variable",
    )?;

    let chat = ChatClient::new(config, api_key.clone())?;
    let embeddings = EmbeddingClient::new(config, api_key)?;
    let database = Database::new(config.database_path()).await?;

    let spinner = ProgressBar::new_spinner().with_message("Indexing example corpus...");
    spinner.enable_steady_tick(StdDuration::from_millis(100));
    let store = ExampleStore::load(&embeddings, default_corpus())?;
    spinner.finish_and_clear();

    let sql_tool = SqlQueryTool::new(
        chat.clone(),
        embeddings,
        store,
        database,
        &config.agent,
    );
    let viz_tool = DataVisualisationTool::new(chat.clone());

    Ok(Orchestrator::new(
        chat,
        sql_tool,
        viz_tool,
        Arc::new(TerminalRenderer::new()),
        config.agent.max_tool_calls as usize,
    ))
}

fn thinking_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner().with_message("Thinking...");
    spinner.enable_steady_tick(StdDuration::from_millis(100));
    spinner
}

fn build_filter(
    from: Option<String>,
    to: Option<String>,
    exercise_type: Option<String>,
    id: Option<i64>,
) -> Result<EntryFilter> {
    Ok(EntryFilter {
        start: from.map(|text| parse_datetime(&text, false)).transpose()?,
        end: to.map(|text| parse_datetime(&text, true)).transpose()?,
        physio_type: exercise_type.filter(|t| !t.trim().is_empty()),
        id,
    })
}

/// Accepts `YYYY-MM-DD HH:MM:SS` or a bare date. A bare date expands to the
/// start of the day, or the end of it when used as an upper bound.
fn parse_datetime(text: &str, end_of_day: bool) -> Result<NaiveDateTime> {
    if let Ok(datetime) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Ok(datetime);
    }

    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", text))?;
    let time = if end_of_day {
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .context("Invalid time bounds")?;

    Ok(NaiveDateTime::new(date, time))
}
