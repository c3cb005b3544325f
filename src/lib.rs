use thiserror::Error;

pub type Result<T> = std::result::Result<T, PhysioError>;

#[derive(Error, Debug)]
pub enum PhysioError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Chart schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Tool budget exceeded after {0} tool calls in one turn")]
    ToolBudgetExceeded(usize),

    #[error("Model call timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod agent;
pub mod chart;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod llm;
pub mod prompt;
pub mod render;
pub mod retrieval;
