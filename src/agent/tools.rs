//! The two pipeline stages exposed to the model as tools: SQL generation
//! and execution, and chart negotiation.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::chart::{self, ChartFrame};
use crate::config::AgentConfig;
use crate::database::queries::statement_is_select;
use crate::database::{Database, TABLE_SCHEMA};
use crate::database::models::QueryResult;
use crate::embeddings::EmbeddingClient;
use crate::llm::{ChatClient, ChatMessage, ToolSpec};
use crate::prompt;
use crate::retrieval::ExampleStore;
use crate::{PhysioError, Result};

const SQL_DIALECT: &str = "SQLite";

/// System prompt for the negotiation stage. Fixes the exact JSON shapes,
/// forbids truncation, pins the date format, and puts the x axis first.
const VIZ_SYSTEM_PROMPT: &str = r#"You are a JSON expert designed to handle incoming data and reproduce the data in a JSON format. You MUST respond starting with the JSON bracket, so all responses must start with "{".
The response depends on the type of information requested in the data. Format the column names with regard to the original query.

1. If the data requires a table, format your answer like this:
{"table": {"columns": ["Date", "Squats", "Push Up"], "data": [["03-04-2024", 30, 21], ["05-13-2024", 25, 20]]}}

2. For a bar chart, respond like this:
{"bar": {"columns": ["Date", "Squats", "Push Up"], "data": [["03-04-2024", 30, 21], ["03-05-2024", 25, 20]]}}

3. If a line chart is more appropriate, your reply should look like this:
{"line": {"columns": ["Date", "Squats", "Push Up"], "data": [["03-04-2024", 30, 21], ["03-05-2024", 25, 20]]}}

Note: we only accommodate two types of charts: "bar" and "line".

4. If the answer is not known or cannot be represented with a table, line graph or bar graph, respond with:
{"answer": "A graph is incompatible with the query."}

Return all output as a single JSON string. Remember to encase all strings in the "columns" list and the data lists in double quotes.
Format dates as MM-DD-YYYY, so January 13 2024 must be 01-13-2024 and not 13-01-2024.
Do not truncate the data! Every data point must appear and the final JSON must be fully finished, never cut off like ["01-21-202.
If there is a date in the columns, prioritise it as the first entry in the columns list. Likewise, if the user specifies an x-axis, prioritise it at the front of the columns list and keep y-axis columns at the back. If the query is of the format Y against X, order it y-axis against x-axis."#;

#[derive(Debug, Clone, Deserialize)]
pub struct SqlQueryArgs {
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataVisualisationArgs {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub columns: String,
    pub graph: String,
}

/// Outcome of the SQL stage: chat-ready text plus the full result set for
/// potential reuse by the visualization stage.
#[derive(Debug, Clone)]
pub struct SqlAnswer {
    pub sql: String,
    pub summary: String,
    pub result: QueryResult,
}

/// Turns a natural-language question into one SELECT, runs it, and wraps
/// the result for the chat scratchpad.
#[derive(Debug, Clone)]
pub struct SqlQueryTool {
    chat: ChatClient,
    embeddings: EmbeddingClient,
    store: ExampleStore,
    database: Database,
    top_k: u32,
    retrieval_k: u32,
    enforce_select_only: bool,
}

impl SqlQueryTool {
    pub const NAME: &'static str = "sql_query_db_tool";

    #[inline]
    pub fn new(
        chat: ChatClient,
        embeddings: EmbeddingClient,
        store: ExampleStore,
        database: Database,
        agent_config: &AgentConfig,
    ) -> Self {
        Self {
            chat,
            embeddings,
            store,
            database,
            top_k: agent_config.top_k,
            retrieval_k: agent_config.retrieval_k,
            enforce_select_only: agent_config.enforce_select_only,
        }
    }

    #[inline]
    pub fn definition() -> ToolSpec {
        ToolSpec::function(
            Self::NAME,
            "Accepts the user's natural language question, runs a query against the exercise \
             database and returns the result. The question must be the exact same as the user's \
             original question, DO NOT MODIFY IT.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The user's natural language question, unmodified"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        )
    }

    /// Retrieve examples, build the prompt, generate one statement,
    /// execute it, and describe the result.
    #[inline]
    pub async fn answer(&self, question: &str) -> Result<SqlAnswer> {
        let examples = self
            .store
            .retrieve(&self.embeddings, question, self.retrieval_k as usize)?;
        debug!("Retrieved {} examples for question", examples.len());

        let context = prompt::build(question, SQL_DIALECT, self.top_k, TABLE_SCHEMA, examples);
        let messages = [
            ChatMessage::system(context.render_system()),
            ChatMessage::user(context.render_user()),
        ];

        let reply = self.chat.chat(&messages, None)?;
        let sql = extract_sql(reply.text())?;
        info!("Generated SQL: {}", sql);

        if self.enforce_select_only && !statement_is_select(&sql) {
            return Err(PhysioError::Execution(format!(
                "Refused to run a non-SELECT statement: {}",
                sql
            )));
        }

        let result = self.database.execute_select(&sql).await?;

        let summary = if result.is_empty() {
            format!("Query executed:\n{}\n\nNo rows matched.", sql)
        } else {
            format!(
                "Query executed:\n{}\n\nResult ({} rows, columns {}):\n{}",
                sql,
                result.rows.len(),
                result.columns_display(),
                result.to_display_string()
            )
        };

        Ok(SqlAnswer {
            sql,
            summary,
            result,
        })
    }
}

/// Asks the model for a strictly shaped chart descriptor and validates it
/// into a renderable frame.
#[derive(Debug, Clone)]
pub struct DataVisualisationTool {
    chat: ChatClient,
}

impl DataVisualisationTool {
    pub const NAME: &'static str = "data_visualisation_tool";

    #[inline]
    pub fn new(chat: ChatClient) -> Self {
        Self { chat }
    }

    #[inline]
    pub fn definition() -> ToolSpec {
        ToolSpec::function(
            Self::NAME,
            "Visualises data as a line graph, bar graph or table and shows it to the user. Must \
             only be run after sql_query_db_tool, at most one time per question. Pass on all the \
             data returned by sql_query_db_tool; the data must not be abbreviated by ... or any \
             other means.",
            json!({
                "type": "object",
                "properties": {
                    "data": {
                        "type": "string",
                        "description": "The data to visualise, as rows of values"
                    },
                    "columns": {
                        "type": "string",
                        "description": "Bracketed list of column names matching the data, e.g. '[date, squats]'"
                    },
                    "graph": {
                        "type": "string",
                        "description": "The type of visualisation to produce, e.g. bar graph, line graph or table"
                    }
                },
                "required": ["data", "columns", "graph"],
                "additionalProperties": false
            }),
        )
    }

    /// One negotiation round. The caller provides the full tabular data as
    /// text; the returned frame is ready to draw.
    #[inline]
    pub fn negotiate(
        &self,
        question: &str,
        data: &str,
        columns: &str,
        chart_hint: &str,
    ) -> Result<ChartFrame> {
        let user = format!(
            "Hello, this is my data: {}, with the following columns {}, and the following graph \
             conditions {} in response to this question {}. Please format it according to the \
             instructions",
            data, columns, chart_hint, question
        );
        let messages = [ChatMessage::system(VIZ_SYSTEM_PROMPT), ChatMessage::user(user)];

        let reply = self.chat.chat(&messages, None)?;
        let descriptor = chart::parse_descriptor(reply.text())?;
        debug!("Negotiated chart descriptor: {:?}", descriptor);

        descriptor.validate()
    }
}

/// Pulls one statement out of the model reply, tolerating markdown fences.
fn extract_sql(raw: &str) -> Result<String> {
    let mut text = raw.trim();

    if let Some(stripped) = text.strip_prefix("```sql").or_else(|| text.strip_prefix("```")) {
        text = stripped;
        if let Some(end) = text.find("```") {
            text = text.get(..end).unwrap_or(text);
        }
    }

    let sql = text.trim();
    if sql.is_empty() {
        return Err(PhysioError::Generation(
            "Model produced no SQL statement".to_string(),
        ));
    }

    Ok(sql.to_string())
}
