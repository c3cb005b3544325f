//! Tool-calling orchestrator: a bounded state machine that decides, per
//! user turn, whether to run the SQL stage, the visualization stage, both
//! in sequence, or neither.

#[cfg(test)]
mod tests;

pub mod conversation;
pub mod tools;

pub use conversation::{Conversation, Role, Turn};
pub use tools::{DataVisualisationTool, SqlQueryTool};

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::database::models::QueryResult;
use crate::llm::{ChatClient, ChatMessage, ToolCall, ToolSpec};
use crate::render::Renderer;
use crate::{PhysioError, Result};

const ORCHESTRATOR_SYSTEM_PROMPT: &str = "You are a very powerful assistant chatbot helping people exercise healthier. You have \
     access to tools to query the user's exercise database named physio_table and to turn that \
     data into a visualisation chart. When using sql_query_db_tool, DO NOT MODIFY THE ORIGINAL \
     QUESTION. If the user wants a data visualisation chart, run sql_query_db_tool first to get \
     the data before running data_visualisation_tool to visualise it. If a bar chart, line chart \
     or table is required by the user, you must use data_visualisation_tool. Answer plain \
     questions directly from the tool results.";

/// Keywords that signal a visualization request.
const VIZ_KEYWORDS: [&str; 5] = ["chart", "graph", "plot", "table", "visuali"];

/// Granularity phrases that, when present, suppress the per-day rewrite.
const GRANULARITY_KEYWORDS: [&str; 10] = [
    "per day",
    "per week",
    "per month",
    "per year",
    "per hour",
    "daily",
    "weekly",
    "monthly",
    "yearly",
    "hourly",
];

/// What the caller gets back from one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub reply: String,
    pub charts_drawn: usize,
}

/// Per-turn loop state. `Deciding` asks the model for the next move,
/// `Executing` runs the requested tools, `Done` carries the final answer.
enum TurnState {
    Deciding,
    Executing(Vec<ToolCall>),
    Done(String),
}

pub struct Orchestrator {
    chat: ChatClient,
    sql_tool: SqlQueryTool,
    viz_tool: DataVisualisationTool,
    renderer: Arc<dyn Renderer>,
    max_tool_calls: usize,
}

impl Orchestrator {
    #[inline]
    pub fn new(
        chat: ChatClient,
        sql_tool: SqlQueryTool,
        viz_tool: DataVisualisationTool,
        renderer: Arc<dyn Renderer>,
        max_tool_calls: usize,
    ) -> Self {
        Self {
            chat,
            sql_tool,
            viz_tool,
            renderer,
            max_tool_calls,
        }
    }

    /// Run one user turn to completion. Every failure mode is converted to
    /// a user-visible reply; the conversation always gains exactly one user
    /// and one assistant turn.
    #[inline]
    pub async fn run_turn(&self, conversation: &mut Conversation, user_text: &str) -> TurnOutcome {
        info!(
            session = %conversation.session_id(),
            "Starting turn: {}",
            user_text
        );
        conversation.append(Turn::user(user_text));

        let outcome = match self.drive(user_text).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Turn failed: {}", err);
                TurnOutcome {
                    reply: user_visible_message(&err),
                    charts_drawn: 0,
                }
            }
        };

        conversation.append(Turn::assistant(outcome.reply.clone()));
        outcome
    }

    async fn drive(&self, user_text: &str) -> Result<TurnOutcome> {
        let tools = [SqlQueryTool::definition(), DataVisualisationTool::definition()];
        let mut scratch = vec![
            ChatMessage::system(ORCHESTRATOR_SYSTEM_PROMPT),
            ChatMessage::user(user_text),
        ];

        let mut calls_used = 0usize;
        let mut charts_drawn = 0usize;
        let mut last_result: Option<QueryResult> = None;
        let mut state = TurnState::Deciding;

        loop {
            state = match state {
                TurnState::Deciding => {
                    let reply = self.chat.chat(&scratch, Some(&tools))?;
                    if reply.requested_tool_calls().is_empty() {
                        TurnState::Done(reply.text().to_string())
                    } else {
                        let calls = reply.requested_tool_calls().to_vec();
                        scratch.push(reply);
                        TurnState::Executing(calls)
                    }
                }
                TurnState::Executing(calls) => {
                    for call in calls {
                        if calls_used == self.max_tool_calls {
                            return Err(PhysioError::ToolBudgetExceeded(calls_used));
                        }
                        calls_used += 1;

                        let result_text = self
                            .execute_tool(&call, user_text, &mut last_result, &mut charts_drawn)
                            .await;
                        scratch.push(ChatMessage::tool(call.id.clone(), result_text));
                    }
                    TurnState::Deciding
                }
                TurnState::Done(reply) => {
                    debug!(
                        "Turn complete after {} tool calls, {} charts",
                        calls_used, charts_drawn
                    );
                    return Ok(TurnOutcome {
                        reply,
                        charts_drawn,
                    });
                }
            };
        }
    }

    /// Dispatch one tool call. Failures never escape this boundary; they
    /// come back as scratchpad text for the model (and the user) to see.
    async fn execute_tool(
        &self,
        call: &ToolCall,
        user_text: &str,
        last_result: &mut Option<QueryResult>,
        charts_drawn: &mut usize,
    ) -> String {
        debug!("Executing tool: {}", call.function.name);

        match call.function.name.as_str() {
            SqlQueryTool::NAME => {
                let args: tools::SqlQueryArgs = match serde_json::from_str(&call.function.arguments)
                {
                    Ok(args) => args,
                    Err(e) => return format!("Invalid arguments for {}: {}", SqlQueryTool::NAME, e),
                };

                let question = rewrite_granularity(&args.query);
                match self.sql_tool.answer(&question).await {
                    Ok(answer) => {
                        *last_result = Some(answer.result);
                        answer.summary
                    }
                    Err(err) => {
                        warn!("SQL stage failed: {}", err);
                        format!("The query could not be answered: {}", err)
                    }
                }
            }
            DataVisualisationTool::NAME => {
                if *charts_drawn >= 1 {
                    return "data_visualisation_tool may only run once per question; the chart \
                            has already been drawn."
                        .to_string();
                }

                let args: tools::DataVisualisationArgs =
                    match serde_json::from_str(&call.function.arguments) {
                        Ok(args) => args,
                        Err(e) => {
                            return format!(
                                "Invalid arguments for {}: {}",
                                DataVisualisationTool::NAME,
                                e
                            );
                        }
                    };

                // The negotiation stage always receives the store's full,
                // untruncated result, not the model's echo of it.
                let Some(result) = last_result.as_ref() else {
                    return "No query result is available yet. Run sql_query_db_tool first, then \
                            call data_visualisation_tool."
                        .to_string();
                };

                match self.viz_tool.negotiate(
                    user_text,
                    &result.to_display_string(),
                    &result.columns_display(),
                    &args.graph,
                ) {
                    Ok(frame) => {
                        self.renderer.draw(&frame);
                        *charts_drawn += 1;
                        "The visualisation was rendered for the user.".to_string()
                    }
                    Err(err) => {
                        warn!("Visualization stage failed: {}", err);
                        format!("The chart could not be rendered: {}", err)
                    }
                }
            }
            unknown => format!("Unknown tool: {}", unknown),
        }
    }
}

/// A visualization question with no explicit granularity defaults to per
/// day, so a year-long chart does not collapse into one point per year.
#[inline]
pub fn rewrite_granularity(question: &str) -> String {
    let lowered = question.to_lowercase();

    let wants_visualization = VIZ_KEYWORDS.iter().any(|kw| lowered.contains(kw));
    let has_granularity = GRANULARITY_KEYWORDS.iter().any(|kw| lowered.contains(kw));

    if wants_visualization && !has_granularity {
        format!("{} per day", question.trim_end())
    } else {
        question.to_string()
    }
}

/// Convert a turn-level failure into chat text. Nothing the pipeline can
/// produce should ever crash the session.
fn user_visible_message(err: &PhysioError) -> String {
    match *err {
        PhysioError::ToolBudgetExceeded(used) => format!(
            "I had to stop: this question needed more than {} tool calls, which is over the \
             per-question limit. Try asking something more specific.",
            used
        ),
        PhysioError::Timeout(seconds) => format!(
            "The model did not respond within {} seconds, so I gave up on this question. \
             Please try again.",
            seconds
        ),
        ref other => format!("I was unable to answer that: {}", other),
    }
}
