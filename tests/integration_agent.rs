#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use physio_chat::agent::{Conversation, DataVisualisationTool, Orchestrator, SqlQueryTool};
use physio_chat::chart::{ChartFrame, PlotKind};
use physio_chat::config::Config;
use physio_chat::database::Database;
use physio_chat::database::models::NewEntry;
use physio_chat::embeddings::EmbeddingClient;
use physio_chat::llm::ChatClient;
use physio_chat::render::Renderer;
use physio_chat::retrieval::{ExampleStore, default_corpus};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Match, Mock, MockServer, Request, Respond, ResponseTemplate};

/// Matches requests whose body does NOT contain the given needle. Used to
/// make the scripted orchestrator rounds disjoint.
struct BodyLacks(&'static str);

impl Match for BodyLacks {
    fn matches(&self, request: &Request) -> bool {
        !String::from_utf8_lossy(&request.body).contains(self.0)
    }
}

/// Responds to /embeddings with one fixed vector per input entry.
struct EmbedResponder;

impl Respond for EmbedResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).expect("embedding request should be JSON");
        let count = body["input"].as_array().map_or(1, Vec::len);

        let data: Vec<serde_json::Value> = (0..count)
            .map(|index| json!({"embedding": [0.1, 0.2, 0.3], "index": index}))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "data": data }))
    }
}

fn tool_call_response(name: &str, arguments: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": name,
                        "arguments": arguments.to_string()
                    }
                }]
            }
        }]
    }))
}

fn content_response(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{
            "message": {"role": "assistant", "content": content}
        }]
    }))
}

/// Captures frames instead of drawing them.
#[derive(Default)]
struct CapturingRenderer {
    frames: Mutex<Vec<ChartFrame>>,
}

impl Renderer for CapturingRenderer {
    fn draw(&self, frame: &ChartFrame) {
        self.frames
            .lock()
            .expect("renderer lock poisoned")
            .push(frame.clone());
    }
}

struct Harness {
    orchestrator: Orchestrator,
    renderer: Arc<CapturingRenderer>,
    database: Database,
    _dir: TempDir,
}

async fn harness(server: &MockServer, max_tool_calls: usize) -> Harness {
    let dir = TempDir::new().expect("should create temp dir");

    let mut config = Config::load(dir.path()).expect("defaults should load");
    config.openai.base_url = server.uri();
    config.openai.timeout_seconds = 5;

    let chat = ChatClient::new(&config, "test-key".to_string())
        .expect("should build chat client")
        .with_retry_attempts(1);
    let embeddings = EmbeddingClient::new(&config, "test-key".to_string())
        .expect("should build embedding client")
        .with_retry_attempts(1);

    let database = Database::new(dir.path().join("physio.db"))
        .await
        .expect("should create database");

    let store = ExampleStore::load(&embeddings, default_corpus()).expect("should load corpus");
    let sql_tool = SqlQueryTool::new(
        chat.clone(),
        embeddings,
        store,
        database.clone(),
        &config.agent,
    );
    let viz_tool = DataVisualisationTool::new(chat.clone());

    let renderer = Arc::new(CapturingRenderer::default());
    let orchestrator = Orchestrator::new(
        chat,
        sql_tool,
        viz_tool,
        Arc::clone(&renderer) as Arc<dyn Renderer>,
        max_tool_calls,
    );

    Harness {
        orchestrator,
        renderer,
        database,
        _dir: dir,
    }
}

async fn seed_entry(database: &Database, datetime: &str, count: i64, physio_type: &str) {
    let datetime = NaiveDateTime::parse_from_str(datetime, "%Y-%m-%d %H:%M:%S")
        .expect("valid test datetime");
    database
        .insert_entry(NewEntry {
            datetime,
            count,
            physio_type: physio_type.to_string(),
        })
        .await
        .expect("should seed entry");
}

async fn mount_embeddings(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(EmbedResponder)
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn direct_answer_skips_all_tools() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(content_response("Hello! Ask me about your exercises."))
        .mount(&server)
        .await;

    let harness = harness(&server, 6).await;
    let mut conversation = Conversation::new();
    let outcome = harness
        .orchestrator
        .run_turn(&mut conversation, "Hi there!")
        .await;

    assert_eq!(outcome.reply, "Hello! Ask me about your exercises.");
    assert_eq!(outcome.charts_drawn, 0);
    assert_eq!(conversation.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn chart_question_runs_sql_then_visualization() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;

    // Round 1: the orchestrator model requests the SQL stage.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("powerful assistant"))
        .and(BodyLacks("Query executed:"))
        .respond_with(tool_call_response(
            "sql_query_db_tool",
            json!({"query": "Create a bar chart of squats in May 2024"}),
        ))
        .mount(&server)
        .await;

    // SQL generation for the rewritten question.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(
            "You are an agent designed to interact with a SQL database",
        ))
        .and(body_string_contains("per day"))
        .respond_with(content_response(
            "SELECT DATE(Datetime) AS date, SUM(Count) AS total FROM physio_table \
             WHERE Physio_Type = 'Squat' GROUP BY DATE(Datetime) ORDER BY DATE(Datetime);",
        ))
        .mount(&server)
        .await;

    // Round 2: SQL result in hand, the model requests the chart.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("powerful assistant"))
        .and(body_string_contains("Query executed:"))
        .and(BodyLacks("visualisation was rendered"))
        .respond_with(tool_call_response(
            "data_visualisation_tool",
            json!({"data": "truncated...", "columns": "[date]", "graph": "bar graph"}),
        ))
        .mount(&server)
        .await;

    // Negotiation sees the store's full result, not the model's echo.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("JSON expert"))
        .and(body_string_contains("2024-05-01"))
        .and(body_string_contains("2024-05-02"))
        .respond_with(content_response(
            "Here you go: {\"bar\": {\"columns\": [\"date\", \"total\"], \
             \"data\": [[\"2024-05-01\", 30], [\"2024-05-02\", 25]]}} Enjoy!",
        ))
        .mount(&server)
        .await;

    // Round 3: final answer.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("powerful assistant"))
        .and(body_string_contains("visualisation was rendered"))
        .respond_with(content_response("Here is your chart!"))
        .mount(&server)
        .await;

    let harness = harness(&server, 6).await;
    seed_entry(&harness.database, "2024-05-01 10:00:00", 30, "Squat").await;
    seed_entry(&harness.database, "2024-05-02 10:00:00", 25, "Squat").await;

    let mut conversation = Conversation::new();
    let outcome = harness
        .orchestrator
        .run_turn(&mut conversation, "Create a bar chart of squats in May 2024")
        .await;

    assert_eq!(outcome.reply, "Here is your chart!");
    assert_eq!(outcome.charts_drawn, 1);

    let frames = harness
        .renderer
        .frames
        .lock()
        .expect("renderer lock poisoned");
    assert_eq!(frames.len(), 1);
    match frames[0] {
        ChartFrame::Plot {
            kind,
            ref x_values,
            ref series,
            ..
        } => {
            assert_eq!(kind, PlotKind::Bar);
            // Store dates were normalized to MM-DD-YYYY on the way out.
            assert_eq!(x_values, &vec!["05-01-2024".to_string(), "05-02-2024".to_string()]);
            assert_eq!(series[0].values, vec![30.0, 25.0]);
        }
        ref other => panic!("expected bar plot, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn tool_budget_stops_runaway_loops() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;

    // The orchestrator model keeps asking for the SQL stage forever.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("powerful assistant"))
        .respond_with(tool_call_response(
            "sql_query_db_tool",
            json!({"query": "List all exercise entries."}),
        ))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(
            "You are an agent designed to interact with a SQL database",
        ))
        .respond_with(content_response("SELECT * FROM physio_table;"))
        .mount(&server)
        .await;

    let harness = harness(&server, 2).await;
    let mut conversation = Conversation::new();
    let outcome = harness
        .orchestrator
        .run_turn(&mut conversation, "List everything")
        .await;

    assert!(outcome.reply.contains("2 tool calls"));
    assert_eq!(outcome.charts_drawn, 0);
    // The failed turn still appends an assistant message.
    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation.all()[1].content, outcome.reply);
}

#[tokio::test(flavor = "multi_thread")]
async fn select_guard_refuses_generated_writes() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("powerful assistant"))
        .and(BodyLacks("Refused to run a non-SELECT statement"))
        .respond_with(tool_call_response(
            "sql_query_db_tool",
            json!({"query": "Delete everything"}),
        ))
        .mount(&server)
        .await;

    // A misbehaving model emits a destructive statement.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(
            "You are an agent designed to interact with a SQL database",
        ))
        .respond_with(content_response("DELETE FROM physio_table;"))
        .mount(&server)
        .await;

    // The model sees the refusal in the scratchpad and gives up.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("powerful assistant"))
        .and(body_string_contains("Refused to run a non-SELECT statement"))
        .respond_with(content_response("I can only read from the log, not modify it."))
        .mount(&server)
        .await;

    let harness = harness(&server, 6).await;
    seed_entry(&harness.database, "2024-05-01 10:00:00", 30, "Squat").await;

    let mut conversation = Conversation::new();
    let outcome = harness
        .orchestrator
        .run_turn(&mut conversation, "Delete everything")
        .await;

    assert_eq!(outcome.reply, "I can only read from the log, not modify it.");
    // The guard fired before dispatch; the row survived.
    assert_eq!(
        harness.database.entry_count().await.expect("should count"),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_chart_json_is_reported_not_crashed() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("powerful assistant"))
        .and(BodyLacks("Query executed:"))
        .respond_with(tool_call_response(
            "sql_query_db_tool",
            json!({"query": "Create a table of all entries"}),
        ))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(
            "You are an agent designed to interact with a SQL database",
        ))
        .respond_with(content_response("SELECT DATE(Datetime), Count FROM physio_table;"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("powerful assistant"))
        .and(body_string_contains("Query executed:"))
        .and(BodyLacks("could not be rendered"))
        .respond_with(tool_call_response(
            "data_visualisation_tool",
            json!({"data": "", "columns": "", "graph": "table"}),
        ))
        .mount(&server)
        .await;

    // The negotiation model answers with prose and no JSON at all.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("JSON expert"))
        .respond_with(content_response("Sorry, I cannot produce JSON today."))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("powerful assistant"))
        .and(body_string_contains("could not be rendered"))
        .respond_with(content_response("I found the data but could not draw the chart."))
        .mount(&server)
        .await;

    let harness = harness(&server, 6).await;
    seed_entry(&harness.database, "2024-05-01 10:00:00", 30, "Squat").await;

    let mut conversation = Conversation::new();
    let outcome = harness
        .orchestrator
        .run_turn(&mut conversation, "Create a table of all entries")
        .await;

    assert_eq!(outcome.reply, "I found the data but could not draw the chart.");
    assert_eq!(outcome.charts_drawn, 0);
    assert!(
        harness
            .renderer
            .frames
            .lock()
            .expect("renderer lock poisoned")
            .is_empty()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn visualization_without_prior_sql_is_instructed_to_query_first() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("powerful assistant"))
        .and(BodyLacks("Run sql_query_db_tool first"))
        .respond_with(tool_call_response(
            "data_visualisation_tool",
            json!({"data": "made up", "columns": "[a]", "graph": "bar graph"}),
        ))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("powerful assistant"))
        .and(body_string_contains("Run sql_query_db_tool first"))
        .respond_with(content_response("Let me query the data first."))
        .mount(&server)
        .await;

    let harness = harness(&server, 6).await;
    let mut conversation = Conversation::new();
    let outcome = harness
        .orchestrator
        .run_turn(&mut conversation, "Chart something")
        .await;

    assert_eq!(outcome.reply, "Let me query the data first.");
    assert_eq!(outcome.charts_drawn, 0);
}
