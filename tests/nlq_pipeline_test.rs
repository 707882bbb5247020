use async_trait::async_trait;
use graphask::{
    AskError, GraphConnector, GraphSession, LlmClient, LlmError, LlmResult, NLQPipeline, Params,
    Record, SchemaCache, Stage, StoreError, StoreResult,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// LLM stub returning a fixed completion and remembering the prompts it saw
struct StubLlm {
    reply: LlmResult<String>,
    calls: AtomicUsize,
    last_system: Mutex<Option<String>>,
}

impl StubLlm {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
            last_system: Mutex::new(None),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: Err(LlmError::NetworkError("connection refused".to_string())),
            calls: AtomicUsize::new(0),
            last_system: Mutex::new(None),
        })
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn generate(&self, system: &str, _user: &str, _max_tokens: u32) -> LlmResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_system.lock().unwrap() = Some(system.to_string());
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(_) => Err(LlmError::NetworkError("connection refused".to_string())),
        }
    }
}

/// Store stub: MATCH queries return the canned rows, anything else is a syntax error
#[derive(Default)]
struct StubStore {
    rows: Vec<Vec<Value>>,
    sessions: Arc<AtomicUsize>,
    runs: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
}

struct StubSession {
    rows: Vec<Vec<Value>>,
    runs: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
}

impl Drop for StubSession {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GraphSession for StubSession {
    async fn run(&mut self, query: &str, _params: &Params) -> StoreResult<Vec<Record>> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if !query.trim_start().to_uppercase().starts_with("MATCH") {
            return Err(StoreError::Query {
                code: "Neo.ClientError.Statement.SyntaxError".to_string(),
                message: format!("Invalid input: {}", query),
            });
        }
        Ok(self
            .rows
            .iter()
            .map(|values| Record::new(vec!["m.name".to_string()], values.clone()))
            .collect())
    }
}

#[async_trait]
impl GraphConnector for StubStore {
    async fn session(&self) -> StoreResult<Box<dyn GraphSession>> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now_open, Ordering::SeqCst);
        Ok(Box::new(StubSession {
            rows: self.rows.clone(),
            runs: Arc::clone(&self.runs),
            open: Arc::clone(&self.open),
        }))
    }
}

const MOVIE_SCHEMA: &str = "Graph schema (Neo4j Cypher):\n- Nodes: Movie (name, year)\n- Relationships: ";

fn movie_store() -> Arc<StubStore> {
    Arc::new(StubStore {
        rows: vec![vec![json!("Heat")], vec![json!("Ronin")]],
        ..Default::default()
    })
}

fn cached_schema(dir: &TempDir) -> SchemaCache {
    let cache = SchemaCache::new(dir.path().join("graph_schema.txt"));
    cache.store(MOVIE_SCHEMA).unwrap();
    cache
}

#[tokio::test]
async fn test_ask_graph_end_to_end() {
    let dir = TempDir::new().unwrap();
    let llm = StubLlm::replying("Here it is:\n```cypher\nMATCH (m:Movie) RETURN m.name\n```");
    let store = movie_store();
    let pipeline = NLQPipeline::new(llm.clone(), store.clone(), cached_schema(&dir));

    let result = pipeline.ask_graph("list all movies", false).await.unwrap();

    assert_eq!(result.query, "MATCH (m:Movie) RETURN m.name");
    assert_eq!(result.results.len(), 2);
    assert_eq!(result.results[0]["m.name"], json!("Heat"));
    assert_eq!(result.results[1]["m.name"], json!("Ronin"));

    let system = llm.last_system.lock().unwrap().clone().unwrap();
    assert!(system.starts_with("You are a Cypher expert."));
    assert!(system.ends_with(MOVIE_SCHEMA.trim()));

    assert_eq!(store.sessions.load(Ordering::SeqCst), 1);
    assert_eq!(store.open.load(Ordering::SeqCst), 0);

    let as_json = serde_json::to_value(&result).unwrap();
    assert_eq!(
        as_json,
        json!({"query": "MATCH (m:Movie) RETURN m.name", "results": [{"m.name": "Heat"}, {"m.name": "Ronin"}]})
    );
}

#[tokio::test]
async fn test_verbose_does_not_change_result() {
    let llm = StubLlm::replying("```MATCH (m:Movie) RETURN m.name```");
    let pipeline = NLQPipeline::new(llm, movie_store(), SchemaCache::new("unused.txt"));

    let quiet = pipeline.ask_with_schema("movies?", MOVIE_SCHEMA, false).await.unwrap();
    let loud = pipeline.ask_with_schema("movies?", MOVIE_SCHEMA, true).await.unwrap();
    assert_eq!(quiet, loud);
}

/// Writer that keeps formatted log lines for inspection
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

fn capture_verbose_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("graphask::verbose=info"))
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (capture, tracing::subscriber::set_default(subscriber))
}

#[tokio::test]
async fn test_verbose_logs_completion_then_query() {
    let llm = StubLlm::replying("Here you go:\n```cypher\nMATCH (m:Movie) RETURN m.name\n```");
    let pipeline = NLQPipeline::new(llm, movie_store(), SchemaCache::new("unused.txt"));
    let (capture, _guard) = capture_verbose_logs();

    pipeline.ask_with_schema("movies?", MOVIE_SCHEMA, false).await.unwrap();
    assert!(capture.text().is_empty());

    pipeline.ask_with_schema("movies?", MOVIE_SCHEMA, true).await.unwrap();
    let logs = capture.text();
    let raw_at = logs.find("Raw completion: Here you go:").unwrap();
    let query_at = logs.find("Generated Cypher: MATCH (m:Movie) RETURN m.name").unwrap();
    assert!(raw_at < query_at);
}

#[tokio::test]
async fn test_verbose_skips_query_line_when_rejected() {
    let llm = StubLlm::replying("```cypher\nDELETE n\n```");
    let pipeline = NLQPipeline::new(llm, movie_store(), SchemaCache::new("unused.txt"));
    let (capture, _guard) = capture_verbose_logs();

    pipeline.ask_with_schema("wipe it", MOVIE_SCHEMA, true).await.unwrap_err();
    let logs = capture.text();
    assert!(logs.contains("Raw completion:"));
    assert!(!logs.contains("Generated Cypher"));
}

#[tokio::test]
async fn test_unsafe_query_never_reaches_store() {
    let llm = StubLlm::replying("```cypher\nCREATE (n:Evil) RETURN n\n```");
    let store = movie_store();
    let pipeline = NLQPipeline::new(llm, store.clone(), SchemaCache::new("unused.txt"));

    let err = pipeline
        .ask_with_schema("make something evil", MOVIE_SCHEMA, true)
        .await
        .unwrap_err();

    match &err {
        AskError::UnsafeQueryRejected { query, keyword } => {
            assert_eq!(query, "CREATE (n:Evil) RETURN n");
            assert_eq!(*keyword, "CREATE");
        }
        other => panic!("expected UnsafeQueryRejected, got {:?}", other),
    }
    assert_eq!(err.stage(), Stage::Validating);
    assert!(err.is_retryable_by_user());
    assert_eq!(store.sessions.load(Ordering::SeqCst), 0);
    assert_eq!(store.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_prose_reply_fails_in_store_with_typed_error() {
    let llm = StubLlm::replying("I cannot help with that.");
    let store = movie_store();
    let pipeline = NLQPipeline::new(llm, store.clone(), SchemaCache::new("unused.txt"));

    let err = pipeline.ask_with_schema("what is love", MOVIE_SCHEMA, false).await.unwrap_err();

    match &err {
        AskError::StoreExecution { query, source } => {
            assert_eq!(query, "I cannot help with that.");
            assert!(matches!(source, StoreError::Query { .. }));
        }
        other => panic!("expected StoreExecution, got {:?}", other),
    }
    assert_eq!(err.query(), Some("I cannot help with that."));
    assert_eq!(err.stage(), Stage::Executing);
    assert_eq!(store.runs.load(Ordering::SeqCst), 1);
    assert_eq!(store.open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_prose_with_denylisted_word_is_rejected() {
    let llm = StubLlm::replying("Sorry, I can only answer questions about the data you created.");
    let store = movie_store();
    let pipeline = NLQPipeline::new(llm, store.clone(), SchemaCache::new("unused.txt"));

    let err = pipeline.ask_with_schema("hello", MOVIE_SCHEMA, false).await.unwrap_err();
    assert!(matches!(err, AskError::UnsafeQueryRejected { keyword: "CREATE", .. }));
    assert_eq!(store.sessions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_blank_completion_is_no_query() {
    let llm = StubLlm::replying("   \n  ");
    let store = movie_store();
    let pipeline = NLQPipeline::new(llm, store.clone(), SchemaCache::new("unused.txt"));

    let err = pipeline.ask_with_schema("anything", MOVIE_SCHEMA, false).await.unwrap_err();
    assert!(matches!(err, AskError::NoQueryExtracted { .. }));
    assert_eq!(err.stage(), Stage::Extracting);
    assert_eq!(store.sessions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_schema_is_precondition_failure() {
    let dir = TempDir::new().unwrap();
    let llm = StubLlm::replying("MATCH (n) RETURN n");
    let store = movie_store();
    let pipeline = NLQPipeline::new(
        llm.clone(),
        store.clone(),
        SchemaCache::new(dir.path().join("missing.txt")),
    );

    let err = pipeline.ask_graph("list all movies", false).await.unwrap_err();
    assert!(matches!(err, AskError::SchemaUnavailable { .. }));
    assert!(!err.is_retryable_by_user());
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.sessions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_llm_failure_is_surfaced() {
    let llm = StubLlm::failing();
    let store = movie_store();
    let pipeline = NLQPipeline::new(llm.clone(), store.clone(), SchemaCache::new("unused.txt"));

    let err = pipeline.ask_with_schema("list all movies", MOVIE_SCHEMA, false).await.unwrap_err();
    assert!(matches!(err, AskError::LlmInvocation(LlmError::NetworkError(_))));
    assert_eq!(err.stage(), Stage::AwaitingCompletion);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.sessions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_operator_query_goes_through_gate() {
    let store = movie_store();
    let pipeline = NLQPipeline::new(StubLlm::replying(""), store.clone(), SchemaCache::new("unused.txt"));

    assert!(matches!(
        pipeline.run_read_only("MATCH (n) DETACH DELETE n").await,
        Err(AskError::UnsafeQueryRejected { keyword: "DELETE", .. })
    ));
    let ok = pipeline.run_read_only("MATCH (m:Movie) RETURN m.name").await.unwrap();
    assert_eq!(ok.results.len(), 2);
    assert_eq!(store.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_questions_use_their_own_sessions() {
    let dir = TempDir::new().unwrap();
    let store = movie_store();
    let pipeline = Arc::new(NLQPipeline::new(
        StubLlm::replying("MATCH (m:Movie) RETURN m.name"),
        store.clone(),
        cached_schema(&dir),
    ));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.ask_graph(&format!("question {}", i), false).await })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.results.len(), 2);
    }

    assert_eq!(store.sessions.load(Ordering::SeqCst), 8);
    assert_eq!(store.runs.load(Ordering::SeqCst), 8);
    assert_eq!(store.open.load(Ordering::SeqCst), 0);
    assert!(store.max_open.load(Ordering::SeqCst) >= 1);
}
