//! Turn-loop behaviour against a scripted model.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tm_agent::{handler_fn, Connection, ConnectionOptions, FunctionCaller, ReqCtx, Tool};
use tm_bus::LocalBus;
use tm_domain::config::{RegistryConfig, ToolErrorPolicy};
use tm_domain::content::{FinishReason, ModelResponse, Part};
use tm_domain::schema::{int, object};
use tm_domain::{Error, JsonMap, Result, ToolDeclaration};
use tm_orchestrator::{generate, generate_json, Session, SessionOptions, TextStream};
use tm_providers::scripted::{final_reply, reply};
use tm_providers::ScriptedModel;
use tm_registry::Registry;

// ── Fake mesh ────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeMesh {
    remote: Vec<ToolDeclaration>,
    local: Vec<ToolDeclaration>,
    /// Per-tool latency and canned response.
    behaviour: HashMap<String, (Duration, JsonMap)>,
    remote_calls: Mutex<Vec<(String, JsonMap)>>,
    local_calls: Mutex<Vec<String>>,
}

impl FakeMesh {
    fn tool(mut self, name: &str, delay_ms: u64, response: JsonMap) -> Self {
        self.remote.push(ToolDeclaration::new(name, ""));
        self.behaviour.insert(name.into(), (Duration::from_millis(delay_ms), response));
        self
    }

    fn local(mut self, name: &str) -> Self {
        self.local.push(ToolDeclaration::new(name, "local"));
        self
    }

    fn remote_calls(&self) -> Vec<(String, JsonMap)> {
        self.remote_calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl FunctionCaller for FakeMesh {
    async fn list_tools(&self) -> Result<Vec<ToolDeclaration>> {
        Ok(self.remote.clone())
    }

    fn local_tools(&self) -> Vec<ToolDeclaration> {
        self.local.clone()
    }

    async fn call_function(&self, name: &str, args: JsonMap) -> Result<JsonMap> {
        self.remote_calls.lock().push((name.to_string(), args));
        let (delay, response) = self
            .behaviour
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NoResponders(name.to_string()))?;
        tokio::time::sleep(delay).await;
        Ok(response)
    }

    async fn call_local(&self, name: &str, _args: JsonMap) -> Option<JsonMap> {
        if self.local.iter().any(|d| d.name == name) {
            self.local_calls.lock().push(name.to_string());
            Some(JsonMap::new().with("from", "local"))
        } else {
            None
        }
    }
}

fn call(name: &str) -> Part {
    Part::call(name, JsonMap::new())
}

async fn drain(mut stream: TextStream) -> (Vec<String>, Vec<Error>) {
    let mut texts = Vec::new();
    let mut errors = Vec::new();
    while let Some(item) = stream.next_text().await {
        match item {
            Ok(t) => texts.push(t),
            Err(e) => errors.push(e),
        }
    }
    (texts, errors)
}

async fn session(model: &ScriptedModel, mesh: Arc<FakeMesh>, options: SessionOptions) -> Session {
    Session::create(model, mesh, options).await.unwrap()
}

// ── End-to-end over the bus ──────────────────────────────────────────

#[tokio::test]
async fn add_scenario_through_registry_and_agent() {
    let bus = Arc::new(LocalBus::new());
    let _registry = Registry::serve(bus.clone(), &RegistryConfig::default()).await.unwrap();

    let agent = Connection::new(bus.clone(), ConnectionOptions::default());
    agent
        .register_tool(
            Tool::new(
                "add",
                "adds two integers",
                handler_fn(|ctx: ReqCtx| async move {
                    Ok(JsonMap::new().with("result", ctx.int("a") + ctx.int("b")))
                }),
            )
            .parameters(object("operands").property("a", int("a").required()).property("b", int("b").required()))
            .response(object("sum").property("result", int("a + b"))),
        )
        .await
        .unwrap();

    let orchestrator = Connection::new(bus.clone(), ConnectionOptions::default());
    let model = ScriptedModel::new([
        reply(vec![Part::call("add", JsonMap::new().with("a", 35).with("b", 21))]),
        reply(vec![Part::text("35 + 21 = 56")]),
    ]);
    let session = Session::create(&model, orchestrator, SessionOptions::default()).await.unwrap();
    assert_eq!(session.tools().len(), 1);
    assert_eq!(model.configs()[0].tools[0].name, "add");

    let text = session.send_text("what is 35+21?").collect_text().await.unwrap();
    assert_eq!(text, "35 + 21 = 56");

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1], vec![Part::response("add", JsonMap::new().with("result", 56))]);
}

// ── Ordering and fan-out ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn text_order_and_result_positions_survive_completion_order() {
    let mesh = Arc::new(
        FakeMesh::default()
            .tool("x", 300, JsonMap::new().with("v", "x"))
            .tool("y", 10, JsonMap::new().with("v", "y")),
    );
    let model = ScriptedModel::new([
        reply(vec![Part::text("A"), call("x"), Part::text("B"), call("y")]),
        reply(vec![Part::text("done")]),
    ]);
    let s = session(&model, mesh.clone(), SessionOptions::default()).await;

    let (texts, errors) = drain(s.send_text("go")).await;
    assert!(errors.is_empty());
    assert_eq!(texts, vec!["A", "B", "done"]);

    let follow_up = &model.requests()[1];
    assert_eq!(
        follow_up,
        &vec![
            Part::response("x", JsonMap::new().with("v", "x")),
            Part::response("y", JsonMap::new().with("v", "y")),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn calls_in_one_turn_run_concurrently() {
    let mesh = Arc::new(
        FakeMesh::default()
            .tool("a", 1_000, JsonMap::new())
            .tool("b", 1_000, JsonMap::new())
            .tool("c", 1_000, JsonMap::new()),
    );
    let model = ScriptedModel::new([reply(vec![call("a"), call("b"), call("c")]), reply(vec![])]);
    let s = session(&model, mesh, SessionOptions::default()).await;

    let started = tokio::time::Instant::now();
    drain(s.send_text("go")).await;
    assert!(started.elapsed() < Duration::from_millis(1_500));
}

// ── Fatal conditions ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn one_failing_call_aborts_the_session() {
    let mesh = Arc::new(
        FakeMesh::default()
            .tool("x", 50, JsonMap::from_error("boom"))
            .tool("y", 10, JsonMap::new().with("ok", true)),
    );
    let model = ScriptedModel::new([
        reply(vec![Part::text("A"), call("x"), Part::text("B"), call("y")]),
        reply(vec![Part::text("never")]),
    ]);
    let s = session(&model, mesh, SessionOptions::default()).await;

    let (texts, errors) = drain(s.send_text("go")).await;
    assert_eq!(texts, vec!["A", "B"]);
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], Error::Tool { name, message } if name == "x" && message == "boom"));
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn lowest_position_error_wins() {
    let mesh = Arc::new(FakeMesh::default().tool("slow", 500, JsonMap::from_error("first")));
    let model = ScriptedModel::new([reply(vec![call("slow"), call("missing")])]);
    let s = session(&model, mesh, SessionOptions::default()).await;

    let (_, errors) = drain(s.send_text("go")).await;
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], Error::Tool { message, .. } if message == "first"));
}

#[tokio::test]
async fn transport_failure_aborts_the_session() {
    let mesh = Arc::new(FakeMesh::default());
    let model = ScriptedModel::new([reply(vec![call("ghost")])]);
    let s = session(&model, mesh, SessionOptions::default()).await;

    let (_, errors) = drain(s.send_text("go")).await;
    assert!(matches!(errors.as_slice(), [Error::NoResponders(_)]));
}

#[tokio::test]
async fn malformed_function_call_is_fatal() {
    let model = ScriptedModel::new([ModelResponse {
        parts: vec![],
        finish_reason: Some(FinishReason::MalformedFunctionCall),
        usage: None,
    }]);
    let s = session(&model, Arc::new(FakeMesh::default()), SessionOptions::default()).await;
    let err = s.send_text("go").collect_text().await.unwrap_err();
    assert!(matches!(err, Error::MalformedFunctionCall));
}

#[tokio::test]
async fn turn_limit_stops_a_looping_model() {
    let mesh = Arc::new(FakeMesh::default().tool("again", 0, JsonMap::new()));
    let model = ScriptedModel::new((0..5).map(|_| reply(vec![call("again")])));
    let s = session(&model, mesh, SessionOptions::default().max_turns(3)).await;

    let err = s.send_text("go").collect_text().await.unwrap_err();
    assert!(matches!(err, Error::TurnLimit(3)));
    assert_eq!(model.requests().len(), 3);
}

#[tokio::test]
async fn zero_max_turns_is_rejected() {
    let mesh = Arc::new(FakeMesh::default().tool("again", 0, JsonMap::new()));
    let model = ScriptedModel::new(Vec::new());
    let err = Session::create(&model, mesh, SessionOptions::default().max_turns(0))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Config(ref m) if m.contains("max_turns")), "got {err:?}");
    assert!(model.requests().is_empty());
}

// ── Completion rules ─────────────────────────────────────────────────

#[tokio::test]
async fn follow_up_without_usage_delivers_its_text_and_ends() {
    let mesh = Arc::new(FakeMesh::default().tool("x", 0, JsonMap::new()));
    let model = ScriptedModel::new([
        reply(vec![call("x")]),
        final_reply(vec![Part::text("bye"), call("x")]),
    ]);
    let s = session(&model, mesh.clone(), SessionOptions::default()).await;

    assert_eq!(s.send_text("go").collect_text().await.unwrap(), "bye");
    assert_eq!(mesh.remote_calls().len(), 1);
    assert_eq!(model.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_stream_stops_further_turns() {
    let mesh = Arc::new(
        FakeMesh::default()
            .tool("x", 100, JsonMap::new())
            .tool("y", 100, JsonMap::new()),
    );
    let model = ScriptedModel::new([
        reply(vec![Part::text("A"), Part::text("B"), Part::text("C"), call("x"), call("y")]),
        reply(vec![Part::text("next")]),
    ]);
    let s = session(&model, mesh.clone(), SessionOptions::default()).await;

    let mut stream = s.send_text("go");
    assert_eq!(stream.next_text().await.unwrap().unwrap(), "A");
    drop(stream);

    tokio::time::sleep(Duration::from_secs(1)).await;
    // Both calls were dispatched and joined; no follow-up turn was sent.
    assert_eq!(mesh.remote_calls().len(), 2);
    assert_eq!(model.requests().len(), 1);
}

// ── Options ──────────────────────────────────────────────────────────

#[tokio::test]
async fn default_args_fill_missing_arguments() {
    let mesh = Arc::new(FakeMesh::default().tool("q", 0, JsonMap::new()));
    let model = ScriptedModel::new([
        reply(vec![Part::call("q", JsonMap::new().with("user", "model-set"))]),
        reply(vec![]),
    ]);
    let options = SessionOptions::default()
        .default_args(|| JsonMap::new().with("user", "u1").with("tenant", "t1"));
    let s = session(&model, mesh.clone(), options).await;
    s.send_text("go").collect_text().await.unwrap();

    let (_, args) = &mesh.remote_calls()[0];
    assert_eq!(args.string("user", ""), "model-set");
    assert_eq!(args.string("tenant", ""), "t1");
}

#[tokio::test]
async fn report_to_model_policy_forwards_the_error() {
    let mesh = Arc::new(FakeMesh::default().tool("x", 0, JsonMap::from_error("bad input")));
    let model = ScriptedModel::new([reply(vec![call("x")]), reply(vec![Part::text("sorry")])]);
    let options = SessionOptions::default().tool_error_policy(ToolErrorPolicy::ReportToModel);
    let s = session(&model, mesh, options).await;

    assert!(s.tools()[0].response.as_ref().unwrap().properties.contains_key("_error"));
    assert_eq!(s.send_text("go").collect_text().await.unwrap(), "sorry");
    assert_eq!(model.requests()[1], vec![Part::response("x", JsonMap::from_error("bad input"))]);
}

#[tokio::test]
async fn local_preference_replaces_and_routes_in_process() {
    let mesh = Arc::new(
        FakeMesh::default()
            .tool("shared", 0, JsonMap::new().with("from", "remote"))
            .tool("remote_only", 0, JsonMap::new())
            .local("shared")
            .local("local_only"),
    );
    let model = ScriptedModel::new([reply(vec![call("shared")]), reply(vec![])]);
    let s = session(&model, mesh.clone(), SessionOptions::default().use_local_tool(true)).await;

    let mut names: Vec<(String, String)> =
        s.tools().iter().map(|d| (d.name.clone(), d.description.clone())).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            ("local_only".to_string(), "local".to_string()),
            ("remote_only".to_string(), String::new()),
            ("shared".to_string(), "local".to_string()),
        ]
    );

    s.send_text("go").collect_text().await.unwrap();
    assert_eq!(*mesh.local_calls.lock(), vec!["shared".to_string()]);
    assert!(mesh.remote_calls().is_empty());
    assert_eq!(model.requests()[1], vec![Part::response("shared", JsonMap::new().with("from", "local"))]);
}

#[tokio::test]
async fn without_local_preference_everything_goes_over_the_bus() {
    let mesh = Arc::new(
        FakeMesh::default()
            .tool("shared", 0, JsonMap::new().with("from", "remote"))
            .local("shared"),
    );
    let model = ScriptedModel::new([reply(vec![call("shared")]), reply(vec![])]);
    let s = session(&model, mesh.clone(), SessionOptions::default()).await;

    assert_eq!(s.tools().len(), 1);
    assert_eq!(s.tools()[0].description, "");
    s.send_text("go").collect_text().await.unwrap();
    assert_eq!(mesh.remote_calls().len(), 1);
    assert!(mesh.local_calls.lock().is_empty());
}

// ── Tool-less generation ─────────────────────────────────────────────

#[tokio::test]
async fn generate_json_decodes_first_fragment_without_tools() {
    let model = ScriptedModel::new([reply(vec![Part::text(r#"{"n": 7, "label": "seven"}"#)])]);
    let options = SessionOptions::default()
        .json_output(true)
        .response_schema(object("out").property("n", int("n")).render());
    let json = generate_json(&model, options).await.unwrap();
    let out = json.generate("seven as json").await.unwrap();
    assert_eq!(out.int("n", 0), 7);

    let config = &model.configs()[0];
    assert!(config.json_output);
    assert!(config.tools.is_empty());
    assert!(config.response_schema.is_some());
}

#[tokio::test]
async fn generate_json_requires_json_output() {
    let model = ScriptedModel::new([]);
    let err = generate_json(&model, SessionOptions::default()).await.err().unwrap();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn generate_json_rejects_non_json_text() {
    let model = ScriptedModel::new([reply(vec![Part::text("not json")])]);
    let json = generate_json(&model, SessionOptions::default().json_output(true)).await.unwrap();
    assert!(matches!(json.generate("x").await, Err(Error::Decode(_))));
}

#[tokio::test]
async fn generate_fails_on_function_calls() {
    let model = ScriptedModel::new([reply(vec![Part::text("let me check"), call("add")])]);
    let session = generate(&model, SessionOptions::default()).await.unwrap();
    assert!(session.tools().is_empty());
    let (texts, errors) = drain(session.send_text("go")).await;
    assert_eq!(texts, vec!["let me check"]);
    assert!(matches!(errors.as_slice(), [Error::Tool { .. }]));
}

#[tokio::test]
async fn tool_json_output_uses_the_local_response_schema() {
    let bus = Arc::new(LocalBus::new());
    let _registry = Registry::serve(bus.clone(), &RegistryConfig::default()).await.unwrap();
    let conn = Connection::new(bus, ConnectionOptions::default());
    conn.register_tool(
        Tool::new("add", "", handler_fn(|_ctx: ReqCtx| async { Ok(JsonMap::new()) }))
            .response(object("sum").property("result", int("a + b"))),
    )
    .await
    .unwrap();

    let options = SessionOptions::default().tool_json_output(&conn, "add");
    assert!(options.json_output);
    assert!(options.response_schema.unwrap().properties.contains_key("result"));

    let options = SessionOptions::default().tool_json_output(&conn, "unknown");
    assert!(options.json_output);
    assert!(options.response_schema.is_none());
}
