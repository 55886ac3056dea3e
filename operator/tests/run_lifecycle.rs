//! End-to-end runs against a mocked `/api/session` + `/api/agent` service.

use operator::core::types::{DisplayState, Phase, Tool};
use operator::error::ErrorKind;
use operator::io::config::OperatorConfig;
use operator::session_loop::{Clients, Orchestrator, RunOutcome, StartOutcome};
use operator::test_support::{
    PlanCall, Scripted, ScriptedExecutor, ScriptedGateway, ScriptedPlanner, next, planned,
    session,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> OperatorConfig {
    let mut cfg = OperatorConfig::default();
    cfg.api.base_url = server.uri();
    cfg.session.timezone = Some("UTC".to_string());
    cfg
}

fn plan(tool: &str, done: bool) -> Value {
    json!({
        "success": true,
        "done": done,
        "result": {
            "text": format!("{tool} step"),
            "reasoning": "because",
            "tool": tool,
            "instruction": "do it"
        }
    })
}

async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "sessionId": "s-1",
            "sessionUrl": "https://www.browserbase.com/devtools-fullscreen/inspector.html?s=1",
            "contextId": "ctx-1"
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/session"))
        .and(body_partial_json(json!({"sessionId": "s-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_agent(server: &MockServer, action: &str, body: Value, times: u64) {
    Mock::given(method("POST"))
        .and(path("/api/agent"))
        .and(body_partial_json(json!({ "action": action })))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(times)
        .expect(times)
        .mount(server)
        .await;
}

async fn run_http(server: &MockServer, goal: &str) -> RunOutcome {
    run_with(config(server), goal).await
}

async fn run_with(cfg: OperatorConfig, goal: &str) -> RunOutcome {
    let clients = Clients::http(&cfg).expect("clients");
    let mut orchestrator = Orchestrator::new(clients);
    match orchestrator.start(goal).await.expect("start") {
        StartOutcome::Completed(outcome) => {
            assert!(outcome.violations.is_empty(), "{:?}", outcome.violations);
            outcome
        }
        StartOutcome::Ignored { phase } => panic!("ignored in {phase:?}"),
    }
}

/// GOTO, execute not done, then EXTRACT with planner done.
#[tokio::test]
async fn http_run_finishes_when_planner_reports_done() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_agent(&server, "START", plan("GOTO", false), 1).await;
    mount_agent(
        &server,
        "EXECUTE_STEP",
        json!({"success": true, "done": false}),
        1,
    )
    .await;
    mount_agent(&server, "GET_NEXT_STEP", plan("EXTRACT", true), 1).await;

    let outcome = run_http(&server, "check weather").await;
    assert_eq!(outcome.phase, Phase::Finished);
    assert_eq!(outcome.steps.len(), 2);
    assert_eq!(outcome.steps[1].tool, Tool::Extract);
    assert_eq!(outcome.display, DisplayState::Success);
    let viewer = outcome.session.expect("session").session_url;
    assert!(
        viewer.starts_with("https://www.browserbase.com/devtools-internal-compiled/index.html")
    );
}

/// A step whose execute call timed out may already have run; it is never re-sent.
#[tokio::test]
async fn http_run_sends_timed_out_execute_once() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_agent(&server, "START", plan("ACT", false), 1).await;
    Mock::given(method("POST"))
        .and(path("/api/agent"))
        .and(body_partial_json(json!({ "action": "EXECUTE_STEP" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "done": false}))
                .set_delay(std::time::Duration::from_millis(1500)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.api.request_timeout_secs = 1;
    cfg.retry.max_retries = 2;
    cfg.retry.base_delay_ms = 1;
    cfg.retry.max_delay_ms = 2;
    let outcome = run_with(cfg, "buy the thing").await;

    assert_eq!(outcome.phase, Phase::Failed);
    assert_eq!(outcome.executed, vec![1]);
    assert_eq!(
        outcome.failure.map(|f| f.kind),
        Some(ErrorKind::ExecutionFailed)
    );
}

/// Third plan names an unknown tool: steps 1 and 2 survive and the session is closed.
#[tokio::test]
async fn http_run_fails_on_unknown_tool() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_agent(&server, "START", plan("GOTO", false), 1).await;
    mount_agent(
        &server,
        "EXECUTE_STEP",
        json!({"success": true, "done": false}),
        2,
    )
    .await;
    mount_agent(&server, "GET_NEXT_STEP", plan("ACT", false), 1).await;
    mount_agent(&server, "GET_NEXT_STEP", plan("DELETE", false), 1).await;

    let outcome = run_http(&server, "check weather").await;
    assert_eq!(outcome.phase, Phase::Failed);
    let numbers: Vec<u32> = outcome.steps.iter().map(|s| s.step_number).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert_eq!(
        outcome.failure.map(|f| f.kind),
        Some(ErrorKind::MalformedResponse)
    );
    assert_eq!(outcome.display, DisplayState::Error);
}

#[tokio::test]
async fn http_session_rejection_fails_before_planning() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/session"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": false, "error": "quota"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agent"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = run_http(&server, "check weather").await;
    assert_eq!(outcome.phase, Phase::Failed);
    assert!(outcome.steps.is_empty());
    assert_eq!(
        outcome.failure.map(|f| f.kind),
        Some(ErrorKind::SessionCreationFailed)
    );
}

/// An observer task cancels after the first snapshot with a step; the run stops and closes.
#[tokio::test]
async fn observer_can_cancel_a_running_loop() {
    let token = CancellationToken::new();
    let scripted = Scripted::new(
        ScriptedGateway::new().opening(Ok(session("s-1"))),
        ScriptedPlanner::new()
            .first(Ok(planned(Tool::Goto)))
            .then(Ok(next(Tool::Act, false)))
            .then(Ok(next(Tool::Act, false))),
        ScriptedExecutor::new()
            .returning(Ok(operator::core::types::ExecOutcome { done: false }))
            .cancelling_on(1, token.clone()),
    );
    let mut orchestrator =
        Orchestrator::new(scripted.clients()).with_cancellation(token.clone());
    let mut rx = orchestrator.subscribe();

    let handle = tokio::spawn(async move { orchestrator.start("keep going").await });
    let terminal = rx
        .wait_for(|snapshot| snapshot.phase.is_terminal() && !snapshot.session_active())
        .await
        .expect("terminal snapshot")
        .clone();
    let outcome = handle.await.expect("join").expect("start");

    assert!(matches!(outcome, StartOutcome::Completed(_)));
    assert_eq!(terminal.phase, Phase::Failed);
    assert_eq!(
        terminal.failure.map(|f| f.kind),
        Some(ErrorKind::Cancelled)
    );
    assert_eq!(terminal.display, DisplayState::Error);
    assert_eq!(scripted.planner.calls(), vec![PlanCall::First]);
    assert_eq!(scripted.gateway.close_calls(), vec!["s-1".to_string()]);
}
