//! HTTP route handlers for the runs API.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use operator::core::machine::Snapshot;
use operator::core::types::{DisplayState, Phase};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::sse;
use crate::state::AppState;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/runs", get(list_runs).post(start_run))
        .route("/runs/{run_id}", get(get_run).delete(cancel_run))
        .route("/runs/{run_id}/events", get(sse::events_handler))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct StartRunRequest {
    goal: String,
    #[serde(default)]
    fresh: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRunResponse {
    run_id: String,
}

/// POST /api/runs - start a run in the background.
async fn start_run(
    State(state): State<AppState>,
    Json(request): Json<StartRunRequest>,
) -> Response {
    match state.start_run(request.goal, request.fresh).await {
        Ok(run_id) => (StatusCode::ACCEPTED, Json(StartRunResponse { run_id })).into_response(),
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary {
    run_id: String,
    goal: Option<String>,
    phase: Phase,
    display: DisplayState,
    status: String,
}

/// GET /api/runs - every known run with its latest state.
async fn list_runs(State(state): State<AppState>) -> Json<Vec<RunSummary>> {
    let runs = state
        .list_runs()
        .await
        .into_iter()
        .map(|(run_id, snapshot)| RunSummary {
            run_id,
            goal: snapshot.goal,
            phase: snapshot.phase,
            display: snapshot.display,
            status: snapshot.status,
        })
        .collect();
    Json(runs)
}

/// GET /api/runs/{id} - latest snapshot.
async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Snapshot>, StatusCode> {
    let handle = state.run(&run_id).await.ok_or(StatusCode::NOT_FOUND)?;
    let snapshot = handle.snapshots.borrow().clone();
    Ok(Json(snapshot))
}

/// DELETE /api/runs/{id} - request a cooperative stop.
///
/// The loop stops after the in-flight call and closes the session.
async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<(StatusCode, Json<Snapshot>), StatusCode> {
    let handle = state.run(&run_id).await.ok_or(StatusCode::NOT_FOUND)?;
    handle.cancel.cancel();
    let snapshot = handle.snapshots.borrow().clone();
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use operator::core::types::Tool;
    use operator::io::config::StateConfig;
    use operator::test_support::{
        Scripted, ScriptedExecutor, ScriptedGateway, ScriptedPlanner, planned, session,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(scripted: &Scripted, temp: &tempfile::TempDir) -> Router {
        let paths = StateConfig {
            context_path: temp.path().join("context.json"),
            runs_dir: temp.path().join("runs"),
        };
        Router::new()
            .nest("/api", api_router())
            .with_state(AppState::new(scripted.clients(), paths))
    }

    fn closing_run() -> Scripted {
        Scripted::new(
            ScriptedGateway::new().opening(Ok(session("s-1"))),
            ScriptedPlanner::new().first(Ok(planned(Tool::Close))),
            ScriptedExecutor::new(),
        )
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, String::from_utf8(bytes.to_vec()).expect("utf8"))
    }

    fn post_run(goal: &str) -> Request<Body> {
        Request::post("/api/runs")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "goal": goal }).to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn blank_goal_is_bad_request() {
        let temp = tempfile::tempdir().expect("tempdir");
        let scripted = closing_run();
        let app = app(&scripted, &temp);

        let (status, body) = send(&app, post_run("  ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("goal must not be empty"));
        assert!(scripted.gateway.open_calls().is_empty());
    }

    #[tokio::test]
    async fn run_streams_snapshots_until_finished() {
        let temp = tempfile::tempdir().expect("tempdir");
        let scripted = closing_run();
        let app = app(&scripted, &temp);

        let (status, body) = send(&app, post_run("check weather")).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let run_id = serde_json::from_str::<Value>(&body).expect("json")["runId"]
            .as_str()
            .expect("run id")
            .to_string();

        let events = Request::get(format!("/api/runs/{run_id}/events"))
            .body(Body::empty())
            .expect("request");
        let (status, stream) = send(&app, events).await;
        assert_eq!(status, StatusCode::OK);
        assert!(stream.contains("event: snapshot"));
        assert!(stream.contains("\"phase\":\"finished\""));

        let get = Request::get(format!("/api/runs/{run_id}"))
            .body(Body::empty())
            .expect("request");
        let (status, body) = send(&app, get).await;
        assert_eq!(status, StatusCode::OK);
        let snapshot: Value = serde_json::from_str(&body).expect("json");
        assert_eq!(snapshot["display"], "success");
        assert_eq!(snapshot["steps"][0]["tool"], "CLOSE");
        assert_eq!(scripted.gateway.close_calls(), vec!["s-1".to_string()]);
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let app = app(&closing_run(), &temp);

        for request in [
            Request::get("/api/runs/run-missing").body(Body::empty()),
            Request::delete("/api/runs/run-missing").body(Body::empty()),
            Request::get("/api/runs/run-missing/events").body(Body::empty()),
        ] {
            let (status, _) = send(&app, request.expect("request")).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn cancel_is_accepted_for_known_runs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let app = app(&closing_run(), &temp);

        let (_, body) = send(&app, post_run("check weather")).await;
        let run_id = serde_json::from_str::<Value>(&body).expect("json")["runId"]
            .as_str()
            .expect("run id")
            .to_string();

        let delete = Request::delete(format!("/api/runs/{run_id}"))
            .body(Body::empty())
            .expect("request");
        let (status, body) = send(&app, delete).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body.contains("\"phase\""));

        let (status, body) = send(
            &app,
            Request::get("/api/runs").body(Body::empty()).expect("request"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(&run_id));
    }
}
