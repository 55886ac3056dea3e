//! Server-Sent Events stream of run snapshots.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use operator::core::machine::Snapshot;
use tracing::debug;

use crate::state::{AppState, is_final};

fn snapshot_event(snapshot: &Snapshot) -> Option<Event> {
    let json = serde_json::to_string(snapshot).ok()?;
    Some(Event::default().event("snapshot").data(json))
}

/// GET /api/runs/{id}/events - current snapshot, then one event per transition.
///
/// The stream ends after the final snapshot.
pub async fn events_handler(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let mut rx = state
        .run(&run_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?
        .snapshots;

    let stream = async_stream::stream! {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if let Some(event) = snapshot_event(&snapshot) {
                yield Ok(event);
            }
            if is_final(&snapshot) {
                break;
            }
            if rx.changed().await.is_err() {
                debug!(run_id = %run_id, "run task ended");
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}
