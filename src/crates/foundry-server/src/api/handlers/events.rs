//! Server-sent event stream for execution telemetry
//!
//! Each SSE data frame is the `{seq, type, payload}` envelope. A subscriber
//! joining mid-stream first receives a `snapshot` frame built from the
//! persisted step history, then live events continue from the next sequence
//! number.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::AppState;

/// GET /api/v1/executions/:id/events
pub async fn stream_events(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // Subscribe before reading the state the snapshot is built from, so any
    // event emitted in between reaches the live stream instead of vanishing.
    let mut rx = app.interpreter.bus().subscribe(&id);

    let state = app
        .interpreter
        .get_state(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("execution '{id}'")))?;

    let snapshot = json!({
        "seq": state.event_seq,
        "type": "snapshot",
        "payload": {
            "status": state.status,
            "currentNodeId": state.current_node_id,
            "stepHistory": state.step_history,
            "completionStatus": state.completion_status,
        },
    });

    let stream = async_stream::stream! {
        yield Ok(Event::default().data(snapshot.to_string()));
        loop {
            match rx.recv().await {
                Ok(event) => {
                    yield Ok(Event::default().data(event.to_wire().to_string()));
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(execution = %id, missed, "SSE subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
