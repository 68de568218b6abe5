//! Live progress WebSocket.
//!
//! One socket follows one job. The server pushes stage-projection frames
//! as the record changes and a single terminal frame when the job
//! settles, then closes, mirroring the engine's implicit detach. Frames
//! fabricated nowhere: this feed only relays authoritative store writes.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use wayfarer_core::job::GenerationJob;
use wayfarer_core::stage::{stage_advances, StageModel};
use wayfarer_core::types::JobId;

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Frame type constants
// ---------------------------------------------------------------------------

/// Progress update during job execution (stage projection).
pub const MSG_TYPE_JOB_PROGRESS: &str = "job_progress";
/// Job completed successfully.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job_completed";
/// Job failed with an error.
pub const MSG_TYPE_JOB_FAILED: &str = "job_failed";
/// The subscription itself failed; the job's fate is unknown here.
pub const MSG_TYPE_CHANNEL_ERROR: &str = "channel_error";

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub job_id: JobId,
}

/// GET /ws?job_id=... Upgrade and stream progress for one job.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.job_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, job_id: JobId) {
    tracing::info!(%job_id, "progress WebSocket connected");

    let mut rx = match state.store.subscribe(job_id).await {
        Ok(rx) => rx,
        Err(e) => {
            let _ = send_json(
                &mut socket,
                json!({
                    "type": MSG_TYPE_CHANNEL_ERROR,
                    "job_id": job_id,
                    "error": e.to_string(),
                }),
            )
            .await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    // Replay the current snapshot so a late subscriber is not blank until
    // the next write.
    let mut seen_stage = None;
    if let Ok(Some(job)) = state.store.fetch(job_id).await {
        if send_snapshot(&mut socket, &job, &mut seen_stage).await.is_break() {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    }

    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                // Client went away (or sent a close frame).
                None | Some(Ok(Message::Close(_))) => break,
                Some(Err(e)) => {
                    tracing::debug!(%job_id, error = %e, "WebSocket receive error");
                    break;
                }
                // This feed is one-way; other inbound frames are ignored.
                Some(Ok(_)) => {}
            },
            update = rx.recv() => match update {
                Ok(job) => {
                    if send_snapshot(&mut socket, &job, &mut seen_stage).await.is_break() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // The next snapshot carries the whole state.
                    tracing::warn!(%job_id, skipped, "progress feed lagged; continuing");
                }
                Err(RecvError::Closed) => {
                    let _ = send_json(
                        &mut socket,
                        json!({
                            "type": MSG_TYPE_CHANNEL_ERROR,
                            "job_id": job_id,
                            "error": "progress feed closed before a terminal status",
                        }),
                    )
                    .await;
                    break;
                }
            },
        }
    }

    let _ = socket.send(Message::Close(None)).await;
    tracing::info!(%job_id, "progress WebSocket closed");
}

/// Push one job snapshot to the socket. Returns `Break` when the feed is
/// finished: terminal frame sent, or the socket is gone.
async fn send_snapshot(
    socket: &mut WebSocket,
    job: &GenerationJob,
    seen_stage: &mut Option<u32>,
) -> std::ops::ControlFlow<()> {
    use std::ops::ControlFlow;

    let frame = match job.status {
        wayfarer_core::job::JobStatus::Completed => json!({
            "type": MSG_TYPE_JOB_COMPLETED,
            "job_id": job.id,
            "response": job.response,
        }),
        wayfarer_core::job::JobStatus::Failed => json!({
            "type": MSG_TYPE_JOB_FAILED,
            "job_id": job.id,
            "error": job.error_message,
            "progress": StageModel::project_failed(&job.progress),
        }),
        _ => {
            if !stage_advances(*seen_stage, job.progress.stage) {
                // Out-of-order delivery; surface nothing.
                return ControlFlow::Continue(());
            }
            *seen_stage = Some(job.progress.stage);
            json!({
                "type": MSG_TYPE_JOB_PROGRESS,
                "job_id": job.id,
                "progress": StageModel::project(&job.progress),
            })
        }
    };

    let terminal = job.status.is_terminal();
    if send_json(socket, frame).await.is_err() || terminal {
        return ControlFlow::Break(());
    }
    ControlFlow::Continue(())
}

/// Serialize a JSON value and send it as a text frame.
async fn send_json(socket: &mut WebSocket, payload: serde_json::Value) -> Result<(), axum::Error> {
    socket.send(Message::Text(payload.to_string().into())).await
}
