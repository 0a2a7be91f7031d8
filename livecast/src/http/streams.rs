//! Live stream HTTP endpoints
//!
//! Grid reads come from the list-scope snapshot; detail reads go to the
//! registry and fall back to the snapshot copy when the platform is
//! unreachable.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::{Stream, StreamExt};
use livecast_core::view::{grid_entries, ingest_info, IngestInfo, StreamCard, StreamDetail};
use livecast_core::{
    CreateOutcome, DeleteOutcome, PlaybackPolicy, ScopeHealth, StatusTransition, StreamId,
};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::warn;

use crate::http::{AppError, AppResult, AppState};

pub fn create_streams_router() -> Router<AppState> {
    Router::new()
        .route("/api/live-streams", get(list_streams).post(create_stream))
        .route("/api/live-streams/events", get(status_events))
        .route("/api/live-streams/{id}", get(get_stream).delete(delete_stream))
        .route("/api/live-streams/{id}/ingest", get(get_ingest))
}

#[derive(Debug, Serialize)]
pub struct StreamListResponse {
    pub streams: Vec<StreamCard>,
    /// Last refresh failed; `streams` is the last good copy
    pub stale: bool,
    /// No refresh has finished yet
    pub loading: bool,
}

async fn list_streams(State(state): State<AppState>) -> AppResult<Json<StreamListResponse>> {
    let health = state.streams.health();
    if let ScopeHealth::Blocked { error } = &health {
        return Err(AppError::internal(error.clone()));
    }

    let snapshot = state.streams.snapshot();
    let streams = grid_entries(&snapshot.records, state.config.demo.enabled)
        .iter()
        .map(StreamCard::from_entry)
        .collect();

    Ok(Json(StreamListResponse {
        streams,
        stale: health.is_stale(),
        loading: snapshot.is_loading(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStreamRequest {
    pub playback_policy: Option<String>,
    pub reconnect_window: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StreamResponse {
    pub stream: StreamDetail,
}

async fn create_stream(
    State(state): State<AppState>,
    Json(req): Json<CreateStreamRequest>,
) -> AppResult<Json<StreamResponse>> {
    let policy = match req.playback_policy.as_deref() {
        Some(p) => p.parse::<PlaybackPolicy>()?,
        None => state.config.streams.playback_policy,
    };
    let window = req
        .reconnect_window
        .unwrap_or(state.config.streams.reconnect_window_seconds);

    match state.coordinator.create_with(policy, window).await? {
        CreateOutcome::Created(record) => Ok(Json(StreamResponse {
            stream: StreamDetail::from_record(&record, false),
        })),
        CreateOutcome::AlreadyInFlight => Err(AppError::conflict("A stream is already being created")),
    }
}

async fn get_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<StreamResponse>> {
    let id = StreamId::from(id);
    match state.registry.retrieve(&id).await {
        Ok(record) => Ok(Json(StreamResponse {
            stream: StreamDetail::from_record(&record, false),
        })),
        Err(e) if e.is_transient() => {
            // Serve the last known copy rather than an error page
            let snapshot = state.streams.snapshot();
            match snapshot.get(&id) {
                Some(record) => {
                    warn!(stream_id = %id, error = %e, "Serving stale stream detail");
                    Ok(Json(StreamResponse {
                        stream: StreamDetail::from_record(record, true),
                    }))
                }
                None => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

async fn get_ingest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<IngestInfo>> {
    let record = state.registry.retrieve(&StreamId::from(id)).await?;
    Ok(Json(ingest_info(&record, &state.config.mux.rtmp_url)))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

async fn delete_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DeleteResponse>> {
    let id = StreamId::from(id);
    let message = match state.coordinator.delete_stream(&id).await? {
        DeleteOutcome::Deleted => "Live stream deleted successfully".to_string(),
        DeleteOutcome::AlreadyGone => format!("Live stream {id} was already deleted"),
        DeleteOutcome::AlreadyInFlight => {
            return Err(AppError::conflict(format!("Live stream {id} is already being deleted")));
        }
    };

    Ok(Json(DeleteResponse {
        success: true,
        message,
    }))
}

/// Status transitions of the list scope as server-sent events, one event
/// per transition
async fn status_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.streams.subscribe()).flat_map(|batch| {
        let events: Vec<Result<Event, Infallible>> = match batch {
            Ok(batch) => batch.iter().filter_map(status_event).map(Ok).collect(),
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                warn!("SSE client lagged, missed {} poll cycles", n);
                Vec::new()
            }
        };
        futures::stream::iter(events)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn status_event(transition: &StatusTransition) -> Option<Event> {
    match Event::default().event("status").json_data(transition) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Failed to encode status event: {}", e);
            None
        }
    }
}
