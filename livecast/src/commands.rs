//! One-shot CLI commands

use std::sync::Arc;

use anyhow::Result;
use livecast_core::view::{grid_entries, ingest_info, StreamCard, StreamDetail};
use livecast_core::{
    Config, CreateOutcome, DeleteOutcome, LifecycleCoordinator, PlaybackPolicy, PollScope,
    StreamId, StreamRegistryClient, StreamStatusPoller,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

pub async fn list(registry: &Arc<dyn StreamRegistryClient>, demo: bool) -> Result<()> {
    let records = registry.list().await?;
    let entries = grid_entries(&records, demo);

    if entries.is_empty() {
        println!("No live streams");
        return Ok(());
    }

    println!("{:<36} {:<13} {:<5} {}", "ID", "STATUS", "LIVE", "TITLE");
    for entry in &entries {
        let card = StreamCard::from_entry(entry);
        let status = if card.is_coming_soon {
            "coming soon".to_string()
        } else {
            card.status.map(|s| s.to_string()).unwrap_or_default()
        };
        println!(
            "{:<36} {:<13} {:<5} {}",
            card.id,
            status,
            if card.is_live { "yes" } else { "no" },
            card.title
        );
    }
    Ok(())
}

pub async fn show(registry: &Arc<dyn StreamRegistryClient>, id: &StreamId) -> Result<()> {
    let record = registry.retrieve(id).await?;
    let detail = StreamDetail::from_record(&record, false);
    println!("{}", serde_json::to_string_pretty(&detail)?);
    Ok(())
}

pub async fn create(
    config: &Config,
    registry: Arc<dyn StreamRegistryClient>,
    policy: Option<PlaybackPolicy>,
    reconnect_window: Option<i64>,
) -> Result<()> {
    let coordinator = LifecycleCoordinator::new(registry);
    let outcome = coordinator
        .create_with(
            policy.unwrap_or(config.streams.playback_policy),
            reconnect_window.unwrap_or(config.streams.reconnect_window_seconds),
        )
        .await?;

    match outcome {
        CreateOutcome::Created(record) => {
            println!("Created stream {}", record.id);
            if let Some(playback_id) = record.primary_playback_id() {
                println!("Playback ID: {playback_id}");
            }
            println!("Run `livecast ingest {}` for encoder settings", record.id);
        }
        CreateOutcome::AlreadyInFlight => println!("A create is already in progress"),
    }
    Ok(())
}

pub async fn delete(registry: Arc<dyn StreamRegistryClient>, id: &StreamId) -> Result<()> {
    let coordinator = LifecycleCoordinator::new(registry);
    match coordinator.delete_stream(id).await? {
        DeleteOutcome::Deleted => println!("Live stream deleted successfully"),
        DeleteOutcome::AlreadyGone => println!("Live stream {id} was already gone"),
        DeleteOutcome::AlreadyInFlight => println!("A delete for {id} is already in progress"),
    }
    Ok(())
}

pub async fn ingest(
    config: &Config,
    registry: &Arc<dyn StreamRegistryClient>,
    id: &StreamId,
) -> Result<()> {
    let record = registry.retrieve(id).await?;
    let info = ingest_info(&record, &config.mux.rtmp_url);
    println!("RTMP URL:   {}", info.rtmp_url);
    println!("Stream key: {}", info.stream_key);
    Ok(())
}

pub async fn watch(
    config: &Config,
    registry: Arc<dyn StreamRegistryClient>,
    id: Option<StreamId>,
) -> Result<()> {
    let poller = match id {
        Some(id) => StreamStatusPoller::detail(id, registry, &config.polling),
        None => StreamStatusPoller::list(registry, &config.polling),
    };
    let mut events = poller.subscribe();

    // Fail fast on configuration problems before entering the loop
    poller.refresh().await?;
    let snapshot = poller.snapshot();
    match poller.scope() {
        PollScope::List => println!("Watching {} stream(s)", snapshot.len()),
        PollScope::Detail(id) if snapshot.is_empty() => {
            anyhow::bail!("Stream not found: {id}");
        }
        PollScope::Detail(id) => println!("Watching stream {id}"),
    }
    for record in &snapshot.records {
        println!("  {} {}", record.id, record.status);
    }

    let handle = poller.start();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(batch) => {
                    for t in batch.iter() {
                        println!("{} {} {} -> {}", t.at.format("%H:%M:%S"), t.id, t.from, t.to);
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("Missed {} poll cycles of status events", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.shutdown().await;
    Ok(())
}
