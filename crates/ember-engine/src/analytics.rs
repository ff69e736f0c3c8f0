//! Best-effort analytics events.
//!
//! Emission never fails the caller: the engine logs a [`SinkError`] at
//! `warn` and carries on.  [`ChannelAnalytics`] hands events to a bounded
//! channel drained by [`run_jsonl_writer`]; a full buffer drops the event.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info};

use ember_shared::{Decision, MatchId, UserId};

use crate::error::SinkError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SwipeEvent {
    Swipe {
        viewer_id: UserId,
        target_id: UserId,
        decision: Decision,
        remaining: u32,
        at: DateTime<Utc>,
    },
    LimitHit {
        user_id: UserId,
        next_refill_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    Match {
        match_id: MatchId,
        user_a: UserId,
        user_b: UserId,
        at: DateTime<Utc>,
    },
}

impl SwipeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SwipeEvent::Swipe { .. } => "swipe",
            SwipeEvent::LimitHit { .. } => "limit_hit",
            SwipeEvent::Match { .. } => "match",
        }
    }
}

pub trait AnalyticsSink: Send + Sync {
    fn emit(&self, event: SwipeEvent) -> Result<(), SinkError>;
}

/// Logs events at debug level only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAnalytics;

impl AnalyticsSink for LogAnalytics {
    fn emit(&self, event: SwipeEvent) -> Result<(), SinkError> {
        debug!(kind = event.kind(), ?event, "analytics event");
        Ok(())
    }
}

/// Non-blocking producer side of the analytics pipeline.
///
/// Cheap to clone.  Events go through a bounded channel to a background
/// writer task.
#[derive(Debug, Clone)]
pub struct ChannelAnalytics {
    sender: mpsc::Sender<SwipeEvent>,
}

impl ChannelAnalytics {
    pub fn new(sender: mpsc::Sender<SwipeEvent>) -> Self {
        Self { sender }
    }

    /// Channel of `buffer` events plus its receiving end, for
    /// [`run_jsonl_writer`] or a test to drain.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<SwipeEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }
}

impl AnalyticsSink for ChannelAnalytics {
    fn emit(&self, event: SwipeEvent) -> Result<(), SinkError> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Batching parameters for the JSONL writer.
#[derive(Debug, Clone)]
pub struct WriterSettings {
    pub path: PathBuf,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl WriterSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            batch_size: 100,
            flush_interval: Duration::from_secs(5),
        }
    }
}

/// Drain `rx`, appending one JSON object per line to `settings.path`.
///
/// Flushes when a batch fills, on every tick of the flush interval and
/// once more when the channel closes.
pub async fn run_jsonl_writer(mut rx: mpsc::Receiver<SwipeEvent>, settings: WriterSettings) {
    let batch_size = settings.batch_size.max(1);
    let mut buffer: Vec<SwipeEvent> = Vec::with_capacity(batch_size);
    let mut flush_timer = interval(settings.flush_interval);
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(path = %settings.path.display(), batch_size, "analytics writer started");

    loop {
        tokio::select! {
            biased;

            event = rx.recv() => match event {
                Some(e) => {
                    buffer.push(e);
                    if buffer.len() >= batch_size {
                        flush(&settings.path, &mut buffer).await;
                    }
                }
                None => {
                    flush(&settings.path, &mut buffer).await;
                    info!("analytics writer stopped");
                    return;
                }
            },

            _ = flush_timer.tick() => flush(&settings.path, &mut buffer).await,
        }
    }
}

async fn flush(path: &Path, buffer: &mut Vec<SwipeEvent>) {
    if buffer.is_empty() {
        return;
    }
    let count = buffer.len();
    match append_lines(path, buffer).await {
        Ok(()) => debug!(count, "analytics batch written"),
        Err(e) => error!(count, error = %e, "analytics batch lost"),
    }
    buffer.clear();
}

async fn append_lines(path: &Path, events: &[SwipeEvent]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;

    for event in events {
        let json = serde_json::to_string(event)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
    }

    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swipe() -> SwipeEvent {
        SwipeEvent::Swipe {
            viewer_id: UserId::parse("v").unwrap(),
            target_id: UserId::parse("t").unwrap(),
            decision: Decision::Like,
            remaining: 49,
            at: Utc::now(),
        }
    }

    #[test]
    fn full_buffer_is_reported_not_blocking() {
        let (sink, _rx) = ChannelAnalytics::channel(1);
        assert!(sink.emit(swipe()).is_ok());
        assert!(matches!(sink.emit(swipe()), Err(SinkError::Full)));
    }

    #[test]
    fn closed_channel_is_reported() {
        let (sink, rx) = ChannelAnalytics::channel(4);
        drop(rx);
        assert!(matches!(sink.emit(swipe()), Err(SinkError::Closed)));
    }

    #[test]
    fn events_are_tagged() {
        let json = serde_json::to_value(swipe()).unwrap();
        assert_eq!(json["event"], "swipe");
        assert_eq!(json["decision"], "like");
    }

    #[tokio::test]
    async fn writer_appends_json_lines_and_flushes_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let (sink, rx) = ChannelAnalytics::channel(16);

        let writer = tokio::spawn(run_jsonl_writer(rx, WriterSettings::new(&path)));
        sink.emit(swipe()).unwrap();
        sink.emit(SwipeEvent::LimitHit {
            user_id: UserId::parse("v").unwrap(),
            next_refill_at: Utc::now(),
            at: Utc::now(),
        })
        .unwrap();
        drop(sink);
        writer.await.unwrap();

        let body = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: SwipeEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.kind(), "limit_hit");
    }
}
