//! Match-created notifications.
//!
//! Publishing is fire-and-forget: a failure is logged by the caller and
//! never rolls back the match, which is already committed when
//! [`MatchNotifier::publish_match`] runs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use ember_shared::{MatchId, UserId};
use ember_store::Match;

use crate::error::SinkError;

/// Emitted once per match, never once per side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub match_id: MatchId,
    pub user_a: UserId,
    pub user_b: UserId,
    pub created_at: DateTime<Utc>,
}

impl From<&Match> for MatchEvent {
    fn from(m: &Match) -> Self {
        Self {
            match_id: m.match_id.clone(),
            user_a: m.user_a.clone(),
            user_b: m.user_b.clone(),
            created_at: m.created_at,
        }
    }
}

pub trait MatchNotifier: Send + Sync {
    fn publish_match(&self, event: &MatchEvent) -> Result<(), SinkError>;
}

/// Writes match events to the log and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl MatchNotifier for LogNotifier {
    fn publish_match(&self, event: &MatchEvent) -> Result<(), SinkError> {
        info!(
            match_id = %event.match_id,
            user_a = %event.user_a,
            user_b = %event.user_b,
            "match created"
        );
        Ok(())
    }
}

/// POSTs each match event as JSON to a fixed URL.
///
/// The request runs on a spawned task so the engine's blocking caller is
/// never held up by the remote endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    runtime: Handle,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, runtime: Handle) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SinkError::Other(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            runtime,
        })
    }

    /// Build on the runtime of the calling task.
    pub fn from_current(url: impl Into<String>) -> Result<Self, SinkError> {
        let runtime = Handle::try_current().map_err(|_| SinkError::NoRuntime)?;
        Self::new(url, runtime)
    }
}

impl MatchNotifier for WebhookNotifier {
    fn publish_match(&self, event: &MatchEvent) -> Result<(), SinkError> {
        let client = self.client.clone();
        let url = self.url.clone();
        let event = event.clone();

        self.runtime.spawn(async move {
            match client.post(&url).json(&event).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(match_id = %event.match_id, "match webhook delivered");
                }
                Ok(resp) => {
                    warn!(match_id = %event.match_id, status = %resp.status(), "match webhook rejected");
                }
                Err(e) => {
                    warn!(match_id = %event.match_id, error = %e, "match webhook failed");
                }
            }
        });
        Ok(())
    }
}
