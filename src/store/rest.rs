//! REST/SSE event-store backend
//!
//! Streams the two reference paths (`releaseInterval` scalar, `activate`
//! collection) as server-sent events and deletes records over plain REST.
//! A cancelled or dropped subscription resubscribes with capped backoff;
//! the `Cancelled` event is still surfaced for logging.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;

use super::{ActivationRecord, ActivationStore, StoreEvent};
use crate::config::StoreConfig;
use crate::{Error, Result};

/// Initial resubscribe delay
const BACKOFF_INITIAL: Duration = Duration::from_secs(1);

/// Resubscribe delay cap
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Feed channel depth
const FEED_QUEUE: usize = 64;

/// Which reference path a feed watches
#[derive(Debug, Clone, Copy)]
enum FeedKind {
    /// Single scalar: the default release interval
    Value,
    /// Collection of activation records
    Children,
}

/// REST/SSE-backed remote event store
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    activate_path: String,
    release_interval_path: String,
}

impl RestStore {
    /// Create a store client from configuration
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            activate_path: config.activate_path.clone(),
            release_interval_path: config.release_interval_path.clone(),
        }
    }

    /// Subscribe to both reference paths, merged into one ordered feed
    ///
    /// Spawns one background task per feed; the tasks exit when the returned
    /// receiver is dropped.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::Receiver<StoreEvent> {
        let (tx, rx) = mpsc::channel(FEED_QUEUE);

        tokio::spawn(feed_loop(
            self.client.clone(),
            self.reference_url(&self.release_interval_path),
            FeedKind::Value,
            tx.clone(),
        ));
        tokio::spawn(feed_loop(
            self.client.clone(),
            self.reference_url(&self.activate_path),
            FeedKind::Children,
            tx,
        ));

        rx
    }

    /// REST URL for a reference path, with auth when configured
    fn reference_url(&self, path: &str) -> String {
        self.auth_token.as_ref().map_or_else(
            || format!("{}/{path}.json", self.base_url),
            |token| format!("{}/{path}.json?auth={token}", self.base_url),
        )
    }
}

#[async_trait]
impl ActivationStore for RestStore {
    async fn remove(&self, key: &str) -> Result<()> {
        let url = self.reference_url(&format!("{}/{key}", self.activate_path));

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| Error::Store(format!("delete {key}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Store(format!("delete {key}: {status}")));
        }

        tracing::debug!(key, "activation record deleted");
        Ok(())
    }
}

/// Keep one feed subscribed until the consumer goes away
async fn feed_loop(
    client: reqwest::Client,
    url: String,
    kind: FeedKind,
    tx: mpsc::Sender<StoreEvent>,
) {
    let mut backoff = BACKOFF_INITIAL;

    loop {
        if tx.is_closed() {
            return;
        }

        match stream_feed(&client, &url, kind, &tx).await {
            Ok(()) => {
                tracing::debug!(?kind, "feed ended, resubscribing");
                backoff = BACKOFF_INITIAL;
            }
            Err(e) => {
                tracing::warn!(?kind, error = %e, "feed subscription failed");
            }
        }

        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(BACKOFF_MAX);
    }
}

/// One subscription lifetime: connect, parse SSE lines, forward events
async fn stream_feed(
    client: &reqwest::Client,
    url: &str,
    kind: FeedKind,
    tx: &mpsc::Sender<StoreEvent>,
) -> Result<()> {
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await?
        .error_for_status()?;

    let mut body = response.bytes_stream();
    let mut buffer = String::new();
    let mut event_name = String::new();

    while let Some(chunk) = body.next().await {
        buffer.push_str(&String::from_utf8_lossy(&chunk?));

        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim_end_matches('\r').to_string();
            buffer.drain(..=pos);

            if let Some(name) = line.strip_prefix("event:") {
                event_name = name.trim().to_string();
            } else if let Some(data) = line.strip_prefix("data:") {
                for event in parse_feed_event(kind, &event_name, data.trim()) {
                    if tx.send(event).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    Ok(())
}

/// SSE data payload for put/patch events
#[derive(Debug, Deserialize)]
struct FeedPayload {
    path: String,
    data: serde_json::Value,
}

/// Map one SSE event to typed store events
fn parse_feed_event(kind: FeedKind, event: &str, data: &str) -> Vec<StoreEvent> {
    match event {
        "keep-alive" => Vec::new(),
        "cancel" | "auth_revoked" => vec![StoreEvent::Cancelled {
            reason: event.to_string(),
        }],
        "put" | "patch" => {
            let payload: FeedPayload = match serde_json::from_str(data) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(error = %e, "unparseable feed payload");
                    return Vec::new();
                }
            };
            match kind {
                FeedKind::Value => value_events(&payload),
                FeedKind::Children => child_events(event, payload),
            }
        }
        other => {
            tracing::trace!(event = other, "ignoring feed event");
            Vec::new()
        }
    }
}

/// Events for the default-interval scalar feed
fn value_events(payload: &FeedPayload) -> Vec<StoreEvent> {
    match &payload.data {
        serde_json::Value::Null => Vec::new(),
        value => value.as_u64().map_or_else(
            || {
                tracing::warn!(?value, "release interval is not an unsigned integer");
                Vec::new()
            },
            |millis| vec![StoreEvent::DefaultInterval(millis)],
        ),
    }
}

/// Events for the activation collection feed
fn child_events(event: &str, payload: FeedPayload) -> Vec<StoreEvent> {
    let path = payload.path.trim_matches('/');

    // Root snapshot or root patch: one event per top-level child.
    if path.is_empty() {
        let serde_json::Value::Object(children) = payload.data else {
            return Vec::new();
        };
        return children
            .into_iter()
            .filter_map(|(key, value)| {
                if event == "put" {
                    parse_record(&key, value).map(|record| StoreEvent::Added { key, record })
                } else {
                    Some(StoreEvent::Changed { key })
                }
            })
            .collect();
    }

    // Write below a child: a change to that child.
    if let Some((key, _)) = path.split_once('/') {
        return vec![StoreEvent::Changed {
            key: key.to_string(),
        }];
    }

    let key = path.to_string();
    if payload.data.is_null() {
        return vec![StoreEvent::Removed { key }];
    }
    if event == "patch" {
        return vec![StoreEvent::Changed { key }];
    }
    parse_record(&key, payload.data)
        .map(|record| StoreEvent::Added { key, record })
        .into_iter()
        .collect()
}

/// Validate a record payload; invalid records are dropped with a warning
fn parse_record(key: &str, value: serde_json::Value) -> Option<ActivationRecord> {
    match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(key, error = %e, "rejecting malformed activation record");
            None
        }
    }
}
