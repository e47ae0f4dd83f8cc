use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use crate::error::{Error, Result};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 64;

/// A frame on the realtime socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncomingEvent {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
}

impl IncomingEvent {
    /// Change type of a `postgres_changes` frame ("INSERT", "UPDATE", ...).
    pub fn change_type(&self) -> Option<&str> {
        if self.event != "postgres_changes" {
            return None;
        }
        self.payload
            .get("data")
            .and_then(|d| d.get("type"))
            .or_else(|| self.payload.get("type"))
            .and_then(|v| v.as_str())
    }

    /// The changed row, from either the current or the legacy payload layout.
    pub fn record(&self) -> Option<&Value> {
        self.payload
            .get("data")
            .and_then(|d| d.get("record"))
            .or_else(|| self.payload.get("record"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
        }
    }
}

/// One subscription: a named channel listening for one kind of change on one table.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    pub name: String,
    pub table: &'static str,
    pub kind: ChangeKind,
    pub filter: String,
}

impl ChannelSpec {
    pub fn group_messages(group_id: &str) -> Self {
        Self {
            name: format!("messages:{group_id}"),
            table: "messages",
            kind: ChangeKind::Insert,
            filter: format!("group_id=eq.{group_id}"),
        }
    }

    pub fn group_updates(group_id: &str) -> Self {
        Self {
            name: format!("groups:{group_id}"),
            table: "groups",
            kind: ChangeKind::Update,
            filter: format!("id=eq.{group_id}"),
        }
    }

    pub fn topic(&self) -> String {
        format!("realtime:{}", self.name)
    }

    pub fn join_frame(&self, access_token: Option<&str>, reference: u64) -> Value {
        let mut payload = json!({
            "config": {
                "postgres_changes": [{
                    "event": self.kind.as_str(),
                    "schema": "public",
                    "table": self.table,
                    "filter": self.filter,
                }]
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_string());
        }
        json!({
            "topic": self.topic(),
            "event": "phx_join",
            "payload": payload,
            "ref": reference.to_string(),
        })
    }

    fn matches(&self, event: &IncomingEvent) -> bool {
        event.topic == self.topic() && event.change_type() == Some(self.kind.as_str())
    }
}

pub fn heartbeat_frame(reference: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": reference.to_string(),
    })
}

/// `https://x.supabase.co` -> `wss://x.supabase.co/realtime/v1/websocket?apikey=..&vsn=1.0.0`
pub fn socket_url(base_url: &Url, anon_key: &str) -> Result<Url> {
    let mut url = base_url.join("realtime/v1/websocket").map_err(|e| Error::Config(e.to_string()))?;
    let scheme = if url.scheme() == "http" { "ws" } else { "wss" };
    url.set_scheme(scheme)
        .map_err(|_| Error::Config(format!("cannot use {scheme} for {base_url}")))?;
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", "1.0.0");
    Ok(url)
}

/// Records pushed on one channel. Dropping it stops the socket task.
pub struct Subscription<T> {
    topic: String,
    rx: mpsc::Receiver<T>,
    task: Option<JoinHandle<()>>,
}

impl<T> Subscription<T> {
    pub fn new(topic: impl Into<String>, rx: mpsc::Receiver<T>, task: Option<JoinHandle<()>>) -> Self {
        Self { topic: topic.into(), rx, task }
    }

    /// A subscription fed by the caller, for in-process backends.
    pub fn channel(topic: impl Into<String>) -> (mpsc::Sender<T>, Self) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (tx, Self::new(topic, rx, None))
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next record, or `None` once the channel is closed.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub struct RealtimeClient {
    ws_url: Url,
}

impl RealtimeClient {
    pub fn new(base_url: &Url, anon_key: &str) -> Result<Self> {
        Ok(Self { ws_url: socket_url(base_url, anon_key)? })
    }

    pub fn ws_url(&self) -> &Url {
        &self.ws_url
    }

    /// Opens a socket, joins `spec` and forwards every matching record.
    pub async fn subscribe<T>(&self, spec: ChannelSpec, access_token: Option<&str>) -> Result<Subscription<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (ws_stream, _) = connect_async(self.ws_url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let join = spec.join_frame(access_token, 1);
        write.send(WsMessage::Text(join.to_string())).await?;
        log::debug!("joined realtime channel {}", spec.topic());

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let topic = spec.topic();
        let task = crate::utils::spawn_async(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await;
            let mut reference = 1u64;
            loop {
                tokio::select! {
                    _ = heartbeat.tick() => {
                        reference += 1;
                        if let Err(e) = write.send(WsMessage::Text(heartbeat_frame(reference).to_string())).await {
                            log::warn!("realtime heartbeat failed on {}: {}", spec.topic(), e);
                            break;
                        }
                    }
                    frame = read.next() => {
                        let text = match frame {
                            Some(Ok(WsMessage::Text(text))) => text,
                            Some(Ok(WsMessage::Close(_))) | None => break,
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                log::warn!("realtime socket error on {}: {}", spec.topic(), e);
                                break;
                            }
                        };
                        let event: IncomingEvent = match serde_json::from_str(&text) {
                            Ok(event) => event,
                            Err(e) => {
                                log::warn!("unreadable realtime frame: {e}");
                                continue;
                            }
                        };
                        if let Some(reason) = join_rejection(&spec, &event) {
                            log::warn!("realtime join rejected on {}: {}", spec.topic(), reason);
                            break;
                        }
                        if let Some(record) = record_from::<T>(&spec, &event) {
                            if tx.send(record).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
            log::debug!("realtime channel {} closed", spec.topic());
        });

        Ok(Subscription::new(topic, rx, Some(task)))
    }
}

/// Decodes a socket frame into a record if it is a matching change on `spec`.
/// Frames that do not match are ignored; matching frames that fail to decode
/// are logged and skipped.
pub fn decode_record<T: DeserializeOwned>(spec: &ChannelSpec, text: &str) -> Option<T> {
    match serde_json::from_str::<IncomingEvent>(text) {
        Ok(event) => record_from(spec, &event),
        Err(e) => {
            log::warn!("unreadable realtime frame: {e}");
            None
        }
    }
}

fn record_from<T: DeserializeOwned>(spec: &ChannelSpec, event: &IncomingEvent) -> Option<T> {
    if !spec.matches(event) {
        return None;
    }
    let record = event.record()?.clone();
    match serde_json::from_value(record) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("skipping undecodable {} payload on {}: {}", spec.table, event.topic, e);
            None
        }
    }
}

/// The server's reason when it refuses or errors the channel on `spec`.
pub fn join_rejection(spec: &ChannelSpec, event: &IncomingEvent) -> Option<String> {
    if event.topic != spec.topic() {
        return None;
    }
    let refused = match event.event.as_str() {
        "phx_reply" => event.payload.get("status").and_then(Value::as_str) == Some("error"),
        "phx_error" => true,
        _ => false,
    };
    if !refused {
        return None;
    }
    Some(match event.payload.get("response") {
        Some(Value::Object(r)) if r.contains_key("reason") => r["reason"].as_str().unwrap_or("unknown").to_string(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => "no reason given".to_string(),
    })
}
