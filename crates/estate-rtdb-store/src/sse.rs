//! Server-sent events as the realtime database streams them.
//!
//! A frame is a block of `event:` / `data:` lines ended by a blank line.
//! `put` replaces the node at a relative path, `patch` merges children into
//! it, `keep-alive` carries nothing, and `cancel` / `auth_revoked` end the
//! stream.

use estate_store_traits::tree::write_at;
use estate_store_traits::{StoreError, StorePath};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Frame {
    pub event: String,
    pub data: String,
}

/// Incremental line splitter. Chunks may end anywhere, including inside a
/// multi-byte character.
#[derive(Debug, Default)]
pub(crate) struct FrameParser {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl FrameParser {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn line(&mut self, line: &str) -> Option<Frame> {
        if line.is_empty() {
            let event = self.event.take();
            let data = std::mem::take(&mut self.data);
            if event.is_none() && data.is_empty() {
                return None;
            }
            return Some(Frame {
                event: event.unwrap_or_else(|| "message".to_string()),
                data: data.join("\n"),
            });
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StreamEvent {
    Put { path: StorePath, data: Value },
    Patch { path: StorePath, data: Map<String, Value> },
    KeepAlive,
    Cancel,
    AuthRevoked,
    Other(String),
}

pub(crate) fn decode(frame: &Frame) -> Result<StreamEvent, StoreError> {
    match frame.event.as_str() {
        "put" | "patch" => {
            let mut body: Value = serde_json::from_str(&frame.data)?;
            let path = body
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| StoreError::Serialization("event without path".to_string()))?;
            let path = StorePath::parse(path)?;
            let data = body.get_mut("data").map(Value::take).unwrap_or(Value::Null);
            if frame.event == "put" {
                return Ok(StreamEvent::Put { path, data });
            }
            match data {
                Value::Object(map) => Ok(StreamEvent::Patch { path, data: map }),
                other => Err(StoreError::Serialization(format!(
                    "patch data must be an object, got {other}"
                ))),
            }
        }
        "keep-alive" => Ok(StreamEvent::KeepAlive),
        "cancel" => Ok(StreamEvent::Cancel),
        "auth_revoked" => Ok(StreamEvent::AuthRevoked),
        other => Ok(StreamEvent::Other(other.to_string())),
    }
}

/// Local copy of the subscribed node, rebuilt from put/patch events.
#[derive(Debug, Default)]
pub(crate) struct Mirror {
    root: Value,
}

impl Mirror {
    /// Apply a data event. Returns `false` for events that carry no data.
    pub fn apply(&mut self, event: StreamEvent) -> Result<bool, StoreError> {
        match event {
            StreamEvent::Put { path, data } => {
                write_at(&mut self.root, &path, data);
                Ok(true)
            }
            StreamEvent::Patch { path, data } => {
                for (relative, value) in data {
                    write_at(&mut self.root, &path.join(&relative)?, value);
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn snapshot(&self) -> Option<Value> {
        if self.root.is_null() {
            None
        } else {
            Some(self.root.clone())
        }
    }
}
