//! Realtime-database implementation of the [`TreeStore`] trait.
//!
//! Talks to a Firebase-compatible REST endpoint: every node is addressed as
//! `{base}/{path}.json`. Server timestamps are sent as-is and resolved by the
//! database. Room creation uses the ETag compare-and-set flow, and
//! subscriptions read the `text/event-stream` variant of a GET and rebuild
//! the node locally from `put` / `patch` events.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use estate_store_traits::{Backend, StoreError, StorePath, Subscription, TreeStore};
use futures_util::StreamExt;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{Map, Value};
use url::Url;

mod sse;

use sse::{FrameParser, Mirror, StreamEvent};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const ETAG_REQUEST_HEADER: &str = "X-Firebase-ETag";

/// REST/SSE client for one database deployment.
#[derive(Clone)]
pub struct RtdbTreeStore {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
    request_timeout: Duration,
}

impl fmt::Debug for RtdbTreeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtdbTreeStore")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.auth_token.is_some())
            .finish()
    }
}

impl RtdbTreeStore {
    /// Client for the database at `base_url`, optionally authenticated with
    /// a database secret or ID token passed as the `auth` query parameter.
    pub fn new(base_url: Url, auth_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            auth_token: auth_token.filter(|t| !t.trim().is_empty()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the per-request timeout. Streaming subscriptions are exempt.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Database URL this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// REST URL of the node at `path`.
    pub fn node_url(&self, path: &StorePath) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                StoreError::InvalidPath(format!("{} cannot be a base url", self.base_url))
            })?;
            segments.pop_if_empty();
            match path.segments().split_last() {
                None => {
                    segments.push(".json");
                }
                Some((last, parents)) => {
                    segments.extend(parents);
                    segments.push(&format!("{last}.json"));
                }
            }
        }
        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }

    fn request(&self, method: Method, path: &StorePath) -> Result<RequestBuilder, StoreError> {
        let url = self.node_url(path)?;
        Ok(self
            .client
            .request(method, url)
            .timeout(self.request_timeout))
    }

    async fn send(builder: RequestBuilder) -> Result<Response, StoreError> {
        let resp = builder.send().await.map_err(network_error)?;
        check_status(resp).await
    }
}

fn network_error(err: reqwest::Error) -> StoreError {
    StoreError::Network(err.to_string())
}

async fn check_status(resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status, body))
}

fn status_error(status: StatusCode, body: String) -> StoreError {
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::PermissionDenied(message),
        _ => StoreError::Http {
            status: status.as_u16(),
            message,
        },
    }
}

async fn read_json(resp: Response) -> Result<Value, StoreError> {
    let bytes = resp.bytes().await.map_err(network_error)?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(&bytes)?)
}

fn non_null(value: Value) -> Option<Value> {
    if value.is_null() { None } else { Some(value) }
}

#[async_trait]
impl TreeStore for RtdbTreeStore {
    fn backend(&self) -> Backend {
        Backend::Rtdb
    }

    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        let resp = Self::send(self.request(Method::GET, path)?).await?;
        Ok(non_null(read_json(resp).await?))
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        let builder = self
            .request(Method::PUT, path)?
            .query(&[("print", "silent")])
            .json(&value);
        Self::send(builder).await?;
        Ok(())
    }

    async fn update(
        &self,
        path: &StorePath,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        for relative in fields.keys() {
            path.join(relative)?;
        }
        let builder = self
            .request(Method::PATCH, path)?
            .query(&[("print", "silent")])
            .json(&fields);
        Self::send(builder).await?;
        Ok(())
    }

    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        let resp = Self::send(self.request(Method::POST, path)?.json(&value)).await?;
        let body = read_json(resp).await?;
        body.get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Serialization(format!("push response without name: {body}")))
    }

    async fn set_if_absent(&self, path: &StorePath, value: Value) -> Result<bool, StoreError> {
        let resp = Self::send(
            self.request(Method::GET, path)?
                .header(ETAG_REQUEST_HEADER, "true"),
        )
        .await?;
        let etag = resp
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StoreError::Serialization("missing ETag header".to_string()))?;
        if non_null(read_json(resp).await?).is_some() {
            return Ok(false);
        }

        let put = self
            .request(Method::PUT, path)?
            .header(reqwest::header::IF_MATCH, etag)
            .query(&[("print", "silent")])
            .json(&value);
        let resp = put.send().await.map_err(network_error)?;
        if resp.status() == StatusCode::PRECONDITION_FAILED {
            tracing::debug!(%path, "conditional create lost the race");
            return Ok(false);
        }
        check_status(resp).await?;
        Ok(true)
    }

    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        let url = self.node_url(path)?;
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(network_error)?;
        let resp = check_status(resp).await?;

        let (tx, rx) = flume::unbounded();
        let watched = path.clone();
        let task = tokio::spawn(async move {
            let mut parser = FrameParser::default();
            let mut mirror = Mirror::default();
            let mut body = resp.bytes_stream();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        let _ = tx.send(Err(network_error(err)));
                        return;
                    }
                };
                for frame in parser.feed(&chunk) {
                    let event = match sse::decode(&frame) {
                        Ok(event) => event,
                        Err(err) => {
                            tracing::warn!(path = %watched, %err, "undecodable stream event");
                            continue;
                        }
                    };
                    match event {
                        StreamEvent::Cancel => {
                            let _ = tx.send(Err(StoreError::PermissionDenied(
                                "listener cancelled by security rules".to_string(),
                            )));
                            return;
                        }
                        StreamEvent::AuthRevoked => {
                            let _ = tx.send(Err(StoreError::PermissionDenied(
                                "auth token revoked".to_string(),
                            )));
                            return;
                        }
                        StreamEvent::Other(name) => {
                            tracing::trace!(path = %watched, event = %name, "ignoring stream event");
                        }
                        data_event => match mirror.apply(data_event) {
                            Ok(true) => {
                                if tx.send(Ok(mirror.snapshot())).is_err() {
                                    return;
                                }
                            }
                            Ok(false) => {}
                            Err(err) => {
                                tracing::warn!(path = %watched, %err, "could not apply stream event");
                            }
                        },
                    }
                }
            }
            let _ = tx.send(Err(StoreError::Closed));
        });
        tracing::debug!(%path, "rtdb subscription opened");

        Ok(Subscription::new(path.clone(), rx, move || task.abort()))
    }
}
