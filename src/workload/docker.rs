//! Docker Engine API adapter.
//!
//! # Responsibilities
//! - Speak HTTP/1.1 to the engine over a unix socket or TCP
//! - List containers and inspect each one into a `Workload`
//! - Turn the newline-delimited `/events` stream into `WorkloadEvent`s
//!
//! # Design Decisions
//! - One connection per request; the engine is local and requests are rare
//! - Containers that vanish between listing and inspection are skipped
//! - The event stream ends with `StreamClosed` so the supervisor restarts the loop

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use futures_util::stream::{self, Stream, StreamExt};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use url::Url;

use crate::workload::source::{
    Workload, WorkloadError, WorkloadEvent, WorkloadEventStream, WorkloadResult, WorkloadSource,
    WorkloadStatus, WATCHED_ACTIONS,
};

pub const DEFAULT_DOCKER_URL: &str = "unix:///var/run/docker.sock";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Transport {
    Unix(PathBuf),
    Tcp(String),
}

/// Workload source backed by a Docker-compatible engine.
#[derive(Debug, Clone)]
pub struct DockerSource {
    transport: Transport,
}

impl DockerSource {
    /// Accepts `unix:///path`, `tcp://host:port` and `http://host:port`.
    pub fn new(raw: &str) -> WorkloadResult<Self> {
        let url = Url::parse(raw).map_err(|_| WorkloadError::InvalidUrl(raw.to_string()))?;
        let transport = match url.scheme() {
            "unix" => {
                if url.path().is_empty() || url.path() == "/" {
                    return Err(WorkloadError::InvalidUrl(raw.to_string()));
                }
                Transport::Unix(PathBuf::from(url.path()))
            }
            "tcp" | "http" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| WorkloadError::InvalidUrl(raw.to_string()))?;
                let port = url.port().unwrap_or(2375);
                Transport::Tcp(format!("{}:{}", host, port))
            }
            _ => return Err(WorkloadError::InvalidUrl(raw.to_string())),
        };
        Ok(Self { transport })
    }

    fn authority(&self) -> &str {
        match &self.transport {
            Transport::Unix(_) => "docker",
            Transport::Tcp(addr) => addr,
        }
    }

    async fn send(&self, path: &str) -> WorkloadResult<Response<Body>> {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .header("host", self.authority())
            .header("user-agent", "proxywall")
            .body(Body::empty())
            .map_err(|e| WorkloadError::Transport(e.to_string()))?;

        let transport = transport_error(path);
        match &self.transport {
            #[cfg(unix)]
            Transport::Unix(socket) => {
                let stream = tokio::net::UnixStream::connect(socket).await.map_err(transport)?;
                send_over(stream, request, path).await
            }
            #[cfg(not(unix))]
            Transport::Unix(_) => Err(WorkloadError::Transport(
                "unix sockets are not supported on this platform".to_string(),
            )),
            Transport::Tcp(addr) => {
                let stream = tokio::net::TcpStream::connect(addr).await.map_err(transport)?;
                send_over(stream, request, path).await
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> WorkloadResult<T> {
        let response = tokio::time::timeout(REQUEST_TIMEOUT, self.send(path))
            .await
            .map_err(|_| WorkloadError::Transport(format!("request to {} timed out", path)))??;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(transport_error(path))?;

        if !status.is_success() {
            return Err(WorkloadError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }
        serde_json::from_slice(&body).map_err(|source| WorkloadError::Decode {
            path: path.to_string(),
            source,
        })
    }

    async fn inspect(&self, id: &str) -> WorkloadResult<Option<Workload>> {
        let path = format!("/containers/{}/json", id);
        match self.get_json::<ContainerInspect>(&path).await {
            Ok(inspect) => Ok(Some(inspect.into_workload())),
            Err(WorkloadError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                tracing::debug!(id = %id, "Container vanished before inspection");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn transport_error<E: std::fmt::Display>(path: &str) -> impl Fn(E) -> WorkloadError + '_ {
    move |e| WorkloadError::Transport(format!("{}: {}", path, e))
}

async fn send_over<S>(stream: S, request: Request<Body>, path: &str) -> WorkloadResult<Response<Body>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(transport_error(path))?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!(error = %e, "Docker connection closed with error");
        }
    });
    let response = sender.send_request(request).await.map_err(transport_error(path))?;
    Ok(response.map(Body::new))
}

#[async_trait]
impl WorkloadSource for DockerSource {
    async fn list(&self) -> WorkloadResult<Vec<Workload>> {
        let summaries: Vec<ContainerSummary> = self.get_json("/containers/json?all=1").await?;
        let mut workloads = Vec::with_capacity(summaries.len());
        for summary in summaries {
            if let Some(workload) = self.inspect(&summary.id).await? {
                workloads.push(workload);
            }
        }
        tracing::debug!(count = workloads.len(), "Listed containers");
        Ok(workloads)
    }

    async fn events(&self) -> WorkloadResult<WorkloadEventStream> {
        let path = format!("/events?filters={}", events_filter());
        let response = tokio::time::timeout(REQUEST_TIMEOUT, self.send(&path))
            .await
            .map_err(|_| WorkloadError::Transport(format!("request to {} timed out", path)))??;

        let status = response.status();
        if !status.is_success() {
            let body = axum::body::to_bytes(response.into_body(), MAX_BODY_BYTES)
                .await
                .unwrap_or_default();
            return Err(WorkloadError::Status {
                path,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }

        tracing::info!("Subscribed to container events");
        Ok(decode_event_lines(response.into_body().into_data_stream()).boxed())
    }
}

/// URL-encoded `filters` query selecting container lifecycle events.
fn events_filter() -> String {
    let filters = serde_json::json!({
        "type": ["container"],
        "event": WATCHED_ACTIONS,
    });
    url::form_urlencoded::byte_serialize(filters.to_string().as_bytes()).collect()
}

struct LineState<S> {
    chunks: Pin<Box<S>>,
    buffer: Vec<u8>,
    ended: bool,
    done: bool,
}

/// Split a byte stream into JSON lines and decode each into an event.
///
/// Malformed lines are skipped. The stream ends with a single error once the
/// underlying stream fails or closes.
pub fn decode_event_lines<S, E>(chunks: S) -> impl Stream<Item = WorkloadResult<WorkloadEvent>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let state = LineState {
        chunks: Box::pin(chunks),
        buffer: Vec::new(),
        ended: false,
        done: false,
    };
    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        loop {
            while let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                if let Some(event) = parse_event(&line) {
                    return Some((Ok(event), state));
                }
            }
            if state.ended {
                state.done = true;
                return Some((Err(WorkloadError::StreamClosed), state));
            }
            match state.chunks.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(WorkloadError::Transport(e.to_string())), state));
                }
                None => {
                    // Terminate a trailing partial line so it is still decoded.
                    state.ended = true;
                    state.buffer.push(b'\n');
                }
            }
        }
    })
}

fn parse_event(line: &[u8]) -> Option<WorkloadEvent> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    let raw: RawEvent = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping undecodable container event");
            return None;
        }
    };
    let action = raw.action.or(raw.status)?;
    let id = raw.actor.and_then(|a| a.id).or(raw.id)?;
    Some(WorkloadEvent { action, id })
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "Action")]
    action: Option<String>,
    status: Option<String>,
    #[serde(rename = "Actor")]
    actor: Option<RawActor>,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawActor {
    #[serde(rename = "ID")]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerInspect {
    id: String,
    #[serde(default)]
    config: InspectConfig,
    #[serde(default)]
    state: InspectState,
    #[serde(default)]
    network_settings: InspectNetworkSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    tty: bool,
    #[serde(default)]
    env: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectNetworkSettings {
    #[serde(default)]
    networks: Option<HashMap<String, InspectNetwork>>,
}

#[derive(Debug, Default, Deserialize)]
struct InspectNetwork {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
}

impl ContainerInspect {
    fn into_workload(self) -> Workload {
        let networks = self
            .network_settings
            .networks
            .unwrap_or_default()
            .into_iter()
            .map(|(name, net)| (name, net.ip_address))
            .collect();
        Workload {
            id: self.id,
            env: self.config.env.unwrap_or_default(),
            tty: self.config.tty,
            status: WorkloadStatus::parse(&self.state.status),
            networks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        let owned: Vec<Result<Bytes, std::io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        stream::iter(owned)
    }

    #[test]
    fn test_url_parsing() {
        let unix = DockerSource::new("unix:///var/run/docker.sock").unwrap();
        assert_eq!(unix.transport, Transport::Unix(PathBuf::from("/var/run/docker.sock")));

        let tcp = DockerSource::new("tcp://10.0.0.1:2376").unwrap();
        assert_eq!(tcp.transport, Transport::Tcp("10.0.0.1:2376".into()));

        let http = DockerSource::new("http://docker").unwrap();
        assert_eq!(http.transport, Transport::Tcp("docker:2375".into()));

        assert!(DockerSource::new("ftp://docker").is_err());
        assert!(DockerSource::new("unix://").is_err());
    }

    #[tokio::test]
    async fn test_decode_split_lines() {
        let events: Vec<_> = decode_event_lines(chunks(&[
            "{\"Action\":\"start\",\"Actor\":{\"ID\":\"a",
            "bc\"}}\n\n{\"status\":\"die\",\"id\":\"def\"}\n",
        ]))
        .collect()
        .await;

        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &WorkloadEvent { action: "start".into(), id: "abc".into() }
        );
        assert_eq!(
            events[1].as_ref().unwrap(),
            &WorkloadEvent { action: "die".into(), id: "def".into() }
        );
        assert!(matches!(events[2], Err(WorkloadError::StreamClosed)));
    }

    #[tokio::test]
    async fn test_decode_skips_garbage_and_flushes_tail() {
        let events: Vec<_> = decode_event_lines(chunks(&[
            "not json\n",
            "{\"Action\":\"stop\",\"Actor\":{\"ID\":\"x\"}}",
        ]))
        .collect()
        .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().id, "x");
        assert!(matches!(events[1], Err(WorkloadError::StreamClosed)));
    }

    #[tokio::test]
    async fn test_decode_transport_error_ends_stream() {
        let parts: Vec<Result<Bytes, std::io::Error>> = vec![Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ))];
        let events: Vec<_> = decode_event_lines(stream::iter(parts)).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(WorkloadError::Transport(_))));
    }

    #[test]
    fn test_inspect_into_workload() {
        let raw = r#"{
            "Id": "abc",
            "Config": {"Tty": false, "Env": ["VHOST=api.test", "VPORT=80"]},
            "State": {"Status": "running"},
            "NetworkSettings": {"Networks": {"front": {"IPAddress": "172.18.0.2"}}}
        }"#;
        let inspect: ContainerInspect = serde_json::from_str(raw).unwrap();
        let workload = inspect.into_workload();
        assert_eq!(workload.id, "abc");
        assert_eq!(workload.status, WorkloadStatus::Running);
        assert_eq!(workload.env.len(), 2);
        assert_eq!(workload.networks.get("front").map(String::as_str), Some("172.18.0.2"));
    }

    #[test]
    fn test_inspect_null_env() {
        let raw = r#"{"Id": "abc", "Config": {"Env": null}, "State": {"Status": "exited"}}"#;
        let workload = serde_json::from_str::<ContainerInspect>(raw).unwrap().into_workload();
        assert!(workload.env.is_empty());
        assert!(workload.networks.is_empty());
        assert!(workload.status.is_stopped());
    }

    #[test]
    fn test_events_filter_is_encoded() {
        let filter = events_filter();
        assert!(!filter.contains('{'));
        assert!(filter.contains("destroy"));
    }
}
