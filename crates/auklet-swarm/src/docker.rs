//! Docker Engine API client over a Unix socket or plain TCP.
//!
//! Every call opens a fresh connection and performs an HTTP/1.1 handshake
//! with hyper. The event stream keeps its connection open and is pumped
//! into a channel by a background task.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, Method, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::{Host, Url};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::orchestrator::{EventStream, Orchestrator};
use crate::types::*;

/// Buffered events between the pump task and the consumer.
const EVENT_BUFFER: usize = 64;

/// Default port of a `tcp://` Docker host without an explicit port.
const DEFAULT_TCP_PORT: u16 = 2375;

/// Where the Docker Engine API is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerHost {
    /// `unix:///path/to/docker.sock`
    Unix(PathBuf),
    /// `tcp://host[:port]`
    Tcp { host: String, port: u16 },
}

impl DockerHost {
    /// Parse a `DOCKER_HOST`-style address.
    pub fn parse(host: &str) -> OrchestratorResult<Self> {
        let invalid = |reason: &str| OrchestratorError::InvalidHost {
            host: host.to_string(),
            reason: reason.to_string(),
        };

        if let Some(path) = host.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(invalid("missing socket path"));
            }
            return Ok(DockerHost::Unix(PathBuf::from(path)));
        }

        if host.starts_with("tcp://") {
            let url = Url::parse(host).map_err(|e| invalid(&e.to_string()))?;
            let name = match url.host() {
                Some(Host::Domain(d)) if !d.is_empty() => d.to_string(),
                Some(Host::Ipv4(ip)) => ip.to_string(),
                Some(Host::Ipv6(ip)) => ip.to_string(),
                _ => return Err(invalid("missing host")),
            };
            return Ok(DockerHost::Tcp {
                host: name,
                port: url.port().unwrap_or(DEFAULT_TCP_PORT),
            });
        }

        Err(invalid("expected a unix:// or tcp:// address"))
    }

    /// Value of the `Host` request header.
    fn authority(&self) -> String {
        match self {
            DockerHost::Unix(_) => "docker".to_string(),
            DockerHost::Tcp { host, port } if host.contains(':') => format!("[{host}]:{port}"),
            DockerHost::Tcp { host, port } => format!("{host}:{port}"),
        }
    }
}

impl fmt::Display for DockerHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockerHost::Unix(path) => write!(f, "unix://{}", path.display()),
            DockerHost::Tcp { .. } => write!(f, "tcp://{}", self.authority()),
        }
    }
}

/// Docker Engine API client.
#[derive(Debug, Clone)]
pub struct DockerClient {
    host: DockerHost,
}

impl DockerClient {
    /// The default Docker host.
    pub const DEFAULT_HOST: &'static str = "unix:///var/run/docker.sock";

    /// Create a client for a `unix://` or `tcp://` Docker host.
    pub fn new(host: &str) -> OrchestratorResult<Self> {
        Ok(Self {
            host: DockerHost::parse(host)?,
        })
    }

    /// The address this client connects to.
    pub fn host(&self) -> &DockerHost {
        &self.host
    }

    /// Check that the daemon answers.
    pub async fn ping(&self) -> OrchestratorResult<()> {
        self.call(Method::GET, "/_ping", None).await?;
        Ok(())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> OrchestratorResult<Response<Incoming>> {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header(header::HOST, self.host.authority())
            .header(header::USER_AGENT, "auklet/0.1");
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let req = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| OrchestratorError::Request(e.to_string()))?;

        let connect_err =
            |e: std::io::Error| OrchestratorError::Connect(format!("{}: {e}", self.host));
        match &self.host {
            DockerHost::Unix(socket) => {
                let stream = UnixStream::connect(socket).await.map_err(connect_err)?;
                exchange(TokioIo::new(stream), req).await
            }
            DockerHost::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .map_err(connect_err)?;
                exchange(TokioIo::new(stream), req).await
            }
        }
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> OrchestratorResult<Bytes> {
        let resp = self.send(method, path, body).await?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| OrchestratorError::Request(e.to_string()))?
            .to_bytes();

        if !status.is_success() {
            return Err(OrchestratorError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl Orchestrator for DockerClient {
    async fn list_services(&self) -> OrchestratorResult<Vec<ServiceRecord>> {
        let body = self.call(Method::GET, "/services", None).await?;
        parse_services(&body)
    }

    async fn get_service(&self, id: &str) -> OrchestratorResult<ServiceRecord> {
        let path = format!("/services/{id}");
        match self.call(Method::GET, &path, None).await {
            Ok(body) => parse_service(&body),
            Err(OrchestratorError::Api { status: 404, .. }) => {
                Err(OrchestratorError::NotFound(id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn update_service(
        &self,
        id: &str,
        version: u64,
        spec: &Value,
    ) -> OrchestratorResult<UpdateResult> {
        let path = format!("/services/{id}/update?version={version}");
        let payload =
            serde_json::to_vec(spec).map_err(|e| OrchestratorError::Request(e.to_string()))?;
        let body = self.call(Method::POST, &path, Some(payload)).await?;
        parse_update_result(&body)
    }

    async fn list_ready_tasks(&self, service_id: &str) -> OrchestratorResult<Vec<TaskRecord>> {
        let query = filters_query(&[("service", service_id), ("_up-to-date", "true")]);
        let body = self
            .call(Method::GET, &format!("/tasks?{query}"), None)
            .await?;
        let tasks = parse_tasks(&body)?;
        Ok(tasks.into_iter().filter(|t| t.state == "running").collect())
    }

    async fn events(&self, since: SystemTime) -> OrchestratorResult<EventStream> {
        let since = since.duration_since(UNIX_EPOCH).unwrap_or_default();
        let query = filters_query(&[("type", "service")]);
        let path = format!(
            "/events?since={}.{:09}&{query}",
            since.as_secs(),
            since.subsec_nanos()
        );

        let resp = self.send(Method::GET, &path, None).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .into_body()
                .collect()
                .await
                .map(|c| c.to_bytes())
                .unwrap_or_default();
            return Err(OrchestratorError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(pump_events(resp.into_body(), tx));
        Ok(rx)
    }
}

/// Send one request over a fresh HTTP/1.1 connection.
async fn exchange<T>(io: T, req: Request<Full<Bytes>>) -> OrchestratorResult<Response<Incoming>>
where
    T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| OrchestratorError::Connect(e.to_string()))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "docker connection closed with error");
        }
    });

    sender
        .send_request(req)
        .await
        .map_err(|e| OrchestratorError::Request(e.to_string()))
}

/// Forward decoded events from a streaming body until it ends or the
/// receiver goes away.
async fn pump_events(
    mut body: Incoming,
    tx: mpsc::Sender<Result<ServiceEvent, OrchestratorError>>,
) {
    let mut decoder = LineDecoder::default();
    loop {
        let frame = tokio::select! {
            _ = tx.closed() => {
                debug!("event receiver dropped, closing docker event stream");
                return;
            }
            frame = body.frame() => frame,
        };

        let err = match frame {
            Some(Ok(frame)) => {
                let Ok(data) = frame.into_data() else {
                    continue;
                };
                for line in decoder.push(&data) {
                    match parse_event(&line) {
                        Ok(Some(event)) => {
                            if tx.send(Ok(event)).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "skipping undecodable docker event"),
                    }
                }
                continue;
            }
            Some(Err(e)) => OrchestratorError::Stream(e.to_string()),
            None => OrchestratorError::StreamClosed,
        };

        let _ = tx.send(Err(err)).await;
        return;
    }
}

/// Splits a byte stream into newline-terminated lines.
#[derive(Debug, Default)]
struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    /// Append a chunk and return every complete, non-blank line.
    fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                lines.push(line);
            }
        }
        lines
    }
}

/// Encode Docker list filters as a `filters=` query parameter.
fn filters_query(filters: &[(&str, &str)]) -> String {
    let mut map: HashMap<&str, Vec<&str>> = HashMap::new();
    for &(key, value) in filters {
        map.entry(key).or_default().push(value);
    }
    let json = serde_json::to_string(&map).unwrap_or_default();
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("filters", &json)
        .finish()
}

/// Pull the `message` field out of a Docker error body.
fn error_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(e) => e.message,
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    }
}

// ── Wire format ────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireService {
    #[serde(rename = "ID")]
    id: String,
    version: WireVersion,
    spec: Value,
    #[serde(default)]
    update_status: Option<WireUpdateStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireVersion {
    index: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireUpdateStatus {
    #[serde(default)]
    state: Option<UpdateState>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
struct WireSpec {
    #[serde(default)]
    name: String,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
    #[serde(default)]
    mode: Option<WireMode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireMode {
    #[serde(default)]
    replicated: Option<WireReplicated>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireReplicated {
    #[serde(default)]
    replicas: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireTask {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "ServiceID", default)]
    service_id: String,
    #[serde(default)]
    status: Option<WireTaskStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireTaskStatus {
    #[serde(default)]
    state: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireUpdateResponse {
    #[serde(default)]
    warnings: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct WireEvent {
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(rename = "Action", default)]
    action: String,
    #[serde(rename = "Actor", default)]
    actor: Option<WireActor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireActor {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(default)]
    attributes: Option<HashMap<String, String>>,
}

fn decode_err(e: serde_json::Error) -> OrchestratorError {
    OrchestratorError::Decode(e.to_string())
}

fn service_from_wire(wire: WireService) -> OrchestratorResult<ServiceRecord> {
    let spec: WireSpec = serde_json::from_value(wire.spec.clone()).map_err(decode_err)?;
    // Docker defaults an omitted replica count to 1.
    let replicas = spec
        .mode
        .and_then(|m| m.replicated)
        .map(|r| r.replicas.unwrap_or(1));
    let update_status = wire.update_status.and_then(|s| {
        s.state.map(|state| UpdateStatus {
            state,
            message: s.message.filter(|m| !m.is_empty()),
        })
    });

    Ok(ServiceRecord {
        id: wire.id,
        name: spec.name,
        labels: spec.labels.unwrap_or_default(),
        replicas,
        update_status,
        version: wire.version.index,
        spec: wire.spec,
    })
}

fn parse_service(body: &[u8]) -> OrchestratorResult<ServiceRecord> {
    let wire: WireService = serde_json::from_slice(body).map_err(decode_err)?;
    service_from_wire(wire)
}

fn parse_services(body: &[u8]) -> OrchestratorResult<Vec<ServiceRecord>> {
    let wire: Vec<WireService> = serde_json::from_slice(body).map_err(decode_err)?;
    wire.into_iter().map(service_from_wire).collect()
}

fn parse_tasks(body: &[u8]) -> OrchestratorResult<Vec<TaskRecord>> {
    let wire: Vec<WireTask> = serde_json::from_slice(body).map_err(decode_err)?;
    Ok(wire
        .into_iter()
        .map(|t| TaskRecord {
            id: t.id,
            service_id: t.service_id,
            state: t.status.map(|s| s.state).unwrap_or_default(),
        })
        .collect())
}

fn parse_update_result(body: &[u8]) -> OrchestratorResult<UpdateResult> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(UpdateResult::default());
    }
    let wire: WireUpdateResponse = serde_json::from_slice(body).map_err(decode_err)?;
    Ok(UpdateResult {
        warnings: wire.warnings.unwrap_or_default(),
    })
}

/// Decode one event line. Non-service events yield `None`.
fn parse_event(line: &[u8]) -> OrchestratorResult<Option<ServiceEvent>> {
    let wire: WireEvent = serde_json::from_slice(line).map_err(decode_err)?;
    if wire.kind != "service" {
        return Ok(None);
    }
    let actor = wire.actor.ok_or_else(|| {
        OrchestratorError::Decode("service event without actor".to_string())
    })?;
    Ok(Some(ServiceEvent {
        action: EventAction::parse(&wire.action),
        actor_id: actor.id,
        attributes: actor.attributes.unwrap_or_default(),
    }))
}
