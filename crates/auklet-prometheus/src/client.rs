//! Prometheus HTTP API client for instant queries.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, Method, Request};
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

use crate::error::QueryError;

/// Source of scalar metric samples.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Evaluate `expr` at instant `at` and return its single value.
    async fn query(&self, expr: &str, at: SystemTime) -> Result<f64, QueryError>;
}

/// Client for the Prometheus `/api/v1/query` endpoint.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    base: Url,
    host: String,
    port: u16,
    authority: String,
}

impl PrometheusClient {
    /// Validate `endpoint` and build a client for it.
    ///
    /// Only plain `http://` endpoints are supported.
    pub fn new(endpoint: &str) -> Result<Self, QueryError> {
        let invalid = |reason: &str| QueryError::InvalidUrl {
            url: endpoint.to_string(),
            reason: reason.to_string(),
        };

        if endpoint.trim().is_empty() {
            return Err(invalid("prometheus url must be provided"));
        }
        let base = Url::parse(endpoint).map_err(|e| invalid(&e.to_string()))?;
        if base.scheme() != "http" {
            return Err(invalid("only http:// endpoints are supported"));
        }
        let host = base
            .host_str()
            .ok_or_else(|| invalid("missing host"))?
            .to_string();
        let port = base
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port"))?;
        let authority = match base.port() {
            Some(p) => format!("{host}:{p}"),
            None => host.clone(),
        };

        Ok(Self {
            base,
            host,
            port,
            authority,
        })
    }

    /// The configured endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    /// Request target (path and query) for an instant query.
    fn query_target(&self, expr: &str, at: SystemTime) -> String {
        let mut url = self.base.clone();
        let path = format!("{}/api/v1/query", self.base.path().trim_end_matches('/'));
        url.set_path(&path);
        url.query_pairs_mut()
            .clear()
            .append_pair("query", expr)
            .append_pair("time", &format_time(at));
        url[url::Position::BeforePath..].to_string()
    }

    async fn get(&self, target: &str) -> Result<(u16, Bytes), QueryError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| QueryError::Connect(format!("{}: {e}", self.authority)))?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| QueryError::Connect(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "prometheus connection closed with error");
            }
        });

        let req = Request::builder()
            .method(Method::GET)
            .uri(target)
            .header(header::HOST, &self.authority)
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, "auklet/0.1")
            .body(Empty::<Bytes>::new())
            .map_err(|e| QueryError::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| QueryError::Request(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| QueryError::Request(e.to_string()))?
            .to_bytes();
        Ok((status, body))
    }
}

#[async_trait]
impl MetricSource for PrometheusClient {
    async fn query(&self, expr: &str, at: SystemTime) -> Result<f64, QueryError> {
        let target = self.query_target(expr, at);
        debug!(query = %expr, "querying prometheus");
        let (status, body) = self.get(&target).await?;
        parse_query_response(status, &body)
    }
}

fn format_time(at: SystemTime) -> String {
    let since = at.duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{:.3}", since.as_secs_f64())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    status: String,
    #[serde(default)]
    data: Option<WireData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireData {
    result_type: String,
    result: Value,
}

#[derive(Deserialize)]
struct WireSample {
    value: (f64, String),
}

/// Decode an instant query response into a single value.
pub fn parse_query_response(status: u16, body: &[u8]) -> Result<f64, QueryError> {
    let wire: WireResponse = match serde_json::from_slice(body) {
        Ok(w) => w,
        Err(e) if (200..300).contains(&status) => return Err(QueryError::Decode(e.to_string())),
        Err(_) => {
            return Err(QueryError::Http {
                status,
                body: String::from_utf8_lossy(body).trim().to_string(),
            });
        }
    };

    if wire.status != "success" {
        return Err(QueryError::Api {
            error_type: wire.error_type.unwrap_or_else(|| "unknown".to_string()),
            message: wire.error.unwrap_or_default(),
        });
    }

    let data = wire
        .data
        .ok_or_else(|| QueryError::Decode("response has no data".to_string()))?;

    match data.result_type.as_str() {
        "vector" => {
            let samples: Vec<WireSample> = serde_json::from_value(data.result)
                .map_err(|e| QueryError::Decode(e.to_string()))?;
            match samples.as_slice() {
                [sample] => parse_value(&sample.value.1),
                _ => Err(QueryError::SeriesCount(samples.len())),
            }
        }
        "scalar" => {
            let (_, value): (f64, String) = serde_json::from_value(data.result)
                .map_err(|e| QueryError::Decode(e.to_string()))?;
            parse_value(&value)
        }
        other => Err(QueryError::UnexpectedType(other.to_string())),
    }
}

fn parse_value(raw: &str) -> Result<f64, QueryError> {
    raw.parse::<f64>()
        .map_err(|_| QueryError::Value(raw.to_string()))
}
