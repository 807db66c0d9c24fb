//! Delivery of rendered gauges to an external collector.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, info};

use lokiwatch_core::config::PushConfig;
use lokiwatch_core::encoding::encode_component;

use crate::error::SinkError;
use crate::prometheus::{CONTENT_TYPE, render_prometheus};
use crate::registry::GaugeRegistry;

/// Destination for the gauge registry.
///
/// Implementations own the transport. The poll loop calls `push` once per
/// cycle with the freshly republished registry.
pub trait MetricsSink: Send + Sync {
    fn push(&self, registry: &GaugeRegistry) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Prometheus Pushgateway sink.
///
/// Each push is a `PUT /metrics/job/<job>`, which replaces the whole
/// metric group of the job.
#[derive(Clone)]
pub struct PushGateway {
    http: Client<HttpConnector, Full<Bytes>>,
    endpoint: String,
    timeout: Duration,
}

impl PushGateway {
    pub fn new(config: &PushConfig) -> Self {
        let http = Client::builder(TokioExecutor::new()).build_http();
        let endpoint = format!(
            "{}/metrics/job/{}",
            config.gateway.trim_end_matches('/'),
            encode_component(&config.job)
        );
        info!(%endpoint, "initialized pushgateway sink");
        Self {
            http,
            endpoint,
            timeout: config.timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl MetricsSink for PushGateway {
    async fn push(&self, registry: &GaugeRegistry) -> Result<(), SinkError> {
        let body = render_prometheus(registry);
        let uri: http::Uri = self
            .endpoint
            .parse()
            .map_err(|e: http::uri::InvalidUri| SinkError::InvalidUri(e.to_string()))?;

        let req = http::Request::builder()
            .method(http::Method::PUT)
            .uri(uri)
            .header(http::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| SinkError::InvalidUri(e.to_string()))?;

        let exchange = async {
            let resp = self
                .http
                .request(req)
                .await
                .map_err(|e| SinkError::Request(e.to_string()))?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| SinkError::Request(e.to_string()))?
                .to_bytes();
            Ok::<_, SinkError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| SinkError::Timeout(self.timeout))??;

        if !status.is_success() {
            return Err(SinkError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body[..body.len().min(1000)]).into_owned(),
            });
        }

        debug!(series = registry.len(), endpoint = %self.endpoint, "pushed metrics");
        Ok(())
    }
}
