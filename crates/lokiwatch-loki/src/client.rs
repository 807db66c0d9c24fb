//! HTTP client for Loki's `query_range` endpoint.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, info};

use lokiwatch_core::ObservedAt;
use lokiwatch_core::config::LokiConfig;
use lokiwatch_core::encoding::encode_component;

use crate::error::{LokiError, LokiResult};
use crate::response::{ParsedResponse, parse_query_response};

const QUERY_RANGE_PATH: &str = "/loki/api/v1/query_range";
const USER_AGENT: &str = concat!("lokiwatch/", env!("CARGO_PKG_VERSION"));

/// Range-query client for one Loki server.
#[derive(Clone)]
pub struct LokiClient {
    http: Client<HttpConnector, Empty<Bytes>>,
    base_url: String,
    query: String,
    limit: u32,
    timeout: Duration,
}

impl LokiClient {
    pub fn new(config: &LokiConfig) -> Self {
        let http = Client::builder(TokioExecutor::new()).build_http();
        let client = Self {
            http,
            base_url: config.base_url(),
            query: config.query.clone(),
            limit: config.limit,
            timeout: config.timeout,
        };
        info!(url = %client.base_url, "initialized loki client");
        client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full request URI for the range `[start, end]`, oldest first.
    pub fn query_uri(&self, start: ObservedAt, end: ObservedAt) -> String {
        format!(
            "{}{}?query={}&start={}&end={}&limit={}&direction=forward",
            self.base_url,
            QUERY_RANGE_PATH,
            encode_component(&self.query),
            start.as_nanos(),
            end.as_nanos(),
            self.limit,
        )
    }

    /// Fetch and parse every record in `[start, end]`.
    ///
    /// The whole exchange (connect, request, body) is bounded by the
    /// configured timeout.
    pub async fn query_range(&self, start: ObservedAt, end: ObservedAt) -> LokiResult<ParsedResponse> {
        let uri: http::Uri = self
            .query_uri(start, end)
            .parse()
            .map_err(|e: http::uri::InvalidUri| LokiError::InvalidUri(e.to_string()))?;

        debug!(%uri, limit = self.limit, "querying loki");

        let req = http::Request::builder()
            .method(http::Method::GET)
            .uri(uri)
            .header(http::header::USER_AGENT, USER_AGENT)
            .body(Empty::<Bytes>::new())
            .map_err(|e| LokiError::InvalidUri(e.to_string()))?;

        let exchange = async {
            let resp = self
                .http
                .request(req)
                .await
                .map_err(|e| LokiError::Request(e.to_string()))?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| LokiError::Body(e.to_string()))?
                .to_bytes();
            Ok::<_, LokiError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| LokiError::Timeout(self.timeout))??;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body[..body.len().min(1000)]).into_owned();
            return Err(LokiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!(bytes = body.len(), "retrieved loki response");
        parse_query_response(&body)
    }
}
