//! Where events come from.

use std::future::Future;

use lokiwatch_core::ObservedAt;
use lokiwatch_loki::{LokiClient, LokiResult, ParsedResponse};

/// A queryable store of raw log records.
pub trait LogSource: Send + Sync {
    /// Every record in `[start, end]`, in the order the store returns them.
    fn fetch(&self, start: ObservedAt, end: ObservedAt) -> impl Future<Output = LokiResult<ParsedResponse>> + Send;
}

impl LogSource for LokiClient {
    async fn fetch(&self, start: ObservedAt, end: ObservedAt) -> LokiResult<ParsedResponse> {
        self.query_range(start, end).await
    }
}
