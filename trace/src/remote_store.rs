use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::future::{self, BoxFuture};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::basetypes::{AttributeValue, Status};
use crate::error::ExportError;
use crate::export::{ExportResult, Exporter, SpanData};

/// DEFAULT_TABLE is the table spans are written to unless configured
/// otherwise.
pub const DEFAULT_TABLE: &str = "traces";

/// StoreClient is the transport a RemoteStoreExporter writes through, for
/// example a thin wrapper around a database or HTTP client.
pub trait StoreClient: Send + Sync {
    /// insert appends rows to table.
    fn insert<'a>(&'a self, table: &'a str, rows: Vec<Value>) -> BoxFuture<'a, ExportResult>;
}

/// SpanRow is the stored representation of one span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanRow {
    /// trace_id as 32 lowercase hex characters.
    pub trace_id: String,
    /// span_id as 16 lowercase hex characters.
    pub span_id: String,
    /// parent_span_id is null for root spans.
    pub parent_span_id: Option<String>,
    /// name of the span.
    pub name: String,
    /// kind, one of internal, server, client, producer, consumer.
    pub kind: &'static str,
    /// status, one of unset, ok, error.
    pub status: &'static str,
    /// status_message is the error description, if any.
    pub status_message: Option<String>,
    /// start_time in RFC 3339 with microseconds.
    pub start_time: String,
    /// end_time in RFC 3339 with microseconds.
    pub end_time: String,
    /// duration_ms is end_time minus start_time in milliseconds.
    pub duration_ms: f64,
    /// sampled mirrors the trace flags.
    pub sampled: bool,
    /// attributes as a JSON object.
    pub attributes: Map<String, Value>,
}

fn rfc3339(time: SystemTime) -> String {
    let datetime: DateTime<Utc> = time.into();
    datetime.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn attribute_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Bool(v) => Value::Bool(*v),
        AttributeValue::Int(v) => Value::from(*v),
        // NaN and infinities are stored as null
        AttributeValue::Float(v) => Value::from(*v),
        AttributeValue::String(v) => Value::String(v.clone()),
    }
}

impl From<&SpanData> for SpanRow {
    fn from(span: &SpanData) -> Self {
        let status_message = match &span.status {
            Status::Error { description } => Some(description.clone()),
            _ => None,
        };
        SpanRow {
            trace_id: span.context.trace_id.to_string(),
            span_id: span.context.span_id.to_string(),
            parent_span_id: span.context.parent_span_id.map(|id| id.to_string()),
            name: span.name.clone(),
            kind: span.kind.as_str(),
            status: span.status.as_str(),
            status_message,
            start_time: rfc3339(span.start_time),
            end_time: rfc3339(span.end_time),
            duration_ms: span.duration().as_secs_f64() * 1000.0,
            sampled: span.context.is_sampled(),
            attributes: span
                .attributes
                .iter()
                .map(|(k, v)| (k.to_string(), attribute_json(v)))
                .collect(),
        }
    }
}

/// RemoteStoreExporter converts spans to JSON rows and inserts each batch into
/// a table through a StoreClient.
pub struct RemoteStoreExporter<C> {
    client: C,
    table: String,
    is_shutdown: AtomicBool,
}

impl<C: StoreClient> RemoteStoreExporter<C> {
    /// new writes through client into the default table.
    pub fn new(client: C) -> Self {
        RemoteStoreExporter {
            client,
            table: DEFAULT_TABLE.to_string(),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// with_table changes the destination table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// table is the destination table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// client returns the underlying store client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn rows(batch: &[SpanData]) -> Result<Vec<Value>, ExportError> {
        batch
            .iter()
            .map(|span| serde_json::to_value(SpanRow::from(span)).map_err(ExportError::from))
            .collect()
    }
}

impl<C> fmt::Debug for RemoteStoreExporter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStoreExporter")
            .field("table", &self.table)
            .finish()
    }
}

impl<C: StoreClient> Exporter for RemoteStoreExporter<C> {
    fn export<'a>(&'a self, batch: &'a [SpanData]) -> BoxFuture<'a, ExportResult> {
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Box::pin(future::ready(Err(ExportError::Shutdown)));
        }
        let rows = match Self::rows(batch) {
            Ok(rows) => rows,
            Err(err) => return Box::pin(future::ready(Err(err))),
        };
        debug!(table = %self.table, rows = rows.len(), "inserting spans");
        self.client.insert(&self.table, rows)
    }

    fn shutdown(&self) {
        self.is_shutdown.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde_json::json;

    use crate::basetypes::{Attributes, SpanID, SpanKind, TraceFlags, TraceID};
    use crate::context::TraceContext;
    use crate::trace::SpanOptions;
    use crate::tracer::Tracer;

    #[derive(Clone, Default)]
    struct RecordingClient {
        inserts: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
    }

    impl StoreClient for RecordingClient {
        fn insert<'a>(&'a self, table: &'a str, rows: Vec<Value>) -> BoxFuture<'a, ExportResult> {
            self.inserts.lock().unwrap().push((table.to_string(), rows));
            Box::pin(future::ready(Ok(())))
        }
    }

    struct UnavailableStore;

    impl StoreClient for UnavailableStore {
        fn insert<'a>(&'a self, _table: &'a str, _rows: Vec<Value>) -> BoxFuture<'a, ExportResult> {
            Box::pin(async {
                Err(ExportError::Store {
                    status: Some(503),
                    message: "service unavailable".to_string(),
                })
            })
        }
    }

    fn span_data() -> SpanData {
        let start_time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let mut attributes = Attributes::new();
        attributes.insert("http.status_code", 500);
        attributes.insert("retry", false);
        attributes.insert("ratio", 0.5);
        attributes.insert("route", "/orders");
        SpanData {
            context: TraceContext {
                trace_id: TraceID([0x0a; 16]),
                span_id: SpanID([0x0b; 8]),
                parent_span_id: None,
                trace_flags: TraceFlags(1),
            },
            name: "GET /orders".to_string(),
            kind: SpanKind::Server,
            attributes,
            status: Status::Error {
                description: "upstream failed".to_string(),
            },
            start_time,
            end_time: start_time + Duration::from_millis(250),
        }
    }

    #[test]
    fn span_row_json() {
        let row = serde_json::to_value(SpanRow::from(&span_data())).unwrap();
        assert_eq!(
            row,
            json!({
                "trace_id": "0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a",
                "span_id": "0b0b0b0b0b0b0b0b",
                "parent_span_id": null,
                "name": "GET /orders",
                "kind": "server",
                "status": "error",
                "status_message": "upstream failed",
                "start_time": "2023-11-14T22:13:20.000000Z",
                "end_time": "2023-11-14T22:13:20.250000Z",
                "duration_ms": 250.0,
                "sampled": true,
                "attributes": {
                    "http.status_code": 500,
                    "retry": false,
                    "ratio": 0.5,
                    "route": "/orders"
                }
            })
        );
    }

    #[tokio::test]
    async fn inserts_batch_into_table() {
        let client = RecordingClient::default();
        let exporter = RemoteStoreExporter::new(client.clone());
        assert_eq!(exporter.table(), "traces");

        exporter.export(&[span_data(), span_data()]).await.unwrap();

        let inserts = client.inserts.lock().unwrap();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].0, "traces");
        assert_eq!(inserts[0].1.len(), 2);
        assert_eq!(inserts[0].1[0]["span_id"], "0b0b0b0b0b0b0b0b");
    }

    #[tokio::test]
    async fn custom_table_and_shutdown() {
        let client = RecordingClient::default();
        let exporter = RemoteStoreExporter::new(client.clone()).with_table("spans_v2");
        exporter.export(&[span_data()]).await.unwrap();
        assert_eq!(client.inserts.lock().unwrap()[0].0, "spans_v2");

        exporter.shutdown();
        assert!(matches!(
            exporter.export(&[span_data()]).await,
            Err(ExportError::Shutdown)
        ));
        assert_eq!(client.inserts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn store_failures_are_counted_by_the_tracer() {
        let exporter = RemoteStoreExporter::new(UnavailableStore);
        match exporter.export(&[span_data()]).await {
            Err(ExportError::Store { status, .. }) => assert_eq!(status, Some(503)),
            other => panic!("unexpected result {:?}", other),
        }

        let tracer = Tracer::builder("orders")
            .with_flush_interval(None)
            .with_exporter(exporter)
            .build()
            .unwrap();
        tracer.start("GET /orders", SpanOptions::new()).end();
        let outcome = tracer.flush().await;
        assert_eq!(outcome.spans, 1);
        assert_eq!(outcome.failed_exporters, 1);
    }
}
