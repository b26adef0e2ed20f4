//! In-memory stand-ins for the database, the object store and the event sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{ConnectionError, ExportflowError};
use crate::events::EventSink;
use crate::retention::{ObjectStore, RetentionCandidate};
use crate::sql::{CommandOutcome, SqlConnection, SqlConnector, SqlError};

#[derive(Debug, Default)]
struct ExportTable {
    unexported: u64,
    exported: u64,
    written: u64,
    executed: Vec<String>,
    queries: Vec<String>,
    opened: usize,
    released: usize,
    refuse_connections: usize,
    fail_on: Option<String>,
}

impl ExportTable {
    /// Applies a statement to the counters, recognising the three phases of
    /// an export script by keyword.
    fn apply(&mut self, sql: &str) -> Result<CommandOutcome, SqlError> {
        self.executed.push(sql.to_string());
        if let Some(needle) = &self.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(SqlError::server(Some(500), format!("rejected statement containing '{needle}'")));
            }
        }

        let upper = sql.to_ascii_uppercase();
        let affected = if upper.contains("DELETE") {
            std::mem::take(&mut self.exported)
        } else if upper.contains("INSERT INTO") {
            self.written += self.exported;
            self.exported
        } else if upper.contains("UPDATE") {
            let marked = std::mem::take(&mut self.unexported);
            self.exported += marked;
            marked
        } else {
            return Ok(CommandOutcome::empty());
        };
        Ok(CommandOutcome::affected(affected))
    }

    fn count(&mut self, sql: &str) -> u64 {
        self.queries.push(sql.to_string());
        let compact: String = sql.split_whitespace().collect::<Vec<_>>().join(" ");
        if compact.contains("exported = 0") {
            self.unexported
        } else if compact.contains("exported = 1") {
            self.exported
        } else {
            self.unexported + self.exported
        }
    }
}

/// A tiny stateful export table behind the [`SqlConnector`] seam.
///
/// Rows are tracked as counters: unexported, exported (marked but still in
/// the table) and written (copied to storage). Statements containing
/// `UPDATE` mark rows, `INSERT INTO` writes marked rows, and `DELETE`
/// removes marked rows.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    table: Arc<Mutex<ExportTable>>,
}

impl InMemoryConnector {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table with the given row counts.
    #[must_use]
    pub fn with_rows(unexported: u64, exported: u64) -> Self {
        let connector = Self::new();
        {
            let mut table = connector.table.lock();
            table.unexported = unexported;
            table.exported = exported;
        }
        connector
    }

    /// Makes the next `n` connection attempts fail.
    pub fn refuse_next_connections(&self, n: usize) {
        self.table.lock().refuse_connections = n;
    }

    /// Makes every statement containing `needle` fail with a server error.
    pub fn fail_statements_containing(&self, needle: impl Into<String>) {
        self.table.lock().fail_on = Some(needle.into());
    }

    /// Rows not yet exported.
    #[must_use]
    pub fn unexported(&self) -> u64 {
        self.table.lock().unexported
    }

    /// Rows marked exported but still in the table.
    #[must_use]
    pub fn exported(&self) -> u64 {
        self.table.lock().exported
    }

    /// Rows written to storage in total.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.table.lock().written
    }

    /// Statements passed to `execute`, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.table.lock().executed.clone()
    }

    /// Queries passed to `query_scalar`, in order.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.table.lock().queries.clone()
    }

    /// Connections opened.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.table.lock().opened
    }

    /// Connections released.
    #[must_use]
    pub fn released(&self) -> usize {
        self.table.lock().released
    }
}

#[async_trait]
impl SqlConnector for InMemoryConnector {
    fn target(&self) -> String {
        "memory".to_string()
    }

    async fn connect(&self) -> Result<Box<dyn SqlConnection>, ExportflowError> {
        let mut table = self.table.lock();
        if table.refuse_connections > 0 {
            table.refuse_connections -= 1;
            return Err(ConnectionError::new("memory", "connection refused").into());
        }
        table.opened += 1;
        Ok(Box::new(InMemoryConnection {
            table: Arc::clone(&self.table),
            released: false,
        }))
    }
}

struct InMemoryConnection {
    table: Arc<Mutex<ExportTable>>,
    released: bool,
}

#[async_trait]
impl SqlConnection for InMemoryConnection {
    async fn query_scalar(&mut self, sql: &str) -> Result<Option<u64>, SqlError> {
        Ok(Some(self.table.lock().count(sql)))
    }

    async fn execute(&mut self, sql: &str) -> Result<CommandOutcome, SqlError> {
        self.table.lock().apply(sql)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.table.lock().released += 1;
        }
    }
}

/// An [`ObjectStore`] holding object metadata in memory.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, RetentionCandidate>>,
    failing_deletes: RwLock<HashSet<String>>,
    fail_listing: AtomicBool,
}

impl InMemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an object.
    pub fn insert(&self, key: impl Into<String>, last_modified: DateTime<Utc>, size: u64) {
        let key = key.into();
        self.objects
            .write()
            .insert(key.clone(), RetentionCandidate::new(key, last_modified, size));
    }

    /// Makes deletion of `key` fail.
    pub fn fail_deletes_for(&self, key: impl Into<String>) {
        self.failing_deletes.write().insert(key.into());
    }

    /// Makes listing fail with a connection error.
    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    /// Keys currently stored, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// True when the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn location(&self) -> String {
        "memory".to_string()
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RetentionCandidate>, ExportflowError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(ConnectionError::new("memory", "listing unavailable").into());
        }
        Ok(self
            .objects
            .read()
            .values()
            .filter(|o| o.key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), ExportflowError> {
        if self.failing_deletes.read().contains(key) {
            return Err(ExportflowError::step(format!("access denied deleting '{key}'")));
        }
        self.objects.write().remove(key);
        Ok(())
    }
}

/// An event sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<(String, Option<serde_json::Value>)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the event types, in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Returns the data of every event named exactly `event_type`.
    #[must_use]
    pub fn data_of(&self, event_type: &str) -> Vec<Option<serde_json::Value>> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t == event_type)
            .map(|(_, d)| d.clone())
            .collect()
    }

    fn record(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.record(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.record(event_type, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::ConnectionGuard;

    #[tokio::test]
    async fn test_export_table_phases() {
        let connector = InMemoryConnector::with_rows(5, 0);
        let mut guard = ConnectionGuard::acquire(&connector).await.unwrap();
        let conn = guard.connection();

        let marked = conn.execute("ALTER TABLE t UPDATE exported = 1 WHERE exported = 0").await.unwrap();
        assert_eq!(marked.affected_rows, Some(5));
        let written = conn.execute("INSERT INTO FUNCTION s3('x') SELECT * FROM t WHERE exported = 1").await.unwrap();
        assert_eq!(written.affected_rows, Some(5));
        let deleted = conn.execute("ALTER TABLE t DELETE WHERE exported = 1").await.unwrap();
        assert_eq!(deleted.affected_rows, Some(5));
        assert_eq!(conn.execute("SET max_threads = 4").await.unwrap(), CommandOutcome::empty());
        drop(guard);

        assert_eq!(connector.unexported(), 0);
        assert_eq!(connector.exported(), 0);
        assert_eq!(connector.written(), 5);
        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.released(), 1);
    }

    #[tokio::test]
    async fn test_refused_connections() {
        let connector = InMemoryConnector::new();
        connector.refuse_next_connections(1);
        assert!(connector.connect().await.is_err());
        assert!(connector.connect().await.is_ok());
    }

    #[tokio::test]
    async fn test_object_store_listing_and_deletion() {
        let store = InMemoryObjectStore::new();
        store.insert("ipfix_a", Utc::now(), 1);
        store.insert("other", Utc::now(), 1);
        assert_eq!(store.list("ipfix_").await.unwrap().len(), 1);

        store.fail_deletes_for("other");
        assert!(store.delete("other").await.is_err());
        store.delete("ipfix_a").await.unwrap();
        assert_eq!(store.keys(), vec!["other"]);
    }

    #[tokio::test]
    async fn test_collecting_sink_filters_by_exact_name() {
        let sink = CollectingEventSink::new();
        sink.emit("step.started", Some(serde_json::json!({"step": "export"}))).await;
        sink.try_emit("step.started.extra", None);
        sink.try_emit("pipeline.completed", None);

        assert_eq!(
            sink.event_types(),
            vec!["step.started", "step.started.extra", "pipeline.completed"]
        );
        assert_eq!(
            sink.data_of("step.started"),
            vec![Some(serde_json::json!({"step": "export"}))]
        );
        assert_eq!(sink.data_of("pipeline.completed"), vec![None]);
    }
}
