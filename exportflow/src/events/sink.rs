//! Event sink trait and implementations.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Trait for sinks that receive pipeline lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    ///
    /// `event_type` is one of the constants in [`super::names`]; `data`
    /// carries the step name and position where relevant.
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Emits an event without awaiting. Must never fail.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// A sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// A sink that logs each transition at debug level, lifting the pipeline
/// and step names out of the event data into their own fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

impl LoggingEventSink {
    fn log_event(event_type: &str, data: Option<&Value>) {
        let field = |key: &str| {
            data.and_then(|d| d.get(key))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let pipeline = field("pipeline");
        let step = field("step");
        let data = data.map(Value::to_string).unwrap_or_default();
        debug!(event = event_type, pipeline = %pipeline, step = %step, data = %data, "pipeline event");
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        Self::log_event(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        Self::log_event(event_type, data.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_noop_and_logging_sinks_accept_any_data() {
        NoOpEventSink.emit("step.started", None).await;
        NoOpEventSink.try_emit("step.started", Some(json!({"step": "dbt-build"})));

        LoggingEventSink
            .emit("step.completed", Some(json!({"step": "dbt-build", "attempts": 1})))
            .await;
        LoggingEventSink.try_emit("pipeline.completed", Some(json!({"pipeline": "analytics"})));
        LoggingEventSink.try_emit("step.retrying", Some(json!({"step": 3})));
        LoggingEventSink.try_emit("pipeline.started", None);
    }
}
