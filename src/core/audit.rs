//! Audit trail for mutating operations
//!
//! Every successful create, edit, replace and delete appends an
//! [`AuditEntry`] describing who did what to which resource. Entries are
//! published on an [`AuditBus`] built on `tokio::sync::broadcast`, which
//! decouples the endpoint from whatever consumes the trail.
//!
//! # Usage
//!
//! ```rust,ignore
//! let bus = AuditBus::new(1024);
//! let sink = MemorySink::new();
//! bus.attach(sink.clone());
//!
//! bus.record(AuditEntry::new("create", "article", article.id).with_actor(actor.id));
//! ```

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// One line of the audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID
    pub id: Uuid,
    /// Operation action name: "create", "edit", "replace", "delete", ...
    pub action: String,
    /// Actor that performed the operation, `None` for system actions
    pub actor_id: Option<Uuid>,
    /// Resource type the operation targeted
    pub target_type: String,
    /// Resource the operation targeted
    pub target_id: Uuid,
    /// Human-readable summary
    pub message: Option<String>,
    /// Optional numeric payload, e.g. a counter delta
    pub metric_value: Option<f64>,
    /// When the operation completed
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: impl Into<String>,
        target_type: impl Into<String>,
        target_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.into(),
            actor_id: None,
            target_type: target_type.into(),
            target_id,
            message: None,
            metric_value: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_metric(mut self, value: f64) -> Self {
        self.metric_value = Some(value);
        self
    }
}

/// A destination for audit entries
pub trait AuditSink: Send + Sync {
    fn write(&self, entry: &AuditEntry);
}

/// Broadcast-based audit bus
///
/// Cheap to clone (the channel is Arc internally). Publishing is
/// fire-and-forget: with no subscribers or attached sinks the entry is
/// dropped, never blocking the request path.
#[derive(Clone)]
pub struct AuditBus {
    sender: broadcast::Sender<AuditEntry>,
    sinks: Arc<RwLock<Vec<Arc<dyn AuditSink>>>>,
}

impl AuditBus {
    /// Create a bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sinks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Attach a sink that receives every entry synchronously
    pub fn attach(&self, sink: Arc<dyn AuditSink>) {
        if let Ok(mut sinks) = self.sinks.write() {
            sinks.push(sink);
        }
    }

    /// Record an entry: write it to all sinks, then broadcast it.
    ///
    /// Returns the number of broadcast receivers that will see the entry.
    pub fn record(&self, entry: AuditEntry) -> usize {
        tracing::info!(
            action = %entry.action,
            target_type = %entry.target_type,
            target_id = %entry.target_id,
            actor_id = ?entry.actor_id,
            "audit"
        );
        if let Ok(sinks) = self.sinks.read() {
            for sink in sinks.iter() {
                sink.write(&entry);
            }
        }
        self.sender.send(entry).unwrap_or(0)
    }

    /// Subscribe to future entries
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEntry> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AuditBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for AuditBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

/// In-memory sink, mainly for tests and single-process deployments
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemorySink {
    fn write(&self, entry: &AuditEntry) {
        if let Ok(mut entries) = self.entries.write() {
            entries.push(entry.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_builder() {
        let actor = Uuid::new_v4();
        let target = Uuid::new_v4();
        let entry = AuditEntry::new("create", "article", target)
            .with_actor(actor)
            .with_message("Article created")
            .with_metric(1.0);

        assert_eq!(entry.action, "create");
        assert_eq!(entry.target_type, "article");
        assert_eq!(entry.target_id, target);
        assert_eq!(entry.actor_id, Some(actor));
        assert_eq!(entry.metric_value, Some(1.0));
        assert!(!entry.id.is_nil());
        assert!(entry.timestamp <= Utc::now());
    }

    #[test]
    fn test_entry_serialization_roundtrip() {
        let entry = AuditEntry::new("delete", "comment", Uuid::new_v4());
        let json = serde_json::to_string(&entry).unwrap();
        let back: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry.id, back.id);
        assert_eq!(back.action, "delete");
        assert_eq!(back.actor_id, None);
    }

    #[tokio::test]
    async fn test_bus_publish_subscribe() {
        let bus = AuditBus::new(16);
        let mut rx = bus.subscribe();

        let target = Uuid::new_v4();
        let receivers = bus.record(AuditEntry::new("edit", "article", target));
        assert_eq!(receivers, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.target_id, target);
        assert_eq!(received.action, "edit");
    }

    #[test]
    fn test_record_without_subscribers_does_not_panic() {
        let bus = AuditBus::new(16);
        let receivers = bus.record(AuditEntry::new("create", "article", Uuid::new_v4()));
        assert_eq!(receivers, 0);
    }

    #[test]
    fn test_memory_sink_captures_entries() {
        let bus = AuditBus::new(16);
        let sink = MemorySink::new();
        bus.attach(Arc::new(sink.clone()));

        bus.record(AuditEntry::new("create", "article", Uuid::new_v4()));
        bus.record(AuditEntry::new("delete", "article", Uuid::new_v4()));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.entries()[0].action, "create");
        assert_eq!(sink.entries()[1].action, "delete");
    }

    #[test]
    fn test_bus_clone_shares_sinks() {
        let bus = AuditBus::new(16);
        let sink = MemorySink::new();
        let bus2 = bus.clone();
        bus2.attach(Arc::new(sink.clone()));

        bus.record(AuditEntry::new("create", "tag", Uuid::new_v4()));
        assert_eq!(sink.len(), 1);
    }
}
