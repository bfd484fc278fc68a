//! Append-only audit log for cluster Event objects
//!
//! Event objects describe things that happened to resources rather than
//! resources themselves, so they stay out of the graph entirely and are
//! persisted as JSON Lines instead.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Event;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One audit entry derived from a cluster Event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub count: Option<i32>,
    pub component: Option<String>,
    pub host: Option<String>,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl AuditRecord {
    /// Build a record from a cluster Event, falling back through the
    /// event's timestamp fields (eventTime, then lastTimestamp, then now)
    /// since older apiservers leave some of them unset.
    pub fn from_event(event: &Event) -> Self {
        let timestamp = event
            .event_time
            .as_ref()
            .map(|t| t.0)
            .or_else(|| event.last_timestamp.as_ref().map(|t| t.0))
            .unwrap_or_else(Utc::now);

        Self {
            timestamp,
            type_: event.type_.clone(),
            reason: event.reason.clone(),
            message: event.message.clone(),
            kind: event.involved_object.kind.clone(),
            name: event.involved_object.name.clone(),
            namespace: event.involved_object.namespace.clone(),
            count: event.count,
            component: event.source.as_ref().and_then(|s| s.component.clone()),
            host: event.source.as_ref().and_then(|s| s.host.clone()),
            first_timestamp: event.first_timestamp.as_ref().map(|t| t.0),
            last_timestamp: event.last_timestamp.as_ref().map(|t| t.0),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// JSON Lines audit log, one record per line
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Create the log under `dir` (created if missing)
    pub fn new(dir: &Path) -> Result<Self, AuditError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join("events.json"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(reason: &str) -> AuditRecord {
        AuditRecord {
            timestamp: Utc::now(),
            type_: Some("Warning".to_string()),
            reason: Some(reason.to_string()),
            message: Some("Back-off restarting failed container".to_string()),
            kind: Some("Pod".to_string()),
            name: Some("web-1".to_string()),
            namespace: Some("default".to_string()),
            count: Some(3),
            component: Some("kubelet".to_string()),
            host: Some("node-1".to_string()),
            first_timestamp: None,
            last_timestamp: None,
        }
    }

    #[test]
    fn test_append_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path()).unwrap();

        log.append(&record("BackOff")).unwrap();
        log.append(&record("Unhealthy")).unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.reason.as_deref(), Some("BackOff"));
        let second: AuditRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.reason.as_deref(), Some("Unhealthy"));
    }

    #[test]
    fn test_from_event_timestamp_fallback() {
        let event = Event {
            reason: Some("Scheduled".to_string()),
            ..Default::default()
        };
        let rec = AuditRecord::from_event(&event);
        // No eventTime/lastTimestamp set: the record still carries a time
        assert!(rec.timestamp <= Utc::now());
        assert_eq!(rec.reason.as_deref(), Some("Scheduled"));
    }
}
