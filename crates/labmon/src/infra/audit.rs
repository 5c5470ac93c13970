//! Audit trail for interlock events.
//!
//! Every state change an operator may need to reconstruct later (warning
//! set changes, lockout transitions, failed status writes, start and stop)
//! is appended as one JSON object per line.

use interlock_core::{NotificationOutcome, TickOutcome};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Types of events that are logged in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SystemStart,
    SystemShutdown,
    /// The set of warning channels changed and a notification was attempted
    WarningSetChanged,
    LockoutEngaged,
    LockoutCleared,
    StatusWriteFailed,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Interlock tick the event belongs to (0 before the first tick)
    pub tick: u64,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    pub event_type: AuditEventType,
    /// Additional event-specific details
    pub details: serde_json::Value,
}

/// Thread-safe audit logger that writes to a JSONL file
pub struct AuditLogger {
    writer: Mutex<BufWriter<File>>,
}

impl AuditLogger {
    /// Create a new audit logger writing to the specified path.
    /// The file is opened in append mode to preserve existing logs.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
        })
    }

    pub fn log(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("audit writer poisoned"))?;
        serde_json::to_writer(&mut *writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    pub fn log_event(
        &self,
        tick: u64,
        event_type: AuditEventType,
        details: serde_json::Value,
    ) -> std::io::Result<()> {
        self.log(&AuditEntry {
            tick,
            unix_us: unix_us(),
            event_type,
            details,
        })
    }
}

fn unix_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Derives audit events from consecutive tick outcomes.
#[derive(Debug, Default)]
pub struct AuditTrail {
    lockout: bool,
}

impl AuditTrail {
    /// Events worth recording for this tick, given what was seen before.
    pub fn events(&mut self, outcome: &TickOutcome) -> Vec<(AuditEventType, serde_json::Value)> {
        let mut events = Vec::new();
        let status = &outcome.status;

        if outcome.notification != NotificationOutcome::Suppressed {
            events.push((
                AuditEventType::WarningSetChanged,
                serde_json::json!({
                    "warn_channels": status.warn_channels,
                    "running": status.running,
                    "delivered": outcome.notification == NotificationOutcome::Delivered,
                }),
            ));
        }

        if status.lockout != self.lockout {
            let event_type = if status.lockout {
                AuditEventType::LockoutEngaged
            } else {
                AuditEventType::LockoutCleared
            };
            events.push((
                event_type,
                serde_json::json!({ "lockout_channels": status.lockout_channels }),
            ));
            self.lockout = status.lockout;
        }

        if !outcome.status_saved {
            events.push((AuditEventType::StatusWriteFailed, serde_json::Value::Null));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interlock_core::StatusSnapshot;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_audit_logger_writes_jsonl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.jsonl");

        let logger = AuditLogger::new(&path).unwrap();
        logger
            .log_event(
                0,
                AuditEventType::SystemStart,
                serde_json::json!({"version": "0.1.0"}),
            )
            .unwrap();
        logger
            .log_event(
                7,
                AuditEventType::LockoutEngaged,
                serde_json::json!({"lockout_channels": ["Turbo"]}),
            )
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.trim().split('\n').collect();
        assert_eq!(lines.len(), 2);

        let first: AuditEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.event_type, AuditEventType::SystemStart);
        assert!(first.unix_us > 0);

        let second: AuditEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.tick, 7);
        assert!(lines[1].contains("\"lockout_engaged\""));
    }

    #[test]
    fn trail_reports_transitions_once() {
        let mut trail = AuditTrail::default();
        let engaged = TickOutcome {
            status: StatusSnapshot {
                lockout: true,
                running: true,
                lockout_channels: names(&["Turbo"]),
                warn_channels: names(&["Turbo"]),
            },
            warnings: vec!["Turbo = 50.00 is out of range (18,30)".to_string()],
            notification: NotificationOutcome::Delivered,
            status_saved: true,
        };

        let kinds: Vec<_> = trail.events(&engaged).into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![AuditEventType::WarningSetChanged, AuditEventType::LockoutEngaged]
        );

        let repeat = TickOutcome {
            notification: NotificationOutcome::Suppressed,
            ..engaged.clone()
        };
        assert!(trail.events(&repeat).is_empty());

        let cleared = TickOutcome {
            status: StatusSnapshot::default(),
            warnings: Vec::new(),
            notification: NotificationOutcome::Failed,
            status_saved: false,
        };
        let kinds: Vec<_> = trail.events(&cleared).into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![
                AuditEventType::WarningSetChanged,
                AuditEventType::LockoutCleared,
                AuditEventType::StatusWriteFailed,
            ]
        );
    }
}
