use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Interlock state as persisted after every tick.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub lockout: bool,
    pub running: bool,
    pub lockout_channels: BTreeSet<String>,
    pub warn_channels: BTreeSet<String>,
}

impl StatusSnapshot {
    /// Text layout of the status file:
    ///
    /// ```text
    /// Interlock: ENGAGED      (only when locked out)
    /// Lockout: A, B           (only when locked out)
    /// Status: running|idle
    /// Warnings: C, D          (may be empty)
    /// ```
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(4);
        if self.lockout {
            lines.push("Interlock: ENGAGED".to_string());
            lines.push(format!("Lockout: {}", join(&self.lockout_channels)));
        }
        lines.push(status_line(self.running).to_string());
        lines.push(format!("Warnings: {}", join(&self.warn_channels)));
        lines
    }
}

pub(crate) fn status_line(running: bool) -> &'static str {
    if running {
        "Status: running"
    } else {
        "Status: idle"
    }
}

pub(crate) fn join(names: &BTreeSet<String>) -> String {
    names
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn engaged_layout() {
        let snapshot = StatusSnapshot {
            lockout: true,
            running: true,
            lockout_channels: set(&["A"]),
            warn_channels: set(&[]),
        };
        assert_eq!(
            snapshot.lines(),
            vec!["Interlock: ENGAGED", "Lockout: A", "Status: running", "Warnings: "]
        );
    }

    #[test]
    fn idle_layout_joins_sorted_names() {
        let snapshot = StatusSnapshot {
            lockout: false,
            running: false,
            lockout_channels: set(&[]),
            warn_channels: set(&["Turbo", "NEG"]),
        };
        assert_eq!(snapshot.lines(), vec!["Status: idle", "Warnings: NEG, Turbo"]);
    }
}
