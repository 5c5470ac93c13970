//! Tick-driven interlock evaluation.
//!
//! Every tick the interlock re-derives the whole state from the channel
//! histories: running/idle from the state condition, then lockout and
//! warning membership for every condition. State is level-triggered; only
//! the notification is debounced, and it fires when the set of warning
//! channels differs from the previous tick's set. The status snapshot is
//! written on every tick.

use crate::condition::Condition;
use crate::history::{ChannelBank, ChannelHistory};
use crate::report::{LockoutAction, NoopLockout, Reporter, StatusSink};
use crate::status::{status_line, StatusSnapshot};
use log::{debug, error, warn};
use std::collections::BTreeSet;

/// What happened to the notification on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationOutcome {
    /// Warning set unchanged since the previous tick.
    #[default]
    Suppressed,
    Delivered,
    Failed,
}

/// Summary of one [`Interlock::check_interlock`] call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickOutcome {
    pub status: StatusSnapshot,
    /// Warning texts in condition order.
    pub warnings: Vec<String>,
    pub notification: NotificationOutcome,
    pub status_saved: bool,
}

impl TickOutcome {
    pub fn running(&self) -> bool {
        self.status.running
    }

    pub fn lockout(&self) -> bool {
        self.status.lockout
    }
}

pub struct Interlock {
    state_condition: Condition,
    conditions: Vec<Condition>,
    reporter: Box<dyn Reporter>,
    status_sink: Box<dyn StatusSink>,
    lockout_action: Box<dyn LockoutAction>,
    last_warn_channels: BTreeSet<String>,
    was_running: bool,
}

impl Interlock {
    /// The state condition is evaluated after `conditions`, as the last
    /// monitored condition.
    pub fn new(
        state_condition: Condition,
        mut conditions: Vec<Condition>,
        reporter: Box<dyn Reporter>,
        status_sink: Box<dyn StatusSink>,
    ) -> Self {
        conditions.push(state_condition.clone());
        Self {
            state_condition,
            conditions,
            reporter,
            status_sink,
            lockout_action: Box::new(NoopLockout),
            last_warn_channels: BTreeSet::new(),
            was_running: false,
        }
    }

    pub fn with_lockout_action(mut self, action: Box<dyn LockoutAction>) -> Self {
        self.lockout_action = action;
        self
    }

    pub fn state_condition(&self) -> &Condition {
        &self.state_condition
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn last_warn_channels(&self) -> &BTreeSet<String> {
        &self.last_warn_channels
    }

    /// Running state seen on the previous tick. Informational only.
    pub fn was_running(&self) -> bool {
        self.was_running
    }

    /// Evaluates one tick. Never fails: reporter and status sink errors are
    /// logged and reflected in the returned outcome.
    pub fn check_interlock(&mut self, bank: &ChannelBank) -> TickOutcome {
        let running = history_of(bank, &self.state_condition)
            .is_some_and(|h| self.state_condition.is_running(h));

        let mut lockout = false;
        let mut lockout_channels = BTreeSet::new();
        let mut warn_channels = BTreeSet::new();
        let mut warnings = Vec::new();

        for condition in &self.conditions {
            let Some(history) = history_of(bank, condition) else {
                continue;
            };

            if condition.is_lockout(history) {
                lockout = true;
                lockout_channels.insert(condition.name().to_string());
            }

            if condition.is_warn(history, running) {
                warn_channels.insert(condition.name().to_string());
                warnings.push(condition.warning(history, running));
            }
        }

        if lockout {
            self.trigger_lockout(&lockout_channels);
        }

        let notification = if warn_channels != self.last_warn_channels {
            debug!(
                "warning set changed: {:?} -> {:?}",
                self.last_warn_channels, warn_channels
            );
            self.send_warning(&warnings, lockout, running, &warn_channels)
        } else {
            NotificationOutcome::Suppressed
        };

        self.last_warn_channels = warn_channels.clone();
        self.was_running = running;

        let status = StatusSnapshot {
            lockout,
            running,
            lockout_channels,
            warn_channels,
        };
        let status_saved = self.save_status(&status);

        TickOutcome {
            status,
            warnings,
            notification,
            status_saved,
        }
    }

    fn trigger_lockout(&mut self, channels: &BTreeSet<String>) {
        error!("interlock engaged by {:?}", channels);
        self.lockout_action.engage(channels);
    }

    fn send_warning(
        &self,
        warnings: &[String],
        lockout: bool,
        running: bool,
        warn_channels: &BTreeSet<String>,
    ) -> NotificationOutcome {
        let message = notification_message(warnings, lockout, running, warn_channels);
        match self.reporter.report(&message) {
            Ok(()) => NotificationOutcome::Delivered,
            Err(e) => {
                warn!("error sending interlock warning: {e}");
                NotificationOutcome::Failed
            }
        }
    }

    fn save_status(&mut self, status: &StatusSnapshot) -> bool {
        match self.status_sink.write(&status.lines()) {
            Ok(()) => true,
            Err(e) => {
                warn!("error saving interlock status: {e}");
                false
            }
        }
    }
}

fn history_of<'a>(bank: &'a ChannelBank, condition: &Condition) -> Option<&'a ChannelHistory> {
    bank.get(condition.name())
}

/// Notification body:
///
/// ```text
/// Interlock: ENGAGED!     (only when locked out)
/// Status: running|idle
/// Warnings:
/// \t<warning>             (one per warning)
/// ```
///
/// or `Warnings: N/A` when no channel is warning.
pub fn notification_message(
    warnings: &[String],
    lockout: bool,
    running: bool,
    warn_channels: &BTreeSet<String>,
) -> String {
    let mut lines = Vec::with_capacity(warnings.len() + 3);
    if lockout {
        lines.push("Interlock: ENGAGED!".to_string());
    }
    lines.push(status_line(running).to_string());
    if warn_channels.is_empty() {
        lines.push("Warnings: N/A".to_string());
    } else {
        lines.push("Warnings: ".to_string());
        lines.extend(warnings.iter().map(|w| format!("\t{w}")));
    }
    lines.join("\n")
}
