use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("notification transport failed: {0}")]
    Transport(String),

    #[error("invalid notification address {address}: {reason}")]
    Address { address: String, reason: String },

    #[error("failed to build notification: {0}")]
    Build(String),
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("failed to write status: {0}")]
    Io(#[from] std::io::Error),
}

/// Notification sink for interlock warnings (e.g. email).
pub trait Reporter: Send {
    fn report(&self, message: &str) -> Result<(), ReportError>;
}

/// Persistent status store. Each write replaces the previous contents.
pub trait StatusSink: Send {
    fn write(&mut self, lines: &[String]) -> Result<(), StatusError>;
}

/// Hardware cutoff invoked on every tick that has at least one locked-out
/// channel.
pub trait LockoutAction: Send {
    fn engage(&mut self, _channels: &BTreeSet<String>) {}
}

/// Lockout hook that takes no hardware action.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLockout;

impl LockoutAction for NoopLockout {}

/// Discards status lines. Useful when no status file is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStatusSink;

impl StatusSink for NullStatusSink {
    fn write(&mut self, _lines: &[String]) -> Result<(), StatusError> {
        Ok(())
    }
}
