use interlock_core::{ReportError, Reporter};

/// Reports notifications to the log only. Used when no email relay is
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, message: &str) -> Result<(), ReportError> {
        for line in message.lines() {
            tracing::warn!(target: "labmon::notification", "{}", line);
        }
        Ok(())
    }
}
