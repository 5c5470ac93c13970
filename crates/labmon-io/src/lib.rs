pub mod email;
pub mod log_reporter;
pub mod metrics;
pub mod status_file;

#[cfg(feature = "email")]
pub use email::EmailReporter;
pub use email::{EmailConfig, SmtpSecurity};
pub use log_reporter::LogReporter;
pub use metrics::{init_metrics, observe_tick, serve_metrics};
pub use status_file::FileStatusSink;
