use crate::infra::audit::{AuditEventType, AuditLogger, AuditTrail};
use crate::runtime::config::{LabConfig, RuntimeConfig};
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use interlock_core::{
    ConfigError, Interlock, Monitor, MonitorStats, ReadingSource, ReportError, Reporter,
    SimulatedLab,
};
use labmon_io::{EmailConfig, FileStatusSink, LogReporter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open audit log {path}: {source}")]
    Audit {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to set up notifications: {0}")]
    Notifier(#[from] ReportError),

    #[error("monitor thread panicked")]
    MonitorPanicked,
}

pub fn run_from_args() -> Result<(), AppError> {
    let config = RuntimeConfig::from_env();
    if config.show_help {
        RuntimeConfig::print_help();
        return Ok(());
    }
    run(config).map(|_| ())
}

pub fn run(config: RuntimeConfig) -> Result<MonitorStats, AppError> {
    let _log_guard = init_tracing(config.json_logs, config.log_dir.as_deref());

    let mut lab = match &config.config_path {
        Some(path) => {
            info!(path = %path.display(), "Loading lab configuration");
            LabConfig::load(path)?
        }
        None => {
            info!("No --config given, using the built-in bakeout channels");
            LabConfig::default()
        }
    };
    if let Some(ms) = config.poll_ms {
        lab.interlock.poll_interval_ms = ms;
    }

    telemetry::init();
    let metrics_enabled = config.metrics_addr.is_some();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let audit_logger = init_audit_logger(config.audit_path.as_ref())?;
    if let Some(ref logger) = audit_logger {
        let _ = logger.log_event(
            0,
            AuditEventType::SystemStart,
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "channels": lab.interlock.channels.len(),
                "conditions": lab.interlock.conditions.len(),
                "metrics_enabled": metrics_enabled,
            }),
        );
    }

    let reporter = build_reporter(lab.email.as_ref())?;
    let status_sink = FileStatusSink::new(config.status_path.clone());
    let status_file = status_sink.path().display().to_string();
    let interlock = Interlock::new(
        lab.interlock.state_condition(),
        lab.interlock.conditions(),
        reporter,
        Box::new(status_sink),
    );
    let source = SimulatedLab::new(&lab.interlock);
    let mut monitor =
        Monitor::from_config(source, &lab.interlock, interlock)?.with_max_ticks(config.max_ticks);

    info!(
        poll_interval_ms = lab.interlock.poll_interval_ms,
        history_len = lab.interlock.history_len,
        status_file = %status_file,
        "Starting interlock monitor"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let stop_monitor = Arc::clone(&stop);
    let audit_monitor = audit_logger.clone();

    let monitor_handle = thread::spawn(move || {
        let mut trail = AuditTrail::default();
        monitor.run(&stop_monitor, |bank, outcome, stats| {
            telemetry::record_tick(bank, outcome, stats);
            if let Some(ref logger) = audit_monitor {
                for (event_type, details) in trail.events(outcome) {
                    if let Err(e) = logger.log_event(stats.ticks, event_type, details) {
                        warn!(error = %e, "Failed to write audit entry");
                    }
                }
            }
        });
        if !monitor.source().is_healthy() {
            warn!("Reading source reported unhealthy at shutdown");
        }
        monitor.stats().clone()
    });

    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        let deadline = Instant::now() + Duration::from_secs(seconds);
        while !monitor_handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        stop.store(true, Ordering::Relaxed);
    }

    let stats = monitor_handle
        .join()
        .map_err(|_| AppError::MonitorPanicked)?;

    info!(
        ticks = stats.ticks,
        source_errors = stats.source_errors,
        rejected_samples = stats.rejected_samples,
        notifications_sent = stats.notifications_sent,
        notification_failures = stats.notification_failures,
        status_failures = stats.status_failures,
        lockout_ticks = stats.lockout_ticks,
        overruns = stats.overruns,
        "Run complete"
    );

    if let Some(ref logger) = audit_logger {
        let _ = logger.log_event(
            stats.ticks,
            AuditEventType::SystemShutdown,
            serde_json::json!({
                "ticks": stats.ticks,
                "notifications_sent": stats.notifications_sent,
                "notification_failures": stats.notification_failures,
                "lockout_ticks": stats.lockout_ticks,
            }),
        );
    }

    Ok(stats)
}

#[cfg(feature = "email")]
fn build_reporter(email: Option<&EmailConfig>) -> Result<Box<dyn Reporter>, AppError> {
    match email {
        Some(email) => {
            let reporter = labmon_io::EmailReporter::new(email)?;
            info!(
                server = %email.server,
                recipients = email.recipients.len(),
                "Email notifications enabled"
            );
            Ok(Box::new(reporter))
        }
        None => {
            info!("No email configured, notifications go to the log");
            Ok(Box::new(LogReporter))
        }
    }
}

#[cfg(not(feature = "email"))]
fn build_reporter(email: Option<&EmailConfig>) -> Result<Box<dyn Reporter>, AppError> {
    if email.is_some() {
        warn!("Built without email support, notifications go to the log");
    }
    Ok(Box::new(LogReporter))
}

fn init_audit_logger(audit_path: Option<&PathBuf>) -> Result<Option<Arc<AuditLogger>>, AppError> {
    audit_path
        .map(|path| match AuditLogger::new(path) {
            Ok(logger) => {
                info!(path = %path.display(), "Audit logging enabled");
                Ok(Arc::new(logger))
            }
            Err(source) => Err(AppError::Audit {
                path: path.clone(),
                source,
            }),
        })
        .transpose()
}
