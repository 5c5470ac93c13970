//! Prometheus metrics for labmon observability.
//!
//! This module exposes the interlock state, notification delivery and the
//! latest value of every monitored input.

use interlock_core::{ChannelBank, MonitorStats, TickOutcome};
use prometheus::{Encoder, Gauge, GaugeVec, IntCounter, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Poll Loop Metrics
// ============================================================================

/// Total interlock ticks evaluated
pub static TICKS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("labmon_ticks_total", "Total interlock ticks evaluated").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Instrument reads that returned an error
pub static SOURCE_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "labmon_source_errors_total",
        "Instrument reads that failed and left the histories unchanged",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Interlock Metrics
// ============================================================================

/// Notifications handed to the reporter successfully
pub static NOTIFICATIONS_SENT: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "labmon_notifications_sent_total",
        "Interlock notifications delivered",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Notifications the reporter failed to deliver
pub static NOTIFICATION_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "labmon_notification_failures_total",
        "Interlock notifications that failed to send",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Status snapshots that could not be persisted
pub static STATUS_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "labmon_status_write_failures_total",
        "Status snapshots that failed to persist",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Interlock engaged (1) or clear (0)
pub static LOCKOUT_ENGAGED: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "labmon_lockout_engaged",
        "Interlock lockout state (1=engaged, 0=clear)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Machine running (1) or idle (0)
pub static MACHINE_RUNNING: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "labmon_machine_running",
        "Machine state from the state condition (1=running, 0=idle)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Channels currently warning
pub static WARN_CHANNELS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new("labmon_warning_channels", "Channels currently out of range").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Channel Metrics
// ============================================================================

/// Latest converted value of every channel input
pub static CHANNEL_VALUE: LazyLock<GaugeVec> = LazyLock::new(|| {
    let gauge = GaugeVec::new(
        Opts::new("labmon_channel_value", "Latest converted value per channel input"),
        &["channel", "input"],
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Update gauges and counters after a tick.
///
/// Counters follow `stats` so that repeated calls never double count.
pub fn observe_tick(bank: &ChannelBank, outcome: &TickOutcome, stats: &MonitorStats) {
    sync_counter(&TICKS_TOTAL, stats.ticks);
    sync_counter(&SOURCE_ERRORS, stats.source_errors);
    sync_counter(&NOTIFICATIONS_SENT, stats.notifications_sent);
    sync_counter(&NOTIFICATION_FAILURES, stats.notification_failures);
    sync_counter(&STATUS_FAILURES, stats.status_failures);

    LOCKOUT_ENGAGED.set(flag(outcome.lockout()));
    MACHINE_RUNNING.set(flag(outcome.running()));
    WARN_CHANNELS.set(outcome.status.warn_channels.len() as f64);

    for history in bank.iter() {
        if let Some(latest) = history.latest() {
            for (input, value) in latest.values().iter().enumerate() {
                let input = input.to_string();
                CHANNEL_VALUE
                    .with_label_values(&[history.name(), input.as_str()])
                    .set(*value);
            }
        }
    }
}

fn sync_counter(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

fn flag(on: bool) -> f64 {
    if on {
        1.0
    } else {
        0.0
    }
}

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => match render() {
                    Ok(buffer) => {
                        let mut response = Response::from_data(buffer);
                        if let Ok(header) = tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        ) {
                            response = response.with_header(header);
                        }
                        let _ = request.respond(response);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        let _ = request.respond(
                            Response::from_string("Internal Server Error").with_status_code(500),
                        );
                    }
                },
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    // Ready once the interlock has evaluated at least one tick
                    if TICKS_TOTAL.get() > 0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Text exposition of every registered metric.
pub fn render() -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = TICKS_TOTAL.get();
    let _ = SOURCE_ERRORS.get();
    let _ = NOTIFICATIONS_SENT.get();
    let _ = NOTIFICATION_FAILURES.get();
    let _ = STATUS_FAILURES.get();
    let _ = LOCKOUT_ENGAGED.get();
    let _ = MACHINE_RUNNING.get();
    let _ = WARN_CHANNELS.get();
    LazyLock::force(&CHANNEL_VALUE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use interlock_core::{ChannelHistory, Reading, StatusSnapshot};

    #[test]
    fn exports_tick_state() {
        init_metrics();
        let mut bank =
            ChannelBank::with_channels(vec![ChannelHistory::new("Bellows", 2, 3).unwrap()]);
        bank.record("Bellows", Reading::new(vec![21.5, 22.5])).unwrap();

        let outcome = TickOutcome {
            status: StatusSnapshot {
                lockout: true,
                running: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let stats = MonitorStats {
            ticks: 3,
            ..Default::default()
        };
        observe_tick(&bank, &outcome, &stats);
        observe_tick(&bank, &outcome, &stats);

        assert_eq!(TICKS_TOTAL.get(), 3);
        assert_eq!(LOCKOUT_ENGAGED.get(), 1.0);
        assert_eq!(
            CHANNEL_VALUE.with_label_values(&["Bellows", "1"]).get(),
            22.5
        );

        let text = String::from_utf8(render().unwrap()).unwrap();
        assert!(text.contains("labmon_channel_value{channel=\"Bellows\",input=\"0\"} 21.5"));
    }
}
