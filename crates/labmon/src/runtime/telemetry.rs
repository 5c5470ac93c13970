use interlock_core::{ChannelBank, MonitorStats, TickOutcome};
use labmon_io::{init_metrics, observe_tick, serve_metrics};
use std::thread;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Push one tick into the exported gauges and counters.
pub fn record_tick(bank: &ChannelBank, outcome: &TickOutcome, stats: &MonitorStats) {
    observe_tick(bank, outcome, stats);
}
