use crate::config::{ConfigError, Conversion, InterlockConfig};
use crate::history::{ChannelBank, Reading};
use crate::interlock::{Interlock, NotificationOutcome, TickOutcome};
use crate::source::ReadingSource;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    /// Stop after this many ticks.
    pub max_ticks: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_ticks: None,
        }
    }
}

#[derive(Clone, Default, Debug)]
pub struct MonitorStats {
    pub ticks: u64,
    pub source_errors: u64,
    pub rejected_samples: u64,
    pub notifications_sent: u64,
    pub notification_failures: u64,
    pub status_failures: u64,
    pub lockout_ticks: u64,
    pub overruns: u64,
}

/// Poll loop: samples the source, records into the channel bank and runs
/// the interlock once per tick. Ticks never overlap; the bank is only
/// mutated between interlock evaluations.
pub struct Monitor<S: ReadingSource> {
    source: S,
    bank: ChannelBank,
    interlock: Interlock,
    conversions: HashMap<String, Conversion>,
    config: MonitorConfig,
    stats: MonitorStats,
}

impl<S: ReadingSource> Monitor<S> {
    pub fn new(source: S, bank: ChannelBank, interlock: Interlock, config: MonitorConfig) -> Self {
        Self {
            source,
            bank,
            interlock,
            conversions: HashMap::new(),
            config,
            stats: MonitorStats::default(),
        }
    }

    /// Builds the bank and conversions from `config`.
    pub fn from_config(
        source: S,
        config: &InterlockConfig,
        interlock: Interlock,
    ) -> Result<Self, ConfigError> {
        let bank = config.build_bank()?;
        let monitor_config = MonitorConfig {
            poll_interval: config.poll_interval(),
            ..Default::default()
        };
        let mut monitor = Self::new(source, bank, interlock, monitor_config);
        monitor.conversions = config
            .channels
            .iter()
            .map(|c| (c.name.clone(), c.conversion))
            .collect();
        Ok(monitor)
    }

    pub fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
        self.config.max_ticks = max_ticks;
        self
    }

    /// One poll: sample, record, evaluate.
    ///
    /// A failed sample leaves the histories untouched; the interlock still
    /// runs on what it already has.
    pub fn tick(&mut self) -> TickOutcome {
        let dt_s = self.config.poll_interval.as_secs_f64();
        match self.source.sample(dt_s) {
            Ok(samples) => {
                for sample in samples {
                    let reading = self.convert(&sample.channel, sample.reading);
                    if let Err(e) = self.bank.record(&sample.channel, reading) {
                        warn!("dropping sample: {e}");
                        self.stats.rejected_samples += 1;
                    }
                }
            }
            Err(e) => {
                warn!("error reading instrument: {e}");
                self.stats.source_errors += 1;
            }
        }

        let outcome = self.interlock.check_interlock(&self.bank);
        self.account(&outcome);
        debug!(
            "tick {}: running={} lockout={} warnings={}",
            self.stats.ticks,
            outcome.running(),
            outcome.lockout(),
            outcome.status.warn_channels.len()
        );
        outcome
    }

    /// Ticks at the poll interval until `stop` is set or the tick limit is
    /// reached. `on_tick` sees the bank, the outcome and the running totals
    /// after every tick.
    pub fn run<F>(&mut self, stop: &AtomicBool, mut on_tick: F)
    where
        F: FnMut(&ChannelBank, &TickOutcome, &MonitorStats),
    {
        let mut next_tick = Instant::now();

        while !stop.load(Ordering::Relaxed) {
            if self
                .config
                .max_ticks
                .is_some_and(|max| self.stats.ticks >= max)
            {
                break;
            }

            let now = Instant::now();
            if now < next_tick {
                std::thread::sleep(next_tick - now);
            } else if now.duration_since(next_tick) > self.config.poll_interval {
                self.stats.overruns += 1;
                next_tick = now;
            }

            let outcome = self.tick();
            on_tick(&self.bank, &outcome, &self.stats);

            next_tick += self.config.poll_interval;
        }
    }

    fn convert(&self, channel: &str, reading: Reading) -> Reading {
        match self.conversions.get(channel) {
            Some(conversion) => {
                Reading::new(reading.values().iter().map(|&v| conversion.apply(v)).collect())
            }
            None => reading,
        }
    }

    fn account(&mut self, outcome: &TickOutcome) {
        self.stats.ticks += 1;
        match outcome.notification {
            NotificationOutcome::Delivered => self.stats.notifications_sent += 1,
            NotificationOutcome::Failed => self.stats.notification_failures += 1,
            NotificationOutcome::Suppressed => {}
        }
        if !outcome.status_saved {
            self.stats.status_failures += 1;
        }
        if outcome.lockout() {
            self.stats.lockout_ticks += 1;
        }
    }

    pub fn bank(&self) -> &ChannelBank {
        &self.bank
    }

    pub fn interlock(&self) -> &Interlock {
        &self.interlock
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::range::Range;
    use crate::report::{NullStatusSink, ReportError, Reporter};
    use crate::source::{Sample, ScriptedSource};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Outbox(Arc<Mutex<Vec<String>>>);

    impl Reporter for Outbox {
        fn report(&self, message: &str) -> Result<(), ReportError> {
            self.0.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    fn config() -> InterlockConfig {
        InterlockConfig::from_json_str(
            r#"{
                "history_len": 3,
                "poll_interval_ms": 1,
                "channels": [
                    {"name": "Pump"},
                    {"name": "Probe", "scale": 10.0}
                ],
                "state": {"channel": "Pump", "idle": [0, 5]},
                "conditions": [{"channel": "Probe", "running": [18, 22]}]
            }"#,
        )
        .unwrap()
    }

    fn frame(pump: f64, probe_raw: f64) -> Vec<Sample> {
        vec![Sample::new("Pump", vec![pump]), Sample::new("Probe", vec![probe_raw])]
    }

    fn monitor(frames: Vec<Vec<Sample>>, outbox: Outbox) -> Monitor<ScriptedSource> {
        let config = config();
        let interlock = Interlock::new(
            config.state_condition(),
            config.conditions(),
            Box::new(outbox),
            Box::new(NullStatusSink),
        );
        Monitor::from_config(ScriptedSource::new(frames), &config, interlock).unwrap()
    }

    #[test]
    fn applies_conversion_before_recording() {
        let mut m = monitor(vec![frame(7.0, 2.0)], Outbox::default());
        let outcome = m.tick();
        assert!(outcome.running());
        let probe = m.bank().get("Probe").unwrap();
        assert_eq!(probe.latest().and_then(|r| r.get(0)), Some(20.0));
        assert!(outcome.status.warn_channels.is_empty());
    }

    #[test]
    fn source_error_still_ticks_interlock() {
        let outbox = Outbox::default();
        let mut m = monitor(vec![frame(7.0, 3.0)], outbox.clone());
        m.tick();
        let outcome = m.tick();
        assert_eq!(m.stats().source_errors, 1);
        assert_eq!(m.stats().ticks, 2);
        assert!(outcome.status.warn_channels.contains("Probe"));
        assert_eq!(outbox.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn rejected_samples_are_counted() {
        let frames = vec![vec![
            Sample::new("Pump", vec![1.0, 2.0]),
            Sample::new("Unknown", vec![1.0]),
        ]];
        let mut m = monitor(frames, Outbox::default());
        m.tick();
        assert_eq!(m.stats().rejected_samples, 2);
        assert!(m.bank().get("Pump").unwrap().is_empty());
    }

    #[test]
    fn non_finite_sample_is_rejected_before_evaluation() {
        let outbox = Outbox::default();
        let frames = vec![frame(7.0, 2.0), frame(7.0, f64::NAN)];
        let mut m = monitor(frames, outbox.clone());
        m.tick();
        let outcome = m.tick();
        assert_eq!(m.stats().rejected_samples, 1);
        assert_eq!(m.bank().get("Probe").unwrap().len(), 1);
        assert!(outcome.status.warn_channels.is_empty());
        assert!(outbox.0.lock().unwrap().is_empty());
    }

    #[test]
    fn run_stops_at_tick_limit() {
        let frames = (0..10).map(|_| frame(7.0, 2.0)).collect();
        let mut m = monitor(frames, Outbox::default()).with_max_ticks(Some(4));
        let stop = AtomicBool::new(false);
        let mut seen = 0;
        m.run(&stop, |bank, _, _| {
            seen += 1;
            assert!(bank.get("Pump").is_some());
        });
        assert_eq!(seen, 4);
        assert_eq!(m.stats().ticks, 4);
        assert_eq!(m.source().remaining(), 6);
    }

    #[test]
    fn run_honours_stop_flag() {
        let mut m = monitor(vec![], Outbox::default());
        let stop = AtomicBool::new(true);
        m.run(&stop, |_, _, _| {
            panic!("no tick expected");
        });
        assert_eq!(m.stats().ticks, 0);
    }

    #[test]
    fn lockout_ticks_are_counted() {
        let config = config();
        let interlock = Interlock::new(
            config.state_condition(),
            vec![Condition::new("Probe").lockout(Range::new(0.0, 10.0))],
            Box::new(Outbox::default()),
            Box::new(NullStatusSink),
        );
        let mut m = Monitor::from_config(
            ScriptedSource::new(vec![frame(0.0, 5.0), frame(0.0, 0.5)]),
            &config,
            interlock,
        )
        .unwrap();
        m.tick();
        m.tick();
        // History keeps both readings (50 and 5); all-mode lockout holds.
        assert_eq!(m.stats().lockout_ticks, 2);
    }
}
