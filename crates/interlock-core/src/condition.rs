//! Per-channel range rules.
//!
//! A [`Condition`] watches one field of one channel's rolling history and
//! answers four questions about it: is the field inside a given range, is
//! the machine running (judged from the latest sample only), is the channel
//! locked out, and should it warn. A condition never owns its history; the
//! caller lends it for the duration of one evaluation.

use crate::history::ChannelHistory;
use crate::range::Range;

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    channel: String,
    index: usize,
    average: bool,
    running: Option<Range>,
    idle: Option<Range>,
    lockout: Option<Range>,
}

impl Condition {
    /// A condition on field 0 with no ranges, in all-records mode.
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            index: 0,
            average: false,
            running: None,
            idle: None,
            lockout: None,
        }
    }

    pub fn index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Compare the mean of the history instead of every record.
    pub fn average(mut self, average: bool) -> Self {
        self.average = average;
        self
    }

    pub fn running(mut self, range: Range) -> Self {
        self.running = Some(range);
        self
    }

    pub fn idle(mut self, range: Range) -> Self {
        self.idle = Some(range);
        self
    }

    pub fn lockout(mut self, range: Range) -> Self {
        self.lockout = Some(range);
        self
    }

    pub fn name(&self) -> &str {
        &self.channel
    }

    pub fn field_index(&self) -> usize {
        self.index
    }

    pub fn is_average(&self) -> bool {
        self.average
    }

    pub fn running_range(&self) -> Option<Range> {
        self.running
    }

    pub fn idle_range(&self) -> Option<Range> {
        self.idle
    }

    pub fn lockout_range(&self) -> Option<Range> {
        self.lockout
    }

    /// Whether the inspected field satisfies `range`.
    ///
    /// Average mode tests the arithmetic mean; otherwise every record must
    /// be inside. An empty history is never in range.
    pub fn in_range(&self, history: &ChannelHistory, range: Range) -> bool {
        if history.is_empty() {
            return false;
        }
        if self.average {
            match self.mean(history) {
                Some(mean) => range.contains(mean),
                None => false,
            }
        } else {
            history
                .iter()
                .all(|reading| reading.get(self.index).is_some_and(|v| range.contains(v)))
        }
    }

    /// Running means the most recent sample sits outside the idle band.
    /// Older samples are ignored.
    pub fn is_running(&self, history: &ChannelHistory) -> bool {
        let Some(idle) = self.idle else {
            return false;
        };
        match history.latest().and_then(|r| r.get(self.index)) {
            Some(value) => !idle.contains(value),
            None => false,
        }
    }

    pub fn is_lockout(&self, history: &ChannelHistory) -> bool {
        match self.lockout {
            Some(range) if !history.is_empty() => !self.in_range(history, range),
            _ => false,
        }
    }

    pub fn is_warn(&self, history: &ChannelHistory, running: bool) -> bool {
        match self.selected_range(running) {
            Some(range) if !history.is_empty() => !self.in_range(history, range),
            _ => false,
        }
    }

    /// Human-readable warning, e.g. `Turbo = 31.50 is out of range (18,22)`.
    ///
    /// An empty history renders the value as `N/A`; an absent range renders
    /// as `(N/A)`.
    pub fn warning(&self, history: &ChannelHistory, running: bool) -> String {
        let value = if history.is_empty() {
            "N/A".to_string()
        } else if self.average {
            self.mean(history)
                .map_or_else(|| "N/A".to_string(), |mean| format!("{mean:.2}"))
        } else {
            match self.span(history) {
                Some((min, max)) => format!("[{min:.2}, {max:.2}]"),
                None => "N/A".to_string(),
            }
        };

        let range = self
            .selected_range(running)
            .map_or_else(|| "(N/A)".to_string(), |r| r.to_string());

        format!("{} = {} is out of range {}", self.channel, value, range)
    }

    fn selected_range(&self, running: bool) -> Option<Range> {
        if running {
            self.running
        } else {
            self.idle
        }
    }

    fn mean(&self, history: &ChannelHistory) -> Option<f64> {
        let (sum, count) = history
            .field(self.index)
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        (count > 0).then(|| sum / count as f64)
    }

    fn span(&self, history: &ChannelHistory) -> Option<(f64, f64)> {
        history.field(self.index).fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((min, max)) => Some((f64::min(min, v), f64::max(max, v))),
        })
    }
}
