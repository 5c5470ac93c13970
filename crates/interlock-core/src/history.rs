use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistoryError {
    #[error("channel {channel}: reading has {actual} values, expected {expected}")]
    WidthMismatch {
        channel: String,
        expected: usize,
        actual: usize,
    },

    #[error("channel {0}: history capacity must be at least 1")]
    ZeroCapacity(String),

    #[error("unknown channel {0}")]
    UnknownChannel(String),

    #[error("channel {channel}: input {index} is not a finite number ({value})")]
    NonFinite {
        channel: String,
        index: usize,
        value: f64,
    },
}

/// One sample of a channel: a value per multiplexed input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reading {
    values: Vec<f64>,
}

impl Reading {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn single(value: f64) -> Self {
        Self {
            values: vec![value],
        }
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn width(&self) -> usize {
        self.values.len()
    }
}

impl From<Vec<f64>> for Reading {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

/// Bounded rolling history of one channel, oldest reading first.
#[derive(Debug, Clone)]
pub struct ChannelHistory {
    name: String,
    width: usize,
    capacity: usize,
    readings: VecDeque<Reading>,
}

impl ChannelHistory {
    pub fn new(
        name: impl Into<String>,
        width: usize,
        capacity: usize,
    ) -> Result<Self, HistoryError> {
        let name = name.into();
        if capacity == 0 {
            return Err(HistoryError::ZeroCapacity(name));
        }
        Ok(Self {
            name,
            width,
            capacity,
            readings: VecDeque::with_capacity(capacity),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Appends a reading, evicting the oldest one once full.
    pub fn push(&mut self, reading: Reading) -> Result<(), HistoryError> {
        if reading.width() != self.width {
            return Err(HistoryError::WidthMismatch {
                channel: self.name.clone(),
                expected: self.width,
                actual: reading.width(),
            });
        }
        if let Some((index, &value)) = reading
            .values()
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite())
        {
            return Err(HistoryError::NonFinite {
                channel: self.name.clone(),
                index,
                value,
            });
        }
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
        Ok(())
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    /// Field `index` of every reading, oldest first.
    pub fn field(&self, index: usize) -> impl Iterator<Item = f64> + '_ {
        self.readings.iter().filter_map(move |r| r.get(index))
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }
}

/// All channel histories of one installation, in declaration order.
///
/// The bank is mutated between ticks only; the interlock borrows it
/// read-only for the duration of a tick.
#[derive(Debug, Clone, Default)]
pub struct ChannelBank {
    channels: Vec<ChannelHistory>,
}

impl ChannelBank {
    pub fn with_channels(channels: Vec<ChannelHistory>) -> Self {
        Self { channels }
    }

    pub fn get(&self, name: &str) -> Option<&ChannelHistory> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ChannelHistory> {
        self.channels.iter_mut().find(|c| c.name == name)
    }

    pub fn record(&mut self, channel: &str, reading: Reading) -> Result<(), HistoryError> {
        self.get_mut(channel)
            .ok_or_else(|| HistoryError::UnknownChannel(channel.to_string()))?
            .push(reading)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelHistory> {
        self.channels.iter()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let mut history = ChannelHistory::new("Turbo", 1, 3).unwrap();
        for v in [1.0, 2.0, 3.0, 4.0] {
            history.push(Reading::single(v)).unwrap();
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.field(0).collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert_eq!(history.latest().and_then(|r| r.get(0)), Some(4.0));
    }

    #[test]
    fn rejects_width_mismatch() {
        let mut history = ChannelHistory::new("Bellows", 2, 4).unwrap();
        let err = history.push(Reading::single(1.0)).unwrap_err();
        assert_eq!(
            err,
            HistoryError::WidthMismatch {
                channel: "Bellows".into(),
                expected: 2,
                actual: 1
            }
        );
        assert!(history.is_empty());
    }

    #[test]
    fn rejects_non_finite_inputs() {
        let mut history = ChannelHistory::new("Turbo", 2, 4).unwrap();
        history.push(Reading::new(vec![20.0, 21.0])).unwrap();
        let err = history.push(Reading::new(vec![20.5, f64::NAN])).unwrap_err();
        assert!(matches!(
            err,
            HistoryError::NonFinite { ref channel, index: 1, .. } if channel == "Turbo"
        ));
        assert!(history
            .push(Reading::new(vec![f64::INFINITY, 20.0]))
            .is_err());
        assert_eq!(history.len(), 1);
        assert_eq!(history.field(1).collect::<Vec<_>>(), vec![21.0]);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            ChannelHistory::new("NEG", 1, 0),
            Err(HistoryError::ZeroCapacity(_))
        ));
    }

    #[test]
    fn bank_records_by_name() {
        let mut bank = ChannelBank::with_channels(vec![
            ChannelHistory::new("A", 1, 2).unwrap(),
            ChannelHistory::new("B", 1, 2).unwrap(),
        ]);
        bank.record("B", Reading::single(7.0)).unwrap();
        assert!(bank.get("A").unwrap().is_empty());
        assert_eq!(bank.get("B").unwrap().len(), 1);
        assert!(matches!(
            bank.record("C", Reading::single(1.0)),
            Err(HistoryError::UnknownChannel(_))
        ));
    }
}
