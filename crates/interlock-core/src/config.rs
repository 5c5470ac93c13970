//! Declarative description of the monitored channels and their rules.
//!
//! Loaded from JSON, validated, then turned into a [`ChannelBank`] and the
//! condition list an [`Interlock`](crate::Interlock) is built from.

use crate::condition::Condition;
use crate::history::{ChannelBank, ChannelHistory, HistoryError};
use crate::range::Range;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("condition references unknown channel {0}")]
    UnknownChannel(String),

    #[error("duplicate channel {0}")]
    DuplicateChannel(String),

    #[error("channel {channel}: index {index} is outside width {width}")]
    IndexOutOfBounds {
        channel: String,
        index: usize,
        width: usize,
    },

    #[error("channel {channel}: invalid {which} range ({low},{high})")]
    InvalidRange {
        channel: String,
        which: &'static str,
        low: f64,
        high: f64,
    },

    #[error("channel {0}: width must be at least 1")]
    ZeroWidth(String),

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Linear conversion applied to raw instrument values, `value * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for Conversion {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
        }
    }
}

impl Conversion {
    pub fn apply(&self, raw: f64) -> f64 {
        raw * self.scale + self.offset
    }
}

/// Parameters of the simulated thermal response of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Temperature with the load off.
    pub ambient: f64,
    /// Temperature rise with the load on.
    pub load_rise: f64,
    /// First-order time constant in seconds.
    pub time_constant_s: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            ambient: 21.0,
            load_rise: 4.0,
            time_constant_s: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default = "default_width")]
    pub width: usize,
    #[serde(flatten)]
    pub conversion: Conversion,
    #[serde(default)]
    pub simulation: Option<SimulationParams>,
}

fn default_width() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub channel: String,
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub average: bool,
    #[serde(default)]
    pub running: Option<Range>,
    #[serde(default)]
    pub idle: Option<Range>,
    #[serde(default)]
    pub lockout: Option<Range>,
}

impl ConditionConfig {
    pub fn to_condition(&self) -> Condition {
        let mut condition = Condition::new(self.channel.clone())
            .index(self.index)
            .average(self.average);
        if let Some(range) = self.running {
            condition = condition.running(range);
        }
        if let Some(range) = self.idle {
            condition = condition.idle(range);
        }
        if let Some(range) = self.lockout {
            condition = condition.lockout(range);
        }
        condition
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterlockConfig {
    /// Readings kept per channel.
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    pub channels: Vec<ChannelConfig>,
    /// Decides running versus idle from its idle range.
    pub state: ConditionConfig,
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
}

fn default_history_len() -> usize {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl InterlockConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_len == 0 {
            return Err(HistoryError::ZeroCapacity("*".to_string()).into());
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !seen.insert(channel.name.as_str()) {
                return Err(ConfigError::DuplicateChannel(channel.name.clone()));
            }
            if channel.width == 0 {
                return Err(ConfigError::ZeroWidth(channel.name.clone()));
            }
        }

        for condition in std::iter::once(&self.state).chain(&self.conditions) {
            self.validate_condition(condition)?;
        }
        Ok(())
    }

    fn validate_condition(&self, condition: &ConditionConfig) -> Result<(), ConfigError> {
        let channel = self
            .channels
            .iter()
            .find(|c| c.name == condition.channel)
            .ok_or_else(|| ConfigError::UnknownChannel(condition.channel.clone()))?;

        if condition.index >= channel.width {
            return Err(ConfigError::IndexOutOfBounds {
                channel: channel.name.clone(),
                index: condition.index,
                width: channel.width,
            });
        }

        let ranges = [
            ("running", condition.running),
            ("idle", condition.idle),
            ("lockout", condition.lockout),
        ];
        for (which, range) in ranges {
            if let Some(range) = range.filter(|r| !r.is_well_formed()) {
                return Err(ConfigError::InvalidRange {
                    channel: channel.name.clone(),
                    which,
                    low: range.low,
                    high: range.high,
                });
            }
        }
        Ok(())
    }

    /// Empty histories for every configured channel.
    pub fn build_bank(&self) -> Result<ChannelBank, ConfigError> {
        let channels = self
            .channels
            .iter()
            .map(|c| ChannelHistory::new(c.name.clone(), c.width, self.history_len))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ChannelBank::with_channels(channels))
    }

    pub fn state_condition(&self) -> Condition {
        self.state.to_condition()
    }

    pub fn conditions(&self) -> Vec<Condition> {
        self.conditions.iter().map(ConditionConfig::to_condition).collect()
    }
}

impl Default for InterlockConfig {
    /// A single-input bakeout: a heater channel decides running/idle and
    /// two chamber probes are watched against it.
    fn default() -> Self {
        let probe = |name: &str, ambient: f64| ChannelConfig {
            name: name.to_string(),
            width: 1,
            conversion: Conversion::default(),
            simulation: Some(SimulationParams {
                ambient,
                load_rise: 6.0,
                time_constant_s: 20.0,
            }),
        };
        Self {
            history_len: default_history_len(),
            poll_interval_ms: default_poll_interval_ms(),
            channels: vec![
                ChannelConfig {
                    name: "Heater".to_string(),
                    width: 1,
                    conversion: Conversion::default(),
                    simulation: Some(SimulationParams {
                        ambient: 0.0,
                        load_rise: 12.0,
                        time_constant_s: 2.0,
                    }),
                },
                probe("Turbo", 21.0),
                probe("NEG", 22.0),
            ],
            state: ConditionConfig {
                channel: "Heater".to_string(),
                index: 0,
                average: false,
                running: None,
                idle: Some(Range::new(0.0, 5.0)),
                lockout: None,
            },
            conditions: vec![
                ConditionConfig {
                    channel: "Turbo".to_string(),
                    index: 0,
                    average: true,
                    running: Some(Range::new(18.0, 30.0)),
                    idle: Some(Range::new(18.0, 24.0)),
                    lockout: Some(Range::new(0.0, 45.0)),
                },
                ConditionConfig {
                    channel: "NEG".to_string(),
                    index: 0,
                    average: false,
                    running: Some(Range::new(18.0, 30.0)),
                    idle: Some(Range::new(18.0, 25.0)),
                    lockout: None,
                },
            ],
        }
    }
}
