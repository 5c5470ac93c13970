use crate::history::Reading;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("instrument returned no data")]
    NoData,

    #[error("malformed instrument response: {0}")]
    Malformed(String),

    #[error("instrument I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One reading destined for the named channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub channel: String,
    pub reading: Reading,
}

impl Sample {
    pub fn new(channel: impl Into<String>, reading: impl Into<Reading>) -> Self {
        Self {
            channel: channel.into(),
            reading: reading.into(),
        }
    }
}

/// Anything that yields one reading per channel per poll.
pub trait ReadingSource: Send {
    /// Advance by `dt_s` seconds and read every channel.
    fn sample(&mut self, dt_s: f64) -> Result<Vec<Sample>, SourceError>;

    fn is_healthy(&self) -> bool {
        true
    }
}

/// Replays prepared frames in order, then reports [`SourceError::NoData`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    frames: std::collections::VecDeque<Vec<Sample>>,
}

impl ScriptedSource {
    pub fn new(frames: impl IntoIterator<Item = Vec<Sample>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl ReadingSource for ScriptedSource {
    fn sample(&mut self, _dt_s: f64) -> Result<Vec<Sample>, SourceError> {
        self.frames.pop_front().ok_or(SourceError::NoData)
    }

    fn is_healthy(&self) -> bool {
        !self.frames.is_empty()
    }
}
