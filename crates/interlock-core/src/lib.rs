pub mod condition;
pub mod config;
pub mod history;
pub mod interlock;
pub mod monitor;
pub mod range;
pub mod report;
#[cfg(feature = "simulation")]
pub mod sim;
pub mod source;
pub mod status;

pub use condition::Condition;
pub use config::{
    ChannelConfig, ConditionConfig, ConfigError, Conversion, InterlockConfig, SimulationParams,
};
pub use history::{ChannelBank, ChannelHistory, HistoryError, Reading};
pub use interlock::{notification_message, Interlock, NotificationOutcome, TickOutcome};
pub use monitor::{Monitor, MonitorConfig, MonitorStats};
pub use range::Range;
pub use report::{
    LockoutAction, NoopLockout, NullStatusSink, ReportError, Reporter, StatusError, StatusSink,
};
#[cfg(feature = "simulation")]
pub use sim::SimulatedLab;
pub use source::{ReadingSource, Sample, ScriptedSource, SourceError};
pub use status::StatusSnapshot;
