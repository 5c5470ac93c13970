use interlock_core::{ConfigError, InterlockConfig};
use labmon_io::EmailConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_STATUS_FILE: &str = "interlock_status.txt";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub config_path: Option<PathBuf>,
    pub status_path: PathBuf,
    pub poll_ms: Option<u64>,
    pub max_ticks: Option<u64>,
    pub run_seconds: Option<u64>,
    pub json_logs: bool,
    pub log_dir: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub audit_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            config_path: None,
            status_path: PathBuf::from(DEFAULT_STATUS_FILE),
            poll_ms: None,
            max_ticks: None,
            run_seconds: None,
            json_logs: false,
            log_dir: None,
            metrics_addr: None,
            audit_path: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" => {
                    if i + 1 < args.len() {
                        cfg.config_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--status-file" => {
                    if i + 1 < args.len() {
                        cfg.status_path = PathBuf::from(&args[i + 1]);
                        i += 1;
                    }
                }
                "--poll-ms" => {
                    if i + 1 < args.len() {
                        cfg.poll_ms = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--ticks" => {
                    if i + 1 < args.len() {
                        cfg.max_ticks = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--run-seconds" => {
                    if i + 1 < args.len() {
                        cfg.run_seconds = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-dir" => {
                    if i + 1 < args.len() {
                        cfg.log_dir = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--metrics-addr" => {
                    if i + 1 < args.len() {
                        cfg.metrics_addr = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--audit-log" => {
                    if i + 1 < args.len() {
                        cfg.audit_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        cfg
    }

    pub fn print_help() {
        println!(
            r#"labmon - laboratory channel monitor with interlock evaluation

USAGE:
    labmon [OPTIONS]

OPTIONS:
    --config <PATH>         JSON file describing channels, conditions and email
    --status-file <PATH>    Status snapshot written every tick [default: interlock_status.txt]
    --poll-ms <MS>          Override the configured poll interval
    --ticks <N>             Stop after N interlock ticks
    --run-seconds <SECS>    Run for a fixed duration then exit
    --json-logs             Output logs in JSON format (for log aggregation)
    --log-dir <DIR>         Also write JSON logs to a daily-rolling file in DIR
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --audit-log <PATH>      Enable audit logging to specified JSONL file
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,interlock_core=trace)
    LABMON_SMTP_PASSWORD    SMTP password when the config file does not carry one

EXAMPLES:
    # Simulated bakeout with the built-in channels
    labmon --ticks 30 --poll-ms 100

    # Production run with all observability
    labmon --config /etc/labmon/e5.json --json-logs --metrics-addr 0.0.0.0:9090 \
        --audit-log /var/log/labmon/audit.jsonl
"#
        );
    }
}

/// Contents of the `--config` file: the interlock description plus the
/// optional notification mail settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabConfig {
    #[serde(flatten)]
    pub interlock: InterlockConfig,
    #[serde(default)]
    pub email: Option<EmailConfig>,
}

impl LabConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.interlock.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("labmon")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_flags() {
        let cfg = RuntimeConfig::from_args(&args(&[
            "--config",
            "lab.json",
            "--ticks",
            "5",
            "--poll-ms",
            "20",
            "--json-logs",
            "--status-file",
            "/tmp/status.txt",
        ]));
        assert_eq!(cfg.config_path, Some(PathBuf::from("lab.json")));
        assert_eq!(cfg.max_ticks, Some(5));
        assert_eq!(cfg.poll_ms, Some(20));
        assert!(cfg.json_logs);
        assert_eq!(cfg.status_path, PathBuf::from("/tmp/status.txt"));
        assert!(!cfg.show_help);
    }

    #[test]
    fn defaults_without_flags() {
        let cfg = RuntimeConfig::from_args(&args(&[]));
        assert_eq!(cfg.status_path, PathBuf::from(DEFAULT_STATUS_FILE));
        assert!(cfg.config_path.is_none());
        assert!(cfg.metrics_addr.is_none());
    }

    #[test]
    fn help_stops_parsing() {
        let cfg = RuntimeConfig::from_args(&args(&["-h", "--ticks", "3"]));
        assert!(cfg.show_help);
        assert!(cfg.max_ticks.is_none());
    }

    #[test]
    fn lab_config_reads_email_block() {
        let config = LabConfig::from_json_str(
            r#"{
                "channels": [{"name": "Heater"}, {"name": "Turbo"}],
                "state": {"channel": "Heater", "idle": [0, 5]},
                "conditions": [{"channel": "Turbo", "running": [18, 30]}],
                "email": {
                    "server": "smtp.lab.example",
                    "sender_name": "E5 Logger",
                    "sender": "logger@lab.example",
                    "recipients": ["oncall@lab.example"]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.interlock.history_len, 10);
        assert_eq!(config.interlock.channels.len(), 2);
        let email = config.email.unwrap();
        assert_eq!(email.server, "smtp.lab.example");
        assert_eq!(email.port, 25);
    }

    #[test]
    fn lab_config_validates_interlock() {
        let err = LabConfig::from_json_str(
            r#"{
                "channels": [{"name": "Heater"}],
                "state": {"channel": "Chiller", "idle": [0, 5]}
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownChannel(name) if name == "Chiller"));
    }
}
