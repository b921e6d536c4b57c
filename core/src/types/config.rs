use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Exponential,
    Linear,
    Fixed,
}

/// Settings for one convergence run, read from `client.yaml`.
///
/// Every field has a default so a partial (or missing) file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunSettings {
    /// Default tracing directive when `RUST_LOG` is unset.
    pub log_level: String,
    /// Node attribute overrides (YAML or JSON).
    pub node_file: Option<PathBuf>,
    /// Recipes to run when neither the CLI nor the node file names any.
    pub run_list: Vec<String>,
    /// Inventory file used for peer discovery.
    pub inventory: Option<PathBuf>,
    /// Search scope for peer discovery.
    pub environment: String,
    /// Directory of `*.hbs` templates that shadow or extend the built-ins.
    pub templates_dir: Option<PathBuf>,
    pub lock_path: PathBuf,
    pub lock_timeout_ms: u64,
    /// Report what would change without touching the host.
    pub why_run: bool,
    /// Default retry budget for collaborator failures.
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub backoff_strategy: BackoffStrategy,
    /// Where to write the JSON run report, if anywhere.
    pub report_path: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            log_level: "info".into(),
            node_file: None,
            run_list: vec!["hbase::default".into()],
            inventory: None,
            environment: "_default".into(),
            templates_dir: None,
            lock_path: PathBuf::from("/var/lock/hbase-converge.lock"),
            lock_timeout_ms: 30_000,
            why_run: false,
            retries: 0,
            retry_delay_ms: 2_000,
            backoff_strategy: BackoffStrategy::Fixed,
            report_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip() {
        let settings = RunSettings {
            node_file: Some("/etc/hbase-converge/node.yaml".into()),
            run_list: vec!["hbase::default".into(), "hbase::thrift".into()],
            retries: 2,
            backoff_strategy: BackoffStrategy::Exponential,
            ..RunSettings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        let back: RunSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let back: RunSettings = serde_json::from_str(r#"{"why_run": true}"#).unwrap();
        assert!(back.why_run);
        assert_eq!(back.run_list, vec!["hbase::default".to_string()]);
        assert_eq!(back.environment, "_default");
    }

    #[test]
    fn backoff_strategy_serde() {
        let json = serde_json::to_string(&BackoffStrategy::Exponential).unwrap();
        assert_eq!(json, "\"exponential\"");
    }
}
