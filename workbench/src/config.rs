use crate::logging::{levels, LoggingConfig};
use crate::{WorkbenchError, WorkbenchResult};
use attack_engine::IntruderConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime configuration for the workbench
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbenchConfig {
    /// Capture engine push endpoint
    pub engine_url: String,
    /// Operator REST API port
    pub http_port: u16,
    pub database_url: String,
    /// Fixed pause between push-channel connection attempts
    pub reconnect_delay_ms: u64,
    pub intruder: IntruderConfig,
    /// Outbound request timeout for repeater and intruder
    pub dispatch_timeout_secs: u64,
    pub logging: LoggingConfig,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            engine_url: "ws://127.0.0.1:8080/ws".to_string(),
            http_port: 9090,
            database_url: "sqlite:./workbench.db".to_string(),
            reconnect_delay_ms: 1000,
            intruder: IntruderConfig::default(),
            dispatch_timeout_secs: 30,
            logging: LoggingConfig::default(),
        }
    }
}

impl WorkbenchConfig {
    pub fn validate(&self) -> WorkbenchResult<()> {
        if self.engine_url.trim().is_empty() {
            return Err(WorkbenchError::configuration("engine_url must not be empty"));
        }
        if self.intruder.concurrency == 0 {
            return Err(WorkbenchError::configuration("intruder concurrency must be at least 1"));
        }
        if self.dispatch_timeout_secs == 0 {
            return Err(WorkbenchError::configuration("dispatch timeout must be at least 1 second"));
        }
        if !levels::is_valid_level(&self.logging.level) {
            return Err(WorkbenchError::configuration(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkbenchConfig::default();
        assert_eq!(config.engine_url, "ws://127.0.0.1:8080/ws");
        assert_eq!(config.http_port, 9090);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(1));
        assert_eq!(config.dispatch_timeout(), Duration::from_secs(30));
        assert_eq!(config.intruder.request_delay_ms, 100);
        assert_eq!(config.intruder.concurrency, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = WorkbenchConfig::default();
        config.intruder.concurrency = 0;
        assert!(matches!(config.validate(), Err(WorkbenchError::Configuration { .. })));

        let mut config = WorkbenchConfig::default();
        config.engine_url = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = WorkbenchConfig::default();
        config.logging.level = "chatty".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: WorkbenchConfig =
            serde_json::from_str(r#"{"http_port": 8000, "intruder": {"request_delay_ms": 0, "concurrency": 4}}"#)
                .unwrap();
        assert_eq!(config.http_port, 8000);
        assert_eq!(config.intruder.concurrency, 4);
        assert_eq!(config.engine_url, "ws://127.0.0.1:8080/ws");
    }
}
