//! Metrics exporter configuration types

use serde::{Deserialize, Serialize};

/// Metrics exporter section
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetricsConfig {
    /// HTTP address of the Prometheus endpoint
    pub listen: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_config_from_toml() {
        let config: MetricsConfig = toml::from_str(r#"listen = "127.0.0.1:9100""#).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9100");
    }

    #[test]
    fn test_metrics_config_requires_listen() {
        assert!(toml::from_str::<MetricsConfig>("").is_err());
    }
}
