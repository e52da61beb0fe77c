use super::types::Config;

use anyhow::Context;
use std::fs;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file '{}'", path.display()))?;

    load_config_from_string(&content)
        .with_context(|| format!("Failed to parse configuration file '{}'", path.display()))
}

/// Load configuration from a string
pub fn load_config_from_string(content: &str) -> anyhow::Result<Config> {
    let config: Config = toml::from_str(content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_configuration_uses_defaults() {
        let config = load_config_from_string("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.tables.data, "data");
        assert_eq!(config.store.page_size, 100);
        assert!(config.mqtt.is_none());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = load_config_from_string(
            r#"
            [tables]
            data = "telemetry"

            [mqtt]
            topics = ["plant/+/data"]
            qos = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.tables.data, "telemetry");
        assert_eq!(config.tables.config, "config");

        let mqtt = config.mqtt.unwrap();
        assert_eq!(mqtt.topics, vec!["plant/+/data"]);
        assert_eq!(mqtt.qos, 1);
        assert_eq!(mqtt.broker_url, "mqtt://localhost:1883");
        assert_eq!(mqtt.flush_interval_ms, 1000);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(load_config_from_string("[store\npath = 1").is_err());
        assert!(load_config("/nonexistent/floorwatch.toml").is_err());
    }
}
