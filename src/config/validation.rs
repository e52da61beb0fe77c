use super::types::Config;

pub fn validate_config(config: &Config) -> Result<(), String> {
    if config.store.page_size == 0 {
        return Err("Store page size must be at least 1".into());
    }

    let tables = [&config.tables.config, &config.tables.ui_reference, &config.tables.data];
    if tables.iter().any(|name| name.trim().is_empty()) {
        return Err("Table names cannot be empty".into());
    }
    if config.tables.data == config.tables.config || config.tables.data == config.tables.ui_reference {
        return Err(format!("Data table '{}' must not share a name with a configuration table", config.tables.data));
    }

    if let Some(mqtt) = &config.mqtt {
        if mqtt.qos > 2 {
            return Err("QoS must be between 0 and 2".into());
        }
        if mqtt.broker_url.is_empty() {
            return Err("Broker URL cannot be empty".into());
        }
        if mqtt.topics.is_empty() {
            return Err("At least one topic must be specified".into());
        }
        if mqtt.batch_size == 0 {
            return Err("MQTT batch size must be at least 1".into());
        }
    }

    Ok(())
}
