//! MQTT Batch Source
//!
//! Subscribes to the configured topics and groups incoming publishes into
//! batches of raw records. A batch is handed out when it reaches
//! `batch_size`, when `flush_interval_ms` passes with records pending, or
//! when Ctrl-C is received.

use super::RawRecord;
use crate::config::MqttConfig;

use anyhow::anyhow;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::time::{Duration, Instant};

pub struct MqttBatchSource {
    config: MqttConfig,
    client: AsyncClient,
    eventloop: EventLoop,
    stopped: bool,
}

/// Parse broker URL into host and port
pub fn parse_broker_url(url: &str) -> anyhow::Result<(String, u16)> {
    let clean_url = url.strip_prefix("mqtt://").unwrap_or(url);

    match clean_url.split_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| anyhow!("Invalid port in broker URL: {}", url))?;
            Ok((host.to_string(), port))
        }
        None => Ok((clean_url.to_string(), 1883)),
    }
}

fn qos(level: u8) -> QoS {
    match level {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

impl MqttBatchSource {
    pub async fn connect(config: &MqttConfig) -> anyhow::Result<Self> {
        let (host, port) = parse_broker_url(&config.broker_url)?;

        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("floorwatch_{}", uuid::Uuid::new_v4()));

        let mut options = MqttOptions::new(&client_id, host, port);
        options.set_clean_session(config.clean_session);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(options, 10);

        for topic in &config.topics {
            client
                .subscribe(topic, qos(config.qos))
                .await
                .map_err(|e| anyhow!("Failed to subscribe to topic '{}': {}", topic, e))?;
            tracing::info!("Subscribed to MQTT topic: {} (QoS: {})", topic, config.qos);
        }

        tracing::info!("MQTT source '{}' initialised", client_id);

        Ok(Self {
            config: config.clone(),
            client,
            eventloop,
            stopped: false,
        })
    }

    /// True once a shutdown signal has been received.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Waits for the next batch. After shutdown the pending records are
    /// returned, possibly empty, and [`is_stopped`](Self::is_stopped) turns true.
    pub async fn next_batch(&mut self) -> Vec<RawRecord> {
        let interval = Duration::from_millis(self.config.flush_interval_ms.max(1));
        let mut records = Vec::with_capacity(self.config.batch_size);

        let deadline = tokio::time::sleep(interval);
        tokio::pin!(deadline);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        tracing::debug!("MQTT '{}' payload of {} bytes", publish.topic, publish.payload.len());
                        records.push(RawRecord::encode(&publish.payload));
                        if records.len() >= self.config.batch_size {
                            return records;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("MQTT connection error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                },
                _ = &mut deadline => {
                    if !records.is_empty() {
                        return records;
                    }
                    deadline.as_mut().reset(Instant::now() + interval);
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, flushing {} pending records", records.len());
                    self.stopped = true;
                    if let Err(e) = self.client.disconnect().await {
                        tracing::warn!("MQTT disconnect failed: {}", e);
                    }
                    return records;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broker_url() {
        assert_eq!(parse_broker_url("mqtt://broker:1884").unwrap(), ("broker".to_string(), 1884));
        assert_eq!(parse_broker_url("localhost").unwrap(), ("localhost".to_string(), 1883));
        assert!(parse_broker_url("mqtt://broker:notaport").is_err());
    }

    #[test]
    fn test_qos_levels() {
        assert_eq!(qos(0), QoS::AtMostOnce);
        assert_eq!(qos(1), QoS::AtLeastOnce);
        assert_eq!(qos(2), QoS::ExactlyOnce);
    }
}
