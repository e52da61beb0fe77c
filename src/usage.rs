//! Usage Signals
//!
//! Best-effort anonymous telemetry. Reporting never fails the caller.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "camelCase")]
pub enum UsageSignal {
    #[serde(rename_all = "camelCase")]
    BatchProcessed {
        records: usize,
        observations: usize,
        formats: usize,
        machine_configs: usize,
    },
    ConfigurationChanged {
        kind: String,
    },
    GroupingChanged,
    MachineNameChanged,
}

#[async_trait]
pub trait UsageReporter: Send + Sync {
    async fn report(&self, signal: UsageSignal);
}

/// Writes signals to the log when usage reporting is switched on.
pub struct LogUsageReporter {
    enabled: bool,
}

impl LogUsageReporter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl UsageReporter for LogUsageReporter {
    async fn report(&self, signal: UsageSignal) {
        if !self.enabled {
            return;
        }

        match serde_json::to_string(&signal) {
            Ok(json) => tracing::info!(target: "usage", "{}", json),
            Err(e) => tracing::debug!("Dropping usage signal {:?}: {}", signal, e),
        }
    }
}

/// Keeps every reported signal in memory.
#[derive(Default)]
pub struct CollectingReporter {
    signals: Mutex<Vec<UsageSignal>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Vec<UsageSignal> {
        match self.signals.lock() {
            Ok(signals) => signals.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl UsageReporter for CollectingReporter {
    async fn report(&self, signal: UsageSignal) {
        match self.signals.lock() {
            Ok(mut signals) => signals.push(signal),
            Err(poisoned) => poisoned.into_inner().push(signal),
        }
    }
}
