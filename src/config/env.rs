//! Environment Settings
//!
//! Values supplied by the host environment and validated strictly. The
//! lookup is passed in as a closure; [`from_env`](RetentionPolicy::from_env)
//! style constructors read the process environment.

use crate::error::EnvError;
use crate::util::string_to_int;

pub const DATA_RETENTION_HOURS: &str = "DATA_RETENTION_HOURS";
pub const VERBOSE_LOGGING: &str = "VERBOSE_LOGGING";
pub const SEND_USAGE_DATA: &str = "SEND_USAGE_DATA";

pub const MINIMUM_RETENTION_HOURS: i64 = 24;

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// How long persisted observations are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    hours: i64,
}

impl RetentionPolicy {
    pub fn new(hours: i64) -> Result<Self, EnvError> {
        if hours < MINIMUM_RETENTION_HOURS {
            return Err(EnvError::BelowMinimum {
                value: hours,
                minimum: MINIMUM_RETENTION_HOURS,
            });
        }
        Ok(Self { hours })
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, EnvError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = lookup(DATA_RETENTION_HOURS).ok_or_else(|| EnvError::Missing {
            name: DATA_RETENTION_HOURS.to_string(),
        })?;

        let hours = string_to_int(&raw, MINIMUM_RETENTION_HOURS).map_err(|e| EnvError::Invalid {
            name: DATA_RETENTION_HOURS.to_string(),
            source: Box::new(e),
        })?;

        Ok(Self { hours })
    }

    pub fn from_env() -> Result<Self, EnvError> {
        Self::from_lookup(process_env)
    }

    pub fn hours(&self) -> i64 {
        self.hours
    }

    /// Expiry time for an item written at `timestamp`.
    pub fn ttl(&self, timestamp: i64) -> i64 {
        timestamp.saturating_add(self.hours.saturating_mul(3600))
    }
}

/// `Yes`/`No` switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeToggles {
    pub verbose_logging: bool,
    pub send_usage_data: bool,
}

impl RuntimeToggles {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EnvError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            verbose_logging: toggle(&lookup, VERBOSE_LOGGING)?,
            send_usage_data: toggle(&lookup, SEND_USAGE_DATA)?,
        })
    }

    pub fn from_env() -> Result<Self, EnvError> {
        Self::from_lookup(process_env)
    }
}

/// Unset means `No`.
fn toggle<F>(lookup: &F, name: &str) -> Result<bool, EnvError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).as_deref() {
        None | Some("No") => Ok(false),
        Some("Yes") => Ok(true),
        Some(other) => Err(EnvError::InvalidToggle {
            name: name.to_string(),
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_retention_from_lookup() {
        let policy = RetentionPolicy::from_lookup(lookup(&[(DATA_RETENTION_HOURS, "48")])).unwrap();
        assert_eq!(policy.hours(), 48);
        assert_eq!(policy.ttl(1_000), 1_000 + 48 * 3600);
    }

    #[test]
    fn test_retention_rejects_invalid_values() {
        let missing = RetentionPolicy::from_lookup(lookup(&[]));
        assert!(matches!(missing, Err(EnvError::Missing { .. })));

        for raw in ["", "24 ", "abc", "10", "-48"] {
            let result = RetentionPolicy::from_lookup(lookup(&[(DATA_RETENTION_HOURS, raw)]));
            assert!(matches!(result, Err(EnvError::Invalid { .. })), "accepted {raw:?}");
        }

        assert!(RetentionPolicy::new(23).is_err());
        assert!(RetentionPolicy::new(24).is_ok());
    }

    #[test]
    fn test_toggles_default_to_no() {
        assert_eq!(RuntimeToggles::from_lookup(lookup(&[])).unwrap(), RuntimeToggles::default());

        let toggles = RuntimeToggles::from_lookup(lookup(&[(VERBOSE_LOGGING, "Yes"), (SEND_USAGE_DATA, "No")])).unwrap();
        assert!(toggles.verbose_logging);
        assert!(!toggles.send_usage_data);
    }

    #[test]
    fn test_toggles_are_strict() {
        let result = RuntimeToggles::from_lookup(lookup(&[(SEND_USAGE_DATA, "yes")]));
        assert_eq!(
            result,
            Err(EnvError::InvalidToggle {
                name: SEND_USAGE_DATA.to_string(),
                value: "yes".to_string()
            })
        );
    }
}
