//! Lifecycle configuration: defaults, environment overrides, CLI overrides.
//!
//! Read once at controller initialization; nothing here is runtime-mutable.

use std::time::Duration;

use anyhow::Context;

use swlife_core::install::DISMISSAL_COOLDOWN_MS;
use swlife_core::presentation::{DEFAULT_BANNER_TIMEOUT_MS, DEFAULT_DEV_RELOAD_DELAY_MS};
use swlife_core::{Environment, PresenterTiming};
use swlife_platform::{DEFAULT_SCOPE, DEFAULT_SCRIPT_URL, DISMISSAL_KEY};

/// Default period of the explicit worker re-check.
pub const DEFAULT_RECHECK_INTERVAL_SECS: u64 = 60;

pub const ENV_ENVIRONMENT: &str = "SWLIFE_ENV";
pub const ENV_RECHECK_SECS: &str = "SWLIFE_RECHECK_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub script_url: String,
    pub scope: String,
    pub recheck_interval: Duration,
    pub dev_reload_delay: Duration,
    pub banner_timeout: Duration,
    pub dismissal_cooldown: Duration,
    pub dismissal_key: String,
    pub environment: Environment,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            script_url: DEFAULT_SCRIPT_URL.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            recheck_interval: Duration::from_secs(DEFAULT_RECHECK_INTERVAL_SECS),
            dev_reload_delay: Duration::from_millis(DEFAULT_DEV_RELOAD_DELAY_MS as u64),
            banner_timeout: Duration::from_millis(DEFAULT_BANNER_TIMEOUT_MS as u64),
            dismissal_cooldown: Duration::from_millis(DISMISSAL_COOLDOWN_MS as u64),
            dismissal_key: DISMISSAL_KEY.to_string(),
            environment: Environment::from_build(),
        }
    }
}

impl LifecycleConfig {
    /// Defaults overridden by `SWLIFE_ENV` and `SWLIFE_RECHECK_SECS`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_ENVIRONMENT) {
            config.environment = raw
                .parse::<Environment>()
                .with_context(|| format!("{ENV_ENVIRONMENT}={raw}"))?;
        }

        if let Some(raw) = lookup(ENV_RECHECK_SECS) {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_RECHECK_SECS}={raw}"))?;
            if secs == 0 {
                anyhow::bail!("{ENV_RECHECK_SECS} must be at least 1 second");
            }
            config.recheck_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn presenter_timing(&self) -> PresenterTiming {
        PresenterTiming {
            banner_timeout_ms: duration_ms(self.banner_timeout),
            dev_reload_delay_ms: duration_ms(self.dev_reload_delay),
        }
    }

    pub fn dismissal_cooldown_ms(&self) -> i64 {
        duration_ms(self.dismissal_cooldown)
    }
}

fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let c = LifecycleConfig::default();
        assert_eq!(c.script_url, "/sw.js");
        assert_eq!(c.scope, "/");
        assert_eq!(c.recheck_interval, Duration::from_secs(60));
        assert_eq!(c.banner_timeout, Duration::from_secs(10));
        assert_eq!(c.dismissal_cooldown, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(c.dismissal_key, "pwa-install-dismissed");
    }

    #[test]
    fn env_overrides() {
        let c = LifecycleConfig::from_lookup(lookup(&[
            ("SWLIFE_ENV", "production"),
            ("SWLIFE_RECHECK_SECS", "15"),
        ]))
        .expect("config");
        assert_eq!(c.environment, Environment::Production);
        assert_eq!(c.recheck_interval, Duration::from_secs(15));
    }

    #[test]
    fn invalid_env_values_rejected() {
        assert!(LifecycleConfig::from_lookup(lookup(&[("SWLIFE_ENV", "staging")])).is_err());
        assert!(LifecycleConfig::from_lookup(lookup(&[("SWLIFE_RECHECK_SECS", "soon")])).is_err());
        assert!(LifecycleConfig::from_lookup(lookup(&[("SWLIFE_RECHECK_SECS", "0")])).is_err());
    }

    #[test]
    fn presenter_timing_in_millis() {
        let t = LifecycleConfig::default().presenter_timing();
        assert_eq!(t.banner_timeout_ms, 10_000);
        assert_eq!(t.dev_reload_delay_ms, 1_500);
        assert_eq!(LifecycleConfig::default().dismissal_cooldown_ms(), DISMISSAL_COOLDOWN_MS);
    }
}
