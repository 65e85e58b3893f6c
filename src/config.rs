//! Configuration for a [`Scheduler`](crate::Scheduler).

use std::env;
use std::time::Duration;

/// Interval used when none, or a zero interval, is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Environment variable holding the collection interval in milliseconds.
pub const INTERVAL_ENV: &str = "MONITORING_INTERVAL_MS";

/// Environment variable holding the identity tag value.
pub const APP_NAME_ENV: &str = "MONITORING_APP_NAME";

/// Scheduler settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitoringConfig {
    /// How often to collect and push.
    ///
    /// Default: 1 second. A zero interval is replaced by the default.
    pub interval: Duration,

    /// Value of the `app` tag attached to every measurement.
    ///
    /// Default: empty
    pub app_name: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            app_name: String::new(),
        }
    }
}

impl MonitoringConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the default configuration overridden by the environment.
    ///
    /// See [`apply_env`](Self::apply_env).
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Overrides values from `MONITORING_INTERVAL_MS` and
    /// `MONITORING_APP_NAME` where they are set.
    ///
    /// An interval that does not parse as milliseconds is ignored.
    #[must_use]
    pub fn apply_env(mut self) -> Self {
        if let Some(interval) = env::var(INTERVAL_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.interval = Duration::from_millis(interval);
        }
        if let Ok(app_name) = env::var(APP_NAME_ENV) {
            self.app_name = app_name;
        }
        self
    }

    /// Sets the collection interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the identity tag value.
    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// The interval the scheduler will actually use.
    pub fn effective_interval(&self) -> Duration {
        effective_interval(self.interval)
    }
}

/// Replaces a zero interval with [`DEFAULT_INTERVAL`].
pub(crate) fn effective_interval(interval: Duration) -> Duration {
    if interval.is_zero() {
        DEFAULT_INTERVAL
    } else {
        interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitoringConfig::new();
        assert_eq!(config.interval, DEFAULT_INTERVAL);
        assert_eq!(config.app_name, "");
    }

    #[test]
    fn test_builder() {
        let config = MonitoringConfig::new()
            .with_interval(Duration::from_millis(250))
            .with_app_name("billing");
        assert_eq!(config.effective_interval(), Duration::from_millis(250));
        assert_eq!(config.app_name, "billing");
    }

    #[test]
    fn test_zero_interval_falls_back() {
        let config = MonitoringConfig::new().with_interval(Duration::ZERO);
        assert_eq!(config.effective_interval(), DEFAULT_INTERVAL);
    }

    // The only test touching these variables, so no other test races it.
    #[test]
    fn test_apply_env() {
        env::set_var(INTERVAL_ENV, "250");
        env::set_var(APP_NAME_ENV, "from-env");
        let config = MonitoringConfig::from_env();
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.app_name, "from-env");

        env::set_var(INTERVAL_ENV, "soon");
        let config = MonitoringConfig::new().apply_env();
        assert_eq!(config.interval, DEFAULT_INTERVAL);

        env::remove_var(INTERVAL_ENV);
        env::remove_var(APP_NAME_ENV);
    }
}
