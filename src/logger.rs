//! Reporting of push failures.

use std::fmt::{self, Write};
use std::sync::Arc;

/// Receives warnings about measurements that could not be delivered.
///
/// Without a logger the scheduler drops these failures silently.
pub trait Logger: Send + Sync + 'static {
    /// Emits a warning with structured key/value context.
    fn warn(&self, message: &str, fields: &[(&str, &dyn fmt::Display)]);
}

impl<L: Logger + ?Sized> Logger for Arc<L> {
    fn warn(&self, message: &str, fields: &[(&str, &dyn fmt::Display)]) {
        (**self).warn(message, fields)
    }
}

/// A [`Logger`] that forwards warnings to the `log` crate.
///
/// Fields are appended to the message as `key=value` pairs.
///
/// # Examples
///
/// ```
/// use app_monitoring::{LogLogger, Logger};
///
/// let logger = LogLogger::new();
/// logger.warn("push[cpu]", &[("error", &"connection refused")]);
/// ```
#[derive(Clone, Debug)]
pub struct LogLogger {
    target: &'static str,
}

impl LogLogger {
    /// Creates a logger writing to the `app_monitoring` target.
    pub fn new() -> Self {
        Self::with_target("app_monitoring")
    }

    /// Creates a logger writing to a custom `log` target.
    pub fn with_target(target: &'static str) -> Self {
        Self { target }
    }
}

impl Default for LogLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for LogLogger {
    fn warn(&self, message: &str, fields: &[(&str, &dyn fmt::Display)]) {
        log::warn!(target: self.target, "{}", format_fields(message, fields));
    }
}

pub(crate) fn format_fields(message: &str, fields: &[(&str, &dyn fmt::Display)]) -> String {
    let mut line = message.to_owned();
    for (key, value) in fields {
        let _ = write!(line, " {key}={value}");
    }
    line
}
