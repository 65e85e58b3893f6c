//! Measurement metadata registered with a sink up front.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retention policy for short lived runtime statistics.
pub const SHORT_TERM_RP: &str = "short_term";

/// Default number of points a sink buffers per measurement.
pub const DEFAULT_QUEUE_SIZE: usize = 100;

/// Default interval at which a sink flushes buffered points.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Describes where and how a sink should store a measurement.
///
/// How these values are interpreted is up to the [`Sink`](crate::Sink).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    /// Measurement name, matching the collector name.
    pub name: String,
    /// Target database.
    pub database: String,
    /// Retention policy inside the database.
    pub retention_policy: String,
    /// Number of points to buffer before a flush.
    pub queue_size: usize,
    /// Maximum time between flushes.
    pub flush_interval: Duration,
}

impl Measurement {
    /// Creates metadata for `name` in `database` with the default storage
    /// settings.
    pub fn new(name: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database: database.into(),
            retention_policy: SHORT_TERM_RP.to_owned(),
            queue_size: DEFAULT_QUEUE_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }

    /// Applies `options` in order; later options win on the same field.
    #[must_use]
    pub fn with_options<I>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = MeasurementOption>,
    {
        for option in options {
            option(&mut self);
        }
        self
    }
}

/// Mutates one aspect of a [`Measurement`] before it is registered.
pub type MeasurementOption = Box<dyn FnOnce(&mut Measurement) + Send>;

/// Overrides the measurement name.
pub fn measurement_name(name: impl Into<String>) -> MeasurementOption {
    let name = name.into();
    Box::new(move |m| m.name = name)
}

/// Overrides the target database.
pub fn database(database: impl Into<String>) -> MeasurementOption {
    let database = database.into();
    Box::new(move |m| m.database = database)
}

/// Overrides the retention policy.
pub fn retention_policy(policy: impl Into<String>) -> MeasurementOption {
    let policy = policy.into();
    Box::new(move |m| m.retention_policy = policy)
}

/// Overrides the queue size.
pub fn queue_size(size: usize) -> MeasurementOption {
    Box::new(move |m| m.queue_size = size)
}

/// Overrides the flush interval.
pub fn flush_interval(interval: Duration) -> MeasurementOption {
    Box::new(move |m| m.flush_interval = interval)
}
