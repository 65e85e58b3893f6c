//! The destination measurements are pushed to.

use std::sync::Arc;

use crate::measurement::Measurement;
use crate::protocol::{Fields, Tags};

/// Error returned by a failed [`Sink::push`].
pub type SinkError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A time-series store that accepts measurements.
///
/// The scheduler calls [`push`](Sink::push) from its worker thread, and the
/// same sink may be shared by several schedulers, so implementations must be
/// thread safe. Pushes are fire-and-forget: a failed push is logged and the
/// point is dropped.
pub trait Sink: Send + Sync + 'static {
    /// Registers storage metadata for measurements ahead of the first push.
    ///
    /// May be called any number of times. The default implementation ignores
    /// the metadata.
    fn register_measurement(&self, measurements: &[Measurement]) {
        let _ = measurements;
    }

    /// Writes one measurement.
    fn push(&self, name: &str, tags: &Tags, fields: &Fields) -> Result<(), SinkError>;
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn register_measurement(&self, measurements: &[Measurement]) {
        (**self).register_measurement(measurements)
    }

    fn push(&self, name: &str, tags: &Tags, fields: &Fields) -> Result<(), SinkError> {
        (**self).push(name, tags, fields)
    }
}
