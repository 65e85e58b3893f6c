//! Collector trait and the closure adapter.

use std::fmt;
use std::sync::Arc;

use crate::protocol::Snapshot;

/// A named source of measurements.
///
/// The scheduler calls [`collect`](Collector::collect) once per tick and
/// pushes the result to the sink under [`name`](Collector::name).
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use app_monitoring::{Collector, Snapshot};
///
/// struct ConnectionPoolCollector {
///     active: AtomicUsize,
/// }
///
/// impl Collector for ConnectionPoolCollector {
///     fn name(&self) -> &str {
///         "db_pool"
///     }
///
///     fn collect(&self) -> Snapshot {
///         Snapshot::new()
///             .with_tag("pool", "main")
///             .with_field("active", self.active.load(Ordering::Relaxed))
///     }
/// }
/// ```
pub trait Collector: Send + Sync + 'static {
    /// Measurement name used when pushing to the sink.
    ///
    /// Must not change after construction.
    fn name(&self) -> &str;

    /// Takes a fresh reading.
    ///
    /// There is no error channel: a collector that cannot measure returns a
    /// snapshot without fields. A collector instance may be registered with
    /// several schedulers, so internal state must be synchronized.
    fn collect(&self) -> Snapshot;
}

impl<C: Collector + ?Sized> Collector for Arc<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn collect(&self) -> Snapshot {
        (**self).collect()
    }
}

/// A [`Collector`] backed by a closure.
pub struct FnCollector<F> {
    name: String,
    collect: F,
}

impl<F> FnCollector<F>
where
    F: Fn() -> Snapshot + Send + Sync + 'static,
{
    /// Creates a collector named `name` that delegates to `collect`.
    pub fn new(name: impl Into<String>, collect: F) -> Self {
        Self {
            name: name.into(),
            collect,
        }
    }
}

impl<F> Collector for FnCollector<F>
where
    F: Fn() -> Snapshot + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self) -> Snapshot {
        (self.collect)()
    }
}

impl<F> fmt::Debug for FnCollector<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCollector")
            .field("name", &self.name)
            .finish()
    }
}

/// Shortcut for [`FnCollector::new`].
///
/// ```rust
/// use app_monitoring::{collector_fn, Collector, Snapshot};
///
/// let collector = collector_fn("queue", || Snapshot::new().with_field("depth", 3_i64));
/// assert_eq!(collector.name(), "queue");
/// ```
pub fn collector_fn<F>(name: impl Into<String>, collect: F) -> FnCollector<F>
where
    F: Fn() -> Snapshot + Send + Sync + 'static,
{
    FnCollector::new(name, collect)
}
