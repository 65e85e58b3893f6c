use std::sync::Arc;
use std::time::Duration;

use crate::collectors::{RuntimeStats, RUNTIME_STATS_DATABASE, RUNTIME_STATS_NAME};
use crate::error::Result;
use crate::measurement::{Measurement, MeasurementOption};
use crate::scheduler::Scheduler;
use crate::sink::Sink;

/// Creates and starts a scheduler reporting [`RuntimeStats`].
///
/// The sink first receives a [`Measurement`] for `rust_memstats` in the
/// `rust_statistics` database with the default storage settings, after
/// `options` have been applied to it in order. The returned scheduler is
/// already running; keep it alive for as long as statistics should be
/// reported, dropping it shuts it down.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use app_monitoring::test::TestSink;
/// use app_monitoring::{init_default, queue_size, Sink};
///
/// let sink = TestSink::new();
/// let scheduler = init_default(
///     Duration::from_secs(10),
///     "billing",
///     Some(sink.clone() as Arc<dyn Sink>),
///     vec![queue_size(500)],
/// )?;
/// assert!(scheduler.is_running());
/// assert_eq!(sink.measurements()[0].queue_size, 500);
/// # Ok::<(), app_monitoring::Error>(())
/// ```
pub fn init_default<I>(
    interval: Duration,
    app_name: impl Into<String>,
    sink: Option<Arc<dyn Sink>>,
    options: I,
) -> Result<Scheduler>
where
    I: IntoIterator<Item = MeasurementOption>,
{
    let scheduler = Scheduler::new(interval, app_name, sink)?;

    let measurement =
        Measurement::new(RUNTIME_STATS_NAME, RUNTIME_STATS_DATABASE).with_options(options);
    log::debug!(
        "registering measurement {:?} in {:?}",
        measurement.name,
        measurement.database
    );
    scheduler.sink().register_measurement(&[measurement]);

    scheduler.add_collector(RuntimeStats::new());
    scheduler.start()?;

    Ok(scheduler)
}
