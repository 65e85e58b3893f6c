//! This crate periodically collects in-process measurements and forwards
//! them to a time-series sink.
//!
//! # Core Concepts
//!
//! A [`Scheduler`] owns a set of [`Collector`]s. Once started, a background
//! thread wakes up every interval, asks each collector for a [`Snapshot`] of
//! tags and fields, stamps it with an `app` tag identifying the process and
//! pushes it to a [`Sink`]. Push failures never stop the loop; they are
//! reported to an optional [`Logger`] and the collector is asked again on the
//! next tick.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use app_monitoring::{collector_fn, Fields, LogLogger, Scheduler, Sink, SinkError, Snapshot, Tags};
//!
//! struct Stdout;
//!
//! impl Sink for Stdout {
//!     fn push(&self, name: &str, tags: &Tags, fields: &Fields) -> Result<(), SinkError> {
//!         println!("{name} {tags:?} {fields:?}");
//!         Ok(())
//!     }
//! }
//!
//! let scheduler = Scheduler::new(Duration::from_secs(5), "billing", Some(Arc::new(Stdout)))?;
//! scheduler.set_logger(LogLogger::new());
//! scheduler.add_collector(collector_fn("invoices", || {
//!     Snapshot::new().with_tag("region", "eu").with_field("pending", 12_i64)
//! }));
//! scheduler.start()?;
//! # Ok::<(), app_monitoring::Error>(())
//! ```
//!
//! [`init_default`] wires up the built-in [`RuntimeStats`] collector and
//! registers its storage [`Measurement`] with the sink in one call.
//!
//! # Runtime statistics
//!
//! Heap figures of [`RuntimeStats`] come from the [`CountingAllocator`],
//! which an application installs as its `#[global_allocator]`. Process
//! memory and thread counts are read from the operating system.
//!
//! # Features
//!
//! - `feature = "test"`: Activates the [`test`] module with a capturing sink,
//!   a capturing logger and a manually driven clock.
//! - `feature = "jemalloc"`: Reports heap figures from jemalloc on Unix.
//!
//! [`test`]: test/index.html

#![warn(missing_docs)]

mod clock;
mod collector;
pub mod collectors;
mod config;
mod error;
mod init;
mod logger;
mod measurement;
mod protocol;
mod scheduler;
mod sink;

pub use crate::clock::{Clock, IntervalClock, ShutdownSignal, Tick};
pub use crate::collector::{collector_fn, Collector, FnCollector};
pub use crate::collectors::{
    allocator_stats, AllocatorStats, CountingAllocator, RuntimeStats, RUNTIME_STATS_DATABASE,
    RUNTIME_STATS_NAME,
};
pub use crate::config::{MonitoringConfig, APP_NAME_ENV, DEFAULT_INTERVAL, INTERVAL_ENV};
pub use crate::error::{Error, Result};
pub use crate::init::init_default;
pub use crate::logger::{LogLogger, Logger};
pub use crate::measurement::{
    database, flush_interval, measurement_name, queue_size, retention_policy, Measurement,
    MeasurementOption, DEFAULT_FLUSH_INTERVAL, DEFAULT_QUEUE_SIZE, SHORT_TERM_RP,
};
pub use crate::protocol::{FieldValue, Fields, Snapshot, Tags};
pub use crate::scheduler::{Scheduler, APP_TAG};
pub use crate::sink::{Sink, SinkError};


#[cfg(test)]
#[global_allocator]
static ALLOC: CountingAllocator = CountingAllocator;
