//! The periodic collect-and-push scheduler.

use std::any::Any;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crate::clock::{Clock, IntervalClock, ShutdownSignal, Tick};
use crate::collector::Collector;
use crate::config::{self, MonitoringConfig};
use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::protocol::Snapshot;
use crate::sink::Sink;

/// Tag carrying the identity of the reporting process.
pub const APP_TAG: &str = "app";

enum State {
    Idle(Box<dyn Clock>),
    Running(JoinHandle<()>),
    Stopped,
}

struct Inner {
    interval: Duration,
    app_name: String,
    sink: Arc<dyn Sink>,
    logger: RwLock<Option<Arc<dyn Logger>>>,
    collectors: RwLock<Vec<Arc<dyn Collector>>>,
    shutdown: ShutdownSignal,
    // Held for a whole collection pass; passes never overlap.
    dispatch: Mutex<()>,
    dispatcher: Mutex<Option<ThreadId>>,
}

/// Periodically collects from all registered collectors and pushes the
/// results to a sink.
///
/// A scheduler owns one worker thread once [started](Scheduler::start). On
/// every tick the worker visits the collectors in registration order, adds
/// the `app` tag and pushes each snapshot. A failing push, or a panicking
/// collector, is reported to the [`Logger`] (if any) and does not affect the
/// other collectors or later ticks.
///
/// The lifecycle is `Idle -> Running -> Stopped`. [`start`](Scheduler::start)
/// is only valid once, [`shutdown`](Scheduler::shutdown) may be called any
/// number of times and also runs on drop.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use app_monitoring::{collector_fn, Fields, Scheduler, Sink, SinkError, Snapshot, Tags};
///
/// struct StdoutSink;
///
/// impl Sink for StdoutSink {
///     fn push(&self, name: &str, tags: &Tags, fields: &Fields) -> Result<(), SinkError> {
///         println!("{name} {tags:?} {fields:?}");
///         Ok(())
///     }
/// }
///
/// let scheduler = Scheduler::new(Duration::from_secs(10), "my-app", Some(Arc::new(StdoutSink)))?;
/// scheduler.add_collector(collector_fn("queue", || Snapshot::new().with_field("depth", 3_i64)));
/// scheduler.start()?;
/// // ...
/// scheduler.shutdown();
/// # Ok::<(), app_monitoring::Error>(())
/// ```
pub struct Scheduler {
    inner: Arc<Inner>,
    state: Mutex<State>,
}

impl Scheduler {
    /// Creates an idle scheduler.
    ///
    /// Fails with [`Error::SinkMissing`] if `sink` is `None`. A zero
    /// `interval` is replaced with [`DEFAULT_INTERVAL`](crate::DEFAULT_INTERVAL).
    pub fn new(
        interval: Duration,
        app_name: impl Into<String>,
        sink: Option<Arc<dyn Sink>>,
    ) -> Result<Self> {
        let sink = sink.ok_or(Error::SinkMissing)?;

        let requested = interval;
        let interval = config::effective_interval(requested);
        if interval != requested {
            log::debug!("zero monitoring interval, using {interval:?}");
        }

        Ok(Self {
            inner: Arc::new(Inner {
                interval,
                app_name: app_name.into(),
                sink,
                logger: RwLock::new(None),
                collectors: RwLock::new(Vec::new()),
                shutdown: ShutdownSignal::new(),
                dispatch: Mutex::new(()),
                dispatcher: Mutex::new(None),
            }),
            state: Mutex::new(State::Idle(Box::new(IntervalClock::new(interval)))),
        })
    }

    /// Creates an idle scheduler from a [`MonitoringConfig`].
    pub fn from_config(config: &MonitoringConfig, sink: Option<Arc<dyn Sink>>) -> Result<Self> {
        Self::new(config.interval, config.app_name.clone(), sink)
    }

    /// Replaces the tick source.
    ///
    /// Only has an effect before [`start`](Scheduler::start).
    #[must_use]
    pub fn with_clock<C: Clock>(mut self, clock: C) -> Self {
        if let State::Idle(current) = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
        {
            *current = Box::new(clock);
        }
        self
    }

    /// Sets the logger that receives push failures.
    pub fn set_logger<L: Logger>(&self, logger: L) {
        *write(&self.inner.logger) = Some(Arc::new(logger));
    }

    /// Registers a collector.
    ///
    /// Collectors are visited in registration order. Names are not checked
    /// for uniqueness. A collector added while running is picked up on the
    /// next tick.
    pub fn add_collector<C: Collector>(&self, collector: C) {
        write(&self.inner.collectors).push(Arc::new(collector));
    }

    /// Starts the background worker.
    ///
    /// Returns [`Error::AlreadyRunning`] or [`Error::Stopped`] if the
    /// scheduler is not idle.
    pub fn start(&self) -> Result<()> {
        let mut state = self.lock_state();
        let clock = match mem::replace(&mut *state, State::Stopped) {
            State::Idle(clock) => clock,
            running @ State::Running(_) => {
                *state = running;
                return Err(Error::AlreadyRunning);
            }
            State::Stopped => return Err(Error::Stopped),
        };

        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("app-monitoring-scheduler".into())
            .spawn(move || inner.run(clock))
            .map_err(Error::Spawn)?;

        *state = State::Running(handle);
        Ok(())
    }

    /// Runs one collection pass on the calling thread.
    ///
    /// Behaves like a tick of the worker and waits for a tick in progress to
    /// finish first. Does nothing once [`shutdown`](Scheduler::shutdown) was
    /// called, or when called from inside a collector or sink.
    pub fn collect_now(&self) {
        self.inner.dispatch(true);
    }

    /// Stops the background worker.
    ///
    /// The tick in progress, if any, runs to completion; collectors are not
    /// interrupted. Unless called from a collector or sink this waits for the
    /// worker to exit and for running [`collect_now`](Scheduler::collect_now)
    /// passes, so no push happens after it returns. Calling it again does
    /// nothing.
    pub fn shutdown(&self) {
        let previous = mem::replace(&mut *self.lock_state(), State::Stopped);
        match previous {
            State::Stopped => return,
            State::Idle(_) => self.inner.shutdown.trigger(),
            State::Running(handle) => {
                self.inner.shutdown.trigger();
                // Joining from inside a pass could wait on that same pass.
                let in_pass = handle.thread().id() == thread::current().id()
                    || self.inner.is_dispatching_thread();
                if !in_pass {
                    if let Err(payload) = handle.join() {
                        log::debug!(
                            "monitoring worker panicked: {}",
                            panic_message(&*payload)
                        );
                    }
                }
            }
        }
        self.inner.wait_for_dispatch();
    }

    /// The collection interval in use.
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// The value of the `app` tag.
    pub fn app_name(&self) -> &str {
        &self.inner.app_name
    }

    /// Number of registered collectors.
    pub fn collector_count(&self) -> usize {
        read(&self.inner.collectors).len()
    }

    /// Returns true between a successful `start` and `shutdown`.
    pub fn is_running(&self) -> bool {
        matches!(*self.lock_state(), State::Running(_))
    }

    pub(crate) fn sink(&self) -> &Arc<dyn Sink> {
        &self.inner.sink
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("interval", &self.inner.interval)
            .field("app_name", &self.inner.app_name)
            .field("collectors", &self.collector_count())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Inner {
    fn run(&self, mut clock: Box<dyn Clock>) {
        log::debug!(
            "monitoring scheduler started (app: {:?}, interval: {:?})",
            self.app_name,
            self.interval
        );
        while clock.wait_tick(&self.shutdown) == Tick::Fired {
            self.dispatch(false);
        }
        log::debug!("monitoring scheduler stopped (app: {:?})", self.app_name);
    }

    fn dispatch(&self, manual: bool) {
        if self.is_dispatching_thread() {
            log::debug!("nested collection pass skipped");
            return;
        }
        let _pass = lock(&self.dispatch);
        // A worker tick that already fired still completes.
        if manual && self.shutdown.is_triggered() {
            return;
        }
        *lock(&self.dispatcher) = Some(thread::current().id());

        // Clone so collectors can be added while this tick runs.
        let collectors = read(&self.collectors).clone();
        let logger = read(&self.logger).clone();

        log::trace!("collecting from {} collectors", collectors.len());
        for collector in &collectors {
            self.dispatch_one(collector.as_ref(), logger.as_deref());
        }

        *lock(&self.dispatcher) = None;
    }

    fn is_dispatching_thread(&self) -> bool {
        *lock(&self.dispatcher) == Some(thread::current().id())
    }

    fn wait_for_dispatch(&self) {
        if !self.is_dispatching_thread() {
            drop(lock(&self.dispatch));
        }
    }

    fn dispatch_one(&self, collector: &dyn Collector, logger: Option<&dyn Logger>) {
        let name = collector.name();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let Snapshot { tags, fields } = collector.collect();
            let mut tags = tags.unwrap_or_default();
            tags.insert(APP_TAG.to_owned(), self.app_name.clone());
            self.sink.push(name, &tags, &fields)
        }));

        let Some(logger) = logger else {
            return;
        };
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => logger.warn(&format!("push[{name}]"), &[("error", &err)]),
            Err(payload) => logger.warn(
                &format!("collect[{name}]"),
                &[("panic", &panic_message(&*payload))],
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "Box<Any>"
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::collector_fn;
    use crate::config::DEFAULT_INTERVAL;
    use crate::test::{ManualClock, TestLogger, TestSink};

    fn scheduler(sink: &Arc<TestSink>) -> Scheduler {
        Scheduler::new(Duration::from_secs(60), "app", Some(sink.clone() as Arc<dyn Sink>))
            .unwrap()
    }

    #[test]
    fn test_new_requires_sink() {
        let err = Scheduler::new(Duration::from_secs(1), "", None).unwrap_err();
        assert!(matches!(err, Error::SinkMissing));
    }

    #[test]
    fn test_zero_interval_uses_default() {
        let sink = TestSink::new();
        let scheduler =
            Scheduler::new(Duration::ZERO, "", Some(sink as Arc<dyn Sink>)).unwrap();
        assert_eq!(scheduler.interval(), DEFAULT_INTERVAL);
    }

    #[test]
    fn test_collect_now_tags_and_order() {
        let sink = TestSink::new();
        let scheduler = scheduler(&sink);
        scheduler.add_collector(collector_fn("first", || {
            Snapshot::new().with_field("v", 1_i64)
        }));
        scheduler.add_collector(collector_fn("second", || {
            Snapshot::new()
                .with_tag(APP_TAG, "impostor")
                .with_tag("zone", "a")
                .with_field("v", 2_i64)
        }));

        scheduler.collect_now();

        let pushes = sink.fetch_and_clear_pushes();
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[0].name, "first");
        assert_eq!(pushes[0].tags[APP_TAG], "app");
        assert_eq!(pushes[1].name, "second");
        assert_eq!(pushes[1].tags[APP_TAG], "app");
        assert_eq!(pushes[1].tags["zone"], "a");
    }

    #[test]
    fn test_panicking_collector_is_isolated() {
        let sink = TestSink::new();
        let logger = TestLogger::new();
        let scheduler = scheduler(&sink);
        scheduler.set_logger(logger.clone());
        scheduler.add_collector(collector_fn("broken", || panic!("no data")));
        scheduler.add_collector(collector_fn("healthy", Snapshot::new));

        scheduler.collect_now();

        let names: Vec<_> = sink.pushes().into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["healthy"]);
        let warnings = logger.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0], "collect[broken] panic=no data");
    }

    #[test]
    fn test_lifecycle_state_machine() {
        let sink = TestSink::new();
        let (clock, _ticker) = ManualClock::new();
        let scheduler = scheduler(&sink).with_clock(clock);

        assert!(!scheduler.is_running());
        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(scheduler.start(), Err(Error::AlreadyRunning)));

        scheduler.shutdown();
        scheduler.shutdown();
        assert!(!scheduler.is_running());
        assert!(matches!(scheduler.start(), Err(Error::Stopped)));
    }

    #[test]
    fn test_shutdown_before_start() {
        let sink = TestSink::new();
        let scheduler = scheduler(&sink);
        scheduler.shutdown();
        assert!(matches!(scheduler.start(), Err(Error::Stopped)));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(&*payload), "Box<Any>");
    }

    #[test]
    fn test_unrepresentable_interval_keeps_worker_alive() {
        let sink = TestSink::new();
        let scheduler =
            Scheduler::new(Duration::MAX, "app", Some(sink.clone() as Arc<dyn Sink>)).unwrap();
        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(20));

        match &*scheduler.lock_state() {
            State::Running(handle) => assert!(!handle.is_finished()),
            _ => panic!("scheduler is not running"),
        }
        scheduler.shutdown();
        assert!(sink.attempts().is_empty());
    }

    #[test]
    fn test_nested_collect_now_is_skipped() {
        let sink = TestSink::new();
        let scheduler = Arc::new(scheduler(&sink));
        let weak = Arc::downgrade(&scheduler);
        scheduler.add_collector(collector_fn("outer", move || {
            if let Some(scheduler) = weak.upgrade() {
                scheduler.collect_now();
            }
            Snapshot::new()
        }));

        scheduler.collect_now();

        assert_eq!(sink.attempts(), ["outer"]);
    }
}
