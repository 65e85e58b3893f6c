//! Tick sources and the shutdown signal the scheduler waits on.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A one-shot, idempotent stop signal shared between a scheduler and its
/// worker.
///
/// Triggering more than once is harmless. Waiting is done on a condvar so a
/// trigger wakes a sleeping worker immediately.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests shutdown and wakes all waiters.
    pub fn trigger(&self) {
        let (_, cvar) = self.inner.as_ref();
        *self.lock() = true;
        cvar.notify_all();
    }

    /// Returns true once [`trigger`](Self::trigger) has been called.
    pub fn is_triggered(&self) -> bool {
        *self.lock()
    }

    /// Blocks for at most `timeout` or until the signal is triggered.
    ///
    /// Returns true if the signal was triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (_, cvar) = self.inner.as_ref();
        let guard = self.lock();
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |triggered| !*triggered)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Why [`Clock::wait_tick`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// The next collection is due.
    Fired,
    /// Shutdown was requested; the worker must exit.
    Shutdown,
}

/// Decides when the scheduler's worker runs the next collection.
///
/// Implementations block until the next tick or until `shutdown` is
/// triggered. When both are ready, [`Tick::Shutdown`] must win.
pub trait Clock: Send + 'static {
    /// Waits for the next tick.
    fn wait_tick(&mut self, shutdown: &ShutdownSignal) -> Tick;
}

/// Fixed-rate ticks every `interval`.
///
/// The first tick fires one interval after the first wait. A tick that
/// is missed because collection took too long fires immediately, and the
/// schedule restarts from there instead of bursting. An interval too large
/// to be represented as an [`Instant`] never fires.
#[derive(Debug)]
pub struct IntervalClock {
    interval: Duration,
    next: Option<Instant>,
}

// Longest single condvar wait; longer waits are split.
const MAX_WAIT: Duration = Duration::from_secs(3600);

impl IntervalClock {
    /// Creates a clock ticking every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    /// The tick period.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Clock for IntervalClock {
    fn wait_tick(&mut self, shutdown: &ShutdownSignal) -> Tick {
        let deadline = match self.next {
            Some(next) => Some(next),
            None => Instant::now().checked_add(self.interval),
        };

        if wait_until(shutdown, deadline) {
            return Tick::Shutdown;
        }

        let now = Instant::now();
        self.next = deadline
            .and_then(|deadline| deadline.checked_add(self.interval))
            .filter(|next| *next > now)
            .or_else(|| now.checked_add(self.interval));
        Tick::Fired
    }
}

/// Waits for `shutdown` until `deadline`, or forever without one.
///
/// Returns true if shutdown was requested.
fn wait_until(shutdown: &ShutdownSignal, deadline: Option<Instant>) -> bool {
    loop {
        let remaining = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => MAX_WAIT,
        };
        if shutdown.wait_timeout(remaining.min(MAX_WAIT)) {
            return true;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_signal_is_idempotent() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());
        signal.trigger();
        signal.trigger();
        assert!(signal.is_triggered());
        assert!(signal.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn test_signal_wakes_waiter() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(10));
        let started = Instant::now();
        signal.trigger();

        assert!(handle.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_wait_timeout_expires() {
        let signal = ShutdownSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn test_interval_clock_fires() {
        let signal = ShutdownSignal::new();
        let mut clock = IntervalClock::new(Duration::from_millis(5));
        assert_eq!(clock.interval(), Duration::from_millis(5));

        let started = Instant::now();
        assert_eq!(clock.wait_tick(&signal), Tick::Fired);
        assert_eq!(clock.wait_tick(&signal), Tick::Fired);
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_interval_clock_prefers_shutdown() {
        let signal = ShutdownSignal::new();
        signal.trigger();

        let mut clock = IntervalClock::new(Duration::ZERO);
        assert_eq!(clock.wait_tick(&signal), Tick::Shutdown);
    }

    #[test]
    fn test_interval_clock_unrepresentable_interval() {
        let signal = ShutdownSignal::new();
        let trigger = signal.clone();
        let mut clock = IntervalClock::new(Duration::MAX);

        let handle = thread::spawn(move || clock.wait_tick(&signal));
        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());

        trigger.trigger();
        assert_eq!(handle.join().unwrap(), Tick::Shutdown);
    }
}
