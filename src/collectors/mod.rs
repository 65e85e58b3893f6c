//! Built-in collectors.
//!
//! - [`RuntimeStats`]: allocator, memory and thread statistics of the
//!   current process, reported as `rust_memstats`.

mod runtime;

pub use runtime::{
    allocator_stats, AllocatorStats, CountingAllocator, RuntimeStats, RUNTIME_STATS_DATABASE,
    RUNTIME_STATS_NAME,
};
