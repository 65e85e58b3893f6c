//! Runtime statistics collector.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::collector::Collector;
use crate::protocol::{Fields, FieldValue, Snapshot};

/// Measurement name of [`RuntimeStats`].
pub const RUNTIME_STATS_NAME: &str = "rust_memstats";

/// Database [`init_default`](crate::init_default) registers runtime
/// statistics in.
pub const RUNTIME_STATS_DATABASE: &str = "rust_statistics";

static ALLOCATED: AtomicU64 = AtomicU64::new(0);
static TOTAL_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static ALLOCATIONS: AtomicU64 = AtomicU64::new(0);
static DEALLOCATIONS: AtomicU64 = AtomicU64::new(0);

/// A global allocator that counts allocations on top of [`System`].
///
/// Install it in the application binary to get heap statistics from
/// [`RuntimeStats`]; without it the allocator counters stay at zero.
///
/// ```rust
/// use app_monitoring::CountingAllocator;
///
/// #[global_allocator]
/// static ALLOC: CountingAllocator = CountingAllocator;
/// # fn main() {}
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingAllocator;

#[inline]
fn record_alloc(size: usize) {
    let size = size as u64;
    ALLOCATED.fetch_add(size, Ordering::Relaxed);
    TOTAL_ALLOCATED.fetch_add(size, Ordering::Relaxed);
    ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
}

#[inline]
fn record_dealloc(size: usize) {
    ALLOCATED.fetch_sub(size as u64, Ordering::Relaxed);
    DEALLOCATIONS.fetch_add(1, Ordering::Relaxed);
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        record_dealloc(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            record_dealloc(layout.size());
            record_alloc(new_size);
        }
        new_ptr
    }
}

/// Counters maintained by [`CountingAllocator`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Bytes currently allocated.
    pub allocated: u64,
    /// Bytes allocated since process start.
    pub total_allocated: u64,
    /// Number of allocations since process start.
    pub allocations: u64,
    /// Number of deallocations since process start.
    pub deallocations: u64,
}

impl AllocatorStats {
    /// Number of live allocations.
    pub fn live_objects(&self) -> u64 {
        self.allocations.saturating_sub(self.deallocations)
    }
}

/// Reads the current [`CountingAllocator`] counters.
///
/// The counters are read individually and may be slightly out of sync with
/// each other under concurrent allocation.
pub fn allocator_stats() -> AllocatorStats {
    AllocatorStats {
        allocated: ALLOCATED.load(Ordering::Relaxed),
        total_allocated: TOTAL_ALLOCATED.load(Ordering::Relaxed),
        allocations: ALLOCATIONS.load(Ordering::Relaxed),
        deallocations: DEALLOCATIONS.load(Ordering::Relaxed),
    }
}

/// Collects memory statistics of the running process.
///
/// Fields reported (all integers, no tags):
/// - `alloc`, `heap_alloc` - live heap bytes
/// - `total_alloc` - cumulative heap bytes allocated
/// - `mallocs`, `frees` - cumulative allocation and deallocation counts
/// - `heap_objects` - live allocations
/// - `sys` - virtual memory size (where available)
/// - `heap_sys` - resident memory size (where available)
/// - `num_threads` - threads in the process (where available)
///
/// Heap figures come from [`CountingAllocator`], or from jemalloc with the
/// `jemalloc` feature.
#[derive(Debug, Clone)]
pub struct RuntimeStats {
    name: String,
}

impl RuntimeStats {
    /// Creates the collector under [`RUNTIME_STATS_NAME`].
    pub fn new() -> Self {
        Self::with_name(RUNTIME_STATS_NAME)
    }

    /// Creates the collector under a custom measurement name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for RuntimeStats {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for RuntimeStats {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self) -> Snapshot {
        let stats = allocator_stats();
        let mut fields = Fields::new();

        fields.insert("alloc".into(), FieldValue::from(stats.allocated));
        fields.insert("total_alloc".into(), FieldValue::from(stats.total_allocated));
        fields.insert("mallocs".into(), FieldValue::from(stats.allocations));
        fields.insert("frees".into(), FieldValue::from(stats.deallocations));
        fields.insert("heap_alloc".into(), FieldValue::from(stats.allocated));
        fields.insert("heap_objects".into(), FieldValue::from(stats.live_objects()));

        if let Some((virtual_bytes, resident_bytes)) = get_memory_bytes() {
            if let Some(virtual_bytes) = virtual_bytes {
                fields.insert("sys".into(), FieldValue::Int(virtual_bytes));
            }
            fields.insert("heap_sys".into(), FieldValue::Int(resident_bytes));
        }

        #[cfg(all(unix, feature = "jemalloc"))]
        {
            if let Some((allocated, resident)) = get_jemalloc_stats() {
                fields.insert("heap_alloc".into(), FieldValue::Int(allocated));
                fields.insert("heap_sys".into(), FieldValue::Int(resident));
            }
        }

        if let Some(threads) = get_thread_count() {
            fields.insert("num_threads".into(), FieldValue::Int(threads));
        }

        Snapshot::from_fields(fields)
    }
}

/// Gets the (virtual, resident) memory size in bytes.
#[cfg(target_os = "linux")]
fn get_memory_bytes() -> Option<(Option<i64>, i64)> {
    use std::fs;

    // Format: size resident shared text lib data dt, in pages
    let statm = fs::read_to_string("/proc/self/statm").ok()?;
    let mut parts = statm.split_whitespace();
    let size_pages: i64 = parts.next()?.parse().ok()?;
    let resident_pages: i64 = parts.next()?.parse().ok()?;

    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as i64;
    Some((Some(size_pages * page_size), resident_pages * page_size))
}

/// Gets the (virtual, resident) memory size in bytes.
#[cfg(target_os = "macos")]
fn get_memory_bytes() -> Option<(Option<i64>, i64)> {
    use std::mem;

    unsafe {
        let mut info: libc::rusage = mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut info) == 0 {
            // ru_maxrss is in bytes on macOS
            Some((None, info.ru_maxrss))
        } else {
            None
        }
    }
}

/// Gets the (virtual, resident) memory size in bytes.
#[cfg(target_os = "windows")]
fn get_memory_bytes() -> Option<(Option<i64>, i64)> {
    use windows_sys::Win32::System::ProcessStatus::{
        GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS,
    };
    use windows_sys::Win32::System::Threading::GetCurrentProcess;

    unsafe {
        let process = GetCurrentProcess();
        let size = std::mem::size_of::<PROCESS_MEMORY_COUNTERS>() as u32;
        let mut pmc: PROCESS_MEMORY_COUNTERS = std::mem::zeroed();
        pmc.cb = size;

        if GetProcessMemoryInfo(process, &mut pmc, size) != 0 {
            Some((
                Some(pmc.PagefileUsage as i64),
                pmc.WorkingSetSize as i64,
            ))
        } else {
            None
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn get_memory_bytes() -> Option<(Option<i64>, i64)> {
    None
}

/// Gets the number of threads in the current process.
#[cfg(target_os = "linux")]
fn get_thread_count() -> Option<i64> {
    let entries = std::fs::read_dir("/proc/self/task").ok()?;
    Some(entries.count() as i64)
}

// Thread counts need mach or toolhelp snapshot APIs elsewhere.
#[cfg(not(target_os = "linux"))]
fn get_thread_count() -> Option<i64> {
    None
}

/// Gets jemalloc (allocated, resident) bytes.
#[cfg(all(unix, feature = "jemalloc"))]
fn get_jemalloc_stats() -> Option<(i64, i64)> {
    use tikv_jemalloc_ctl::{epoch, stats};

    // Advance the epoch to get fresh stats
    epoch::advance().ok()?;

    let allocated = stats::allocated::read().ok()? as i64;
    let resident = stats::resident::read().ok()? as i64;

    Some((allocated, resident))
}
