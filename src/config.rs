use std::sync::atomic::{AtomicUsize, Ordering};
use tracing_subscriber::EnvFilter;

include!(concat!(env!("OUT_DIR"), "/tuned_constants.rs"));

/// Initial number of neighbor slots reserved per particle in a Verlet list.
pub const DEFAULT_VERLET_SLOT: usize = 128;

static BRUTE_FORCE_THRESHOLD: AtomicUsize = AtomicUsize::new(TUNED_BRUTE_FORCE_THRESHOLD);
static PARALLEL_THRESHOLD: AtomicUsize = AtomicUsize::new(TUNED_PARALLEL_THRESHOLD);
static VERLET_SLOT: AtomicUsize = AtomicUsize::new(DEFAULT_VERLET_SLOT);

/// Below this many particles the convenience API skips the cell list.
pub fn get_brute_force_threshold() -> usize {
    BRUTE_FORCE_THRESHOLD.load(Ordering::Relaxed)
}

pub fn set_brute_force_threshold(val: usize) {
    BRUTE_FORCE_THRESHOLD.store(val, Ordering::Relaxed);
}

/// Number of query particles at which Verlet construction goes parallel.
pub fn get_parallel_threshold() -> usize {
    PARALLEL_THRESHOLD.load(Ordering::Relaxed)
}

pub fn set_parallel_threshold(val: usize) {
    PARALLEL_THRESHOLD.store(val, Ordering::Relaxed);
}

pub fn get_verlet_slot() -> usize {
    VERLET_SLOT.load(Ordering::Relaxed)
}

pub fn set_verlet_slot(val: usize) {
    // A zero slot would make the first insertion relayout an empty array forever
    VERLET_SLOT.store(val.max(1), Ordering::Relaxed);
}

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` wins over `level`; a second call is a no-op.
pub fn init_logging(level: Option<&str>) {
    let default_level = level.unwrap_or("info");
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .with_thread_ids(true)
        .try_init();
}
