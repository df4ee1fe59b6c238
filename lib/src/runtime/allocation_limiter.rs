use dashmap::DashSet;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Signal raised when a thread allocates more than allowed in one unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TooManyAllocations {
    pub ceiling: u64,
}

impl fmt::Display for TooManyAllocations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "more than {} allocations in one unit of work", self.ceiling)
    }
}

impl std::error::Error for TooManyAllocations {}

static NEXT_LIMITER_ID: AtomicUsize = AtomicUsize::new(0);

/// Ids of limiters that have not been dropped yet
fn live_limiters() -> &'static DashSet<usize> {
    static LIVE: OnceLock<DashSet<usize>> = OnceLock::new();
    LIVE.get_or_init(DashSet::new)
}

thread_local! {
    /// Per limiter: the generation the count belongs to, and the count
    static COUNTERS: RefCell<HashMap<usize, (u64, u64)>> = RefCell::new(HashMap::new());
}

/// Per-thread allocation counters, reset for every new unit of work
///
/// Counting happens without any synchronization between threads: each thread has its own
/// counter, and only notices a new unit of work the next time it counts. Counters of dropped
/// limiters are discarded by each thread the next time it starts counting for another limiter.
pub struct AllocationLimiter {
    id: usize,
    ceiling: u64,
    generation: AtomicU64,
}

impl AllocationLimiter {
    pub fn new(ceiling: u64) -> AllocationLimiter {
        let id = NEXT_LIMITER_ID.fetch_add(1, Ordering::Relaxed);
        live_limiters().insert(id);
        AllocationLimiter {
            id,
            ceiling,
            generation: AtomicU64::new(0),
        }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Start a new unit of work: every thread's count starts over
    pub fn start_unit_of_work(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one allocation on the current thread
    pub fn on_allocation(&self) -> Result<(), TooManyAllocations> {
        let generation = self.generation.load(Ordering::Relaxed);
        let count = COUNTERS.with(|counters| {
            let mut counters = counters.borrow_mut();
            if !counters.contains_key(&self.id) {
                let live = live_limiters();
                counters.retain(|id, _| live.contains(id));
            }
            let entry = counters.entry(self.id).or_insert((generation, 0));
            if entry.0 != generation {
                *entry = (generation, 0);
            }
            entry.1 += 1;
            entry.1
        });
        if count > self.ceiling {
            Err(TooManyAllocations {
                ceiling: self.ceiling,
            })
        } else {
            Ok(())
        }
    }

    /// Allocations counted so far on the current thread, in the current unit of work
    pub fn current_count(&self) -> u64 {
        let generation = self.generation.load(Ordering::Relaxed);
        COUNTERS.with(|counters| match counters.borrow().get(&self.id) {
            Some((counted_generation, count)) if *counted_generation == generation => *count,
            _ => 0,
        })
    }
}

impl Drop for AllocationLimiter {
    fn drop(&mut self) {
        live_limiters().remove(&self.id);
        let _ = COUNTERS.try_with(|counters| counters.borrow_mut().remove(&self.id));
    }
}
