//! Stores consulted by the helper calls that passes inject into rewritten classes
//!
//! Rewritten code calls back into the host for a couple of things: looking up the current value
//! of a hot-swappable constant (see [`ConstantRemapper`]) and counting allocations (see
//! [`AllocationLimiter`]). These are explicit stores, shared by reference with whatever bridges
//! the helper calls, rather than process-wide singletons.

mod allocation_limiter;
mod constant_remapper;

pub use allocation_limiter::*;
pub use constant_remapper::*;
