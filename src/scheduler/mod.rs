//! Precomputation scheduler.
//!
//! Plans and executes bulk computation of the patio x time-slot grid ahead
//! of demand, tracks per-date schedule state, and owns invalidation when
//! upstream inputs change.

pub mod precompute;

pub use precompute::PrecomputationScheduler;
