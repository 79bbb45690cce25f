//! Tether Metrics - boundary-crossing counters
//!
//! Counts how often each bridge operation and each engine callback crosses
//! the host/engine boundary. Useful when hunting slot leaks or chatty
//! scripts, and compiled down to nothing in production builds.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable crossing counters (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use tether_metrics::{Crossing, CrossingCounter};
//!
//! let counter = CrossingCounter::new();
//! counter.record(Crossing::Evaluate);
//! println!("evaluations: {}", counter.get(Crossing::Evaluate));
//! ```
//!
//! Without the `metrics` feature, [`CrossingCounter`] is a zero-sized stub
//! whose reads always return zero.

mod crossing;
#[cfg(feature = "metrics")]
mod counter;

pub use crossing::Crossing;
#[cfg(feature = "metrics")]
pub use counter::CrossingCounter;

// ============================================================================
// Macros for conditional compilation
// ============================================================================

/// Execute code only when the calling crate enables its `metrics` feature
#[macro_export]
macro_rules! metrics {
    ($($tt:tt)*) => {
        #[cfg(feature = "metrics")]
        {
            $($tt)*
        }
    };
}

// ============================================================================
// No-op stub when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct CrossingCounter;

#[cfg(not(feature = "metrics"))]
impl CrossingCounter {
    pub fn new() -> Self { Self }
    pub fn record(&self, _crossing: Crossing) {}
    pub fn get(&self, _crossing: Crossing) -> u64 { 0 }
    pub fn total(&self) -> u64 { 0 }
    pub fn reset(&self) {}
    pub fn iter(&self) -> impl Iterator<Item = (Crossing, u64)> + '_ {
        Crossing::ALL.iter().map(|&crossing| (crossing, 0))
    }
}
