//! Engine settings

use serde::{Deserialize, Serialize};

/// Limits applied to the QuickJS runtime at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Heap limit in bytes. Zero leaves the heap unbounded.
    pub memory_limit: usize,
    /// Script stack limit in bytes. Zero disables the check.
    pub max_stack_size: usize,
    /// Allocation volume that triggers an automatic collection.
    pub gc_threshold: usize,
    /// Script arrays nested deeper than this reach the host as an error.
    pub max_array_depth: usize,
    /// Script arrays longer than this reach the host as an error. Script
    /// can declare an array of any length without allocating it, so the
    /// copy is bounded before anything is allocated.
    pub max_array_length: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            memory_limit: 0,
            max_stack_size: 1024 * 1024,
            gc_threshold: 256 * 1024,
            max_array_depth: 64,
            max_array_length: 1 << 20,
        }
    }
}
