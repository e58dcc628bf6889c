//! Process memory introspection and pressure-driven eviction.

mod governor;

pub use governor::{Depressurizable, MemoryGovernor, MemoryGovernorConfig, MemoryStats};
