//! tapshaper library
//!
//! A user-space link impairment emulator. Two TAP interfaces, each bridged
//! to a physical segment, are joined through per-direction pipelines that
//! impose a bandwidth ceiling, a one-way propagation delay, and a
//! Bernoulli loss probability. Parameters are mutated live from a console
//! listener or replayed from a scripted timeline.

// Use mimalloc as the global allocator for tests (non-Windows only)
#[cfg(not(windows))]
#[cfg(test)]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod bridge;
pub mod endpoint;
pub mod frame;
pub mod link;
pub mod queue;
pub mod repl;
pub mod scenario;
pub mod script;
pub mod shaper;
pub mod stats;
pub mod tap;
pub mod utils;
pub mod worker;

// Test helpers module - available when test-internals feature is enabled
#[cfg(any(test, feature = "test-internals"))]
pub mod test_helpers;

#[cfg(test)]
pub mod tests;

// Re-export commonly used items
pub use endpoint::TapEndpoint;
pub use frame::{Frame, MAX_FRAME_LEN};
pub use link::{Bandwidth, LinkConfig, LinkSnapshot};
pub use queue::{Admission, DelayQueue, MAX_QUEUE};
pub use scenario::{NetworkEvent, ScenarioControls, ScenarioDriver};
pub use shaper::LinkShaper;
pub use stats::EmulatorStats;
pub use tap::TapDevice;
pub use utils::{now_ms, now_us};
