//! End-to-end test support for the impairment emulator.
//!
//! Builds the real topology the emulator expects: two network namespaces,
//! each wired to the host through a veth pair whose host end gets enslaved
//! to one of the emulator's bridges. Traffic between the namespaces then
//! crosses the emulated link.
//!
//! # Modules
//!
//! - [`topology`]: Namespace and veth management (RAII cleanup on drop)
//! - [`harness`]: Process harness that runs the emulator binary
//! - [`test_util`]: Privilege checks and unique name generation for tests

pub mod harness;
pub mod test_util;
pub mod topology;

pub use harness::{EmulatorStack, StackOutput};
pub use test_util::{check_privileges, unique_name};
pub use topology::{Namespace, VethPair};
