//! NIC queue to CPU core affinity engine.
//!
//! Given a CPU [`Topology`] and an [`InterruptTable`], computes which cores
//! should serve each receive/transmit queue of multi-queue network
//! interfaces, and decodes currently configured masks back into NUMA
//! classified core lists.
//!
//! The engine never touches the filesystem. Tables are built by the caller
//! and wrapped into an immutable [`Context`].

pub mod assign;
pub mod context;
pub mod error;
pub mod interrupts;
pub mod numa;
pub mod report;
pub mod topology;

#[cfg(test)]
mod testing;

pub use assign::{AffinityPlan, Assignment, InterfacePlan, Policy, QueueKind};
pub use context::Context;
pub use error::Error;
pub use interrupts::{InterruptTable, InterruptTableBuilder, NetInterface};
pub use numa::NumaSelector;
pub use report::{ObservedMask, ReportRow};
pub use topology::{CpuInfo, NumaSplit, Topology};
