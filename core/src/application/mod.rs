// SPDX-License-Identifier: MIT
//! Orchestration: the Tool Handler call algorithm, prerequisite probing,
//! and fault isolation around every invocation.

pub mod fault_isolator;
pub mod prerequisite_prober;
pub mod registry;
pub mod tool_handler;

pub use fault_isolator::{isolate, isolate_entrypoint};
pub use prerequisite_prober::{PrerequisiteProber, Unmet};
pub use registry::{ToolInfo, ToolRegistry};
pub use tool_handler::{ToolHandler, DIRECT_CALL_DEFAULT_TIMEOUT};
