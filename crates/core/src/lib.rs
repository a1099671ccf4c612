//! Domain logic for the `rockscope` build and test insight tooling.
//!
//! Everything here is transient: each module parses one input (a topology
//! descriptor, a `.ninja_log`, a test log, `/proc/meminfo`), computes a small
//! aggregate and renders it. The CLI crate owns argument parsing and process
//! exit codes.

pub mod build_times;
pub mod error;
pub mod github;
pub mod html;
pub mod memory;
pub mod ninja;
pub mod path_filters;
pub mod process;
pub mod testing;
pub mod topology;

pub use error::{CoreError, CoreResult};
