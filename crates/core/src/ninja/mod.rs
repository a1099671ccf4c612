//! Ninja build log parsing and output classification.

pub mod classify;
pub mod log;

pub use classify::{classify_output, detect_phase, BuildPhase, TaskCategory, TaskClass};
pub use log::{load_ninja_log, parse_ninja_log, NinjaTask};
