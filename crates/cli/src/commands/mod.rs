//! CLI command implementations

pub mod report;
pub mod samples;
pub mod status;
