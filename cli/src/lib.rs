//! Command layer of the `lotto` binary, exposed as a library so the
//! integration suite can drive commands against a mock mirror.

pub mod cli;
pub mod commands;
pub mod context;
pub mod output;
