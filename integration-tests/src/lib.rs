//! Shared fixtures for the end-to-end command-flow tests.

pub mod support;
