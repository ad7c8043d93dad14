//! taskwave-cli library: exposes the command implementations for unit tests.

pub mod commands;
