//! Dependency-graph task scheduler.
//!
//! Tasks are registered with a [`manager::TaskManager`], which hands a run-set
//! to the [`executor::WaveScheduler`]. Capabilities, reasoning models and
//! stores are injected through [`context::Services`].

pub mod api;
pub mod capability;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod manager;
pub mod store;
pub mod task;
