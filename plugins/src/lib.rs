pub mod capability;
pub mod executor;
pub mod factory;
pub mod plan;
pub mod selector;
pub mod services;
pub mod store;
