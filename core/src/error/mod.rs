#[allow(clippy::module_inception)]
pub mod error;
pub mod code;
pub mod executor;
pub mod store;
pub mod task;

pub use code::ErrorCode;
pub use error::CliError;
pub use executor::ExecutorError;
pub use store::StoreError;
pub use task::TaskError;
