pub mod file;

pub use file::{JsonFileTaskStore, JsonlContextStore};
