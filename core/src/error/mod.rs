#[allow(clippy::module_inception)]
pub mod error;
pub mod store;

pub use error::{ConfigError, EngineError};
pub use store::StoreError;
