pub mod code_exec;
pub mod factory;
pub mod file_ops;
pub mod web_search;

pub use code_exec::CodeExecutionPlugin;
pub use factory::default_registry;
pub use file_ops::FileOperationsPlugin;
pub use web_search::{SearchProvider, WebSearchPlugin};
