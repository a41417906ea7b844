pub mod config;
pub mod error_registry;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error_registry::ErrorClassRegistry;
pub use errors::{ErrorKind, Result, SchedulerError};
