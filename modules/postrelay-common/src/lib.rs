pub mod types;
pub mod config;
pub mod error;

pub use types::*;
pub use config::AppConfig;
pub use error::RelayError;
