pub mod config;
pub mod config_loader;
pub mod error;
pub mod retry;
pub mod telemetry;
pub mod traits;

pub use config::*;
pub use config_loader::{ConfigLoadOptions, ConfigLoader, ConfigValidationResult};
pub use error::*;
pub use retry::*;
pub use traits::*;
