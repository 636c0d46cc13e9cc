pub mod config;
pub mod error;
pub mod state;
pub mod types;

pub use config::TraceVaultConfig;
pub use error::{Result, TraceVaultError};
pub use state::validate_transition;
pub use types::*;
