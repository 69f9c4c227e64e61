//! Utility modules for configuration, error handling and the operator console.

pub mod config;
pub mod console;
pub mod errors;

pub use config::*;
pub use console::*;
pub use errors::*;
