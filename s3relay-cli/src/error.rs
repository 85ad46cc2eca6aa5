//! CLI error type.

use std::fmt;
use std::process;

/// Errors that end a CLI command.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be resolved or is invalid.
    Config(String),
    /// The async runtime could not be started.
    Runtime(String),
    /// The relay ran and failed. The error response is already on stdout.
    RelayFailed,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
            CliError::RelayFailed => write!(f, "Relay failed"),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Print the error and exit with status 1.
    pub fn exit(self) -> ! {
        match self {
            // Already reported as a JSON error response.
            CliError::RelayFailed => {}
            other => eprintln!("Error: {}", other),
        }
        process::exit(1);
    }
}
