//! Binary error types with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use xfinity_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const CONFIG: i32 = 2;
}

#[derive(Debug, Error, Diagnostic)]
pub enum GwError {
    #[error("Invalid configuration in {path}")]
    #[diagnostic(
        code(xfinity::config),
        help(
            "Required keys are box_host and box_token, set in {path}\n\
             or exported as XFINITY_BOX_HOST and XFINITY_BOX_TOKEN."
        )
    )]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },
}

impl GwError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => exit_code::CONFIG,
        }
    }
}
