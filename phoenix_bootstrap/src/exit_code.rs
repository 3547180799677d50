//! Unix exit codes following BSD `sysexits.h` conventions.

use phoenix_domain::PhoenixError;
use std::fmt;

/// Exit codes returned by the `phoenix` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful termination.
    #[default]
    Success = 0,

    /// General, unclassified error.
    Error = 1,

    /// Invalid CLI arguments.
    UsageError = 64,

    /// Malformed or schema-invalid policy document.
    DataError = 65,

    /// Policy file not found or unreadable.
    NoInput = 66,

    /// Internal contract broken (`PhoenixError::InvariantViolation`).
    Software = 70,

    /// A patch, a safe-mode transition, or a reload was rejected.
    Config = 78,

    /// Interrupted by SIGINT.
    Interrupted = 130,

    /// Terminated by SIGTERM.
    Terminated = 143,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Maps a failed use case's error to the exit code that best describes
    /// it for an operator reading a shell `$?`.
    pub fn from_phoenix_error(error: &PhoenixError) -> Self {
        match error {
            PhoenixError::ConfigError(_) | PhoenixError::InvalidRegex(_) => ExitCode::DataError,
            PhoenixError::UnknownParameter(_, _) | PhoenixError::OutOfBounds { .. } => ExitCode::Config,
            PhoenixError::PatchRejected(_) => ExitCode::Config,
            PhoenixError::TransientIo(_) => ExitCode::NoInput,
            PhoenixError::MetricsError(_) => ExitCode::Software,
            PhoenixError::InvariantViolation(_) => ExitCode::Software,
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.as_i32())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code.as_i32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_invariant_violation_to_software_error() {
        let err = PhoenixError::InvariantViolation("sketch corrupted".into());
        assert_eq!(ExitCode::from_phoenix_error(&err), ExitCode::Software);
    }

    #[test]
    fn maps_config_error_to_data_error() {
        let err = PhoenixError::ConfigError("unknown key".into());
        assert_eq!(ExitCode::from_phoenix_error(&err), ExitCode::DataError);
    }

    #[test]
    fn default_is_success() {
        assert_eq!(ExitCode::default(), ExitCode::Success);
    }
}
