//! Exit status codes for the CLI
//!
//! - 0: the run completed
//! - 1: the run could not start (bad ammo file, bad arguments, client setup)
//! - 130: interrupted with Ctrl+C
//!
//! Failed shots do not change the exit status; they show up in the report.

use std::process::{ExitCode, Termination};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    Success = 0,
    Error = 1,
    /// Standard SIGINT code
    Interrupted = 130,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status as u8)
    }
}

impl Termination for ExitStatus {
    fn report(self) -> ExitCode {
        ExitCode::from(self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(ExitStatus::Success as u8, 0);
        assert_eq!(ExitStatus::Error as u8, 1);
        assert_eq!(ExitStatus::Interrupted as u8, 130);
    }
}
