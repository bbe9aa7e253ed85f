use serde::Serialize;
use tracing::{debug, warn};

use super::error::CommandError;

/// Materialized outcome of one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub command: String,
    pub return_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    /// Decode raw output, dropping carriage returns and surrounding whitespace
    pub fn new(command: impl Into<String>, return_code: i32, stdout: &[u8], stderr: &[u8]) -> Self {
        Self {
            command: command.into(),
            return_code,
            stdout: normalize(stdout),
            stderr: normalize(stderr),
        }
    }

    pub fn ok(&self) -> bool {
        self.return_code == 0
    }

    /// Raise or degrade a failed run
    ///
    /// A run failed when it exited non-zero or wrote anything to stderr. With
    /// `warn` unset the captured output is printed (unless it was already
    /// echoed live) and an error is returned.
    pub fn check(self, warn: bool, hide: bool) -> Result<Self, CommandError> {
        if self.ok() && self.stderr.is_empty() {
            return Ok(self);
        }

        if !warn {
            if hide {
                self.print_captured();
            }
            if !self.ok() {
                return Err(CommandError::Failed {
                    command: self.command,
                    return_code: self.return_code,
                });
            }
            return Err(CommandError::Stderr {
                command: self.command,
                stderr: self.stderr,
            });
        }

        if hide {
            debug!(
                "`{}` exited with {} (stderr: {})",
                self.command, self.return_code, self.stderr
            );
        } else {
            warn!("`{}` exited with {}", self.command, self.return_code);
        }
        Ok(self)
    }

    fn print_captured(&self) {
        if !self.stdout.is_empty() {
            println!("{}", self.stdout);
        }
        if !self.stderr.is_empty() {
            eprintln!("{}", self.stderr);
        }
    }
}

fn normalize(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).replace('\r', "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_output_normalization() {
        let result = CommandResult::new("echo hi", 0, b"hi\r\n", b"");
        assert_eq!(result.stdout, "hi");
        assert_eq!(result.stderr, "");
        assert!(result.ok());
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let result = CommandResult::new("cat blob", 0, &[0x66, 0xff, 0x6f], b"");
        assert_eq!(result.stdout, "f\u{fffd}o");
    }

    #[test]
    fn test_check_raises_on_exit_code() {
        let result = CommandResult::new("false", 1, b"", b"");
        match result.check(false, true) {
            Err(CommandError::Failed { return_code, .. }) => assert_eq!(return_code, 1),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_check_raises_on_stderr() {
        let result = CommandResult::new("noisy", 0, b"", b"careful\n");
        assert!(matches!(
            result.check(false, true),
            Err(CommandError::Stderr { .. })
        ));
    }

    #[test]
    fn test_check_warn_degrades() {
        let result = CommandResult::new("false", 1, b"", b"");
        let result = result.check(true, true).unwrap();
        assert_eq!(result.return_code, 1);
        assert!(!result.ok());
    }

    proptest! {
        #[test]
        fn ok_matches_zero_exit(code in any::<i32>(), out in ".*", err in ".*") {
            let result = CommandResult::new("cmd", code, out.as_bytes(), err.as_bytes());
            prop_assert_eq!(result.ok(), code == 0);
        }
    }
}
