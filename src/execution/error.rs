use thiserror::Error;

use crate::connection::ConnectionError;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("`{command}` failed with exit code {return_code}")]
    Failed { command: String, return_code: i32 },

    #[error("`{command}` wrote to stderr: {stderr}")]
    Stderr { command: String, stderr: String },

    #[error("`{command}` did not finish within {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Output stream of `{command}` was already taken")]
    StreamTaken { command: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl CommandError {
    /// Exit status of a command that ran to completion but failed
    pub fn return_code(&self) -> Option<i32> {
        match self {
            Self::Failed { return_code, .. } => Some(*return_code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_code_only_for_failed_commands() {
        let failed = CommandError::Failed {
            command: "exit 3".to_string(),
            return_code: 3,
        };
        assert_eq!(failed.return_code(), Some(3));

        let stderr = CommandError::Stderr {
            command: "echo oops >&2".to_string(),
            stderr: "oops".to_string(),
        };
        assert_eq!(stderr.return_code(), None);
    }
}
