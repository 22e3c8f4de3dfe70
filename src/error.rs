//! Top-level error kinds that cross module boundaries. Leaf modules
//! (`sandbox`, `audit`) keep their own `thiserror` enums and convert into
//! this one at the seam; callers that only care about "did it work"
//! reach for `anyhow::Result` instead.

use crate::sandbox::SandboxError;

#[derive(thiserror::Error, Debug)]
pub enum HiveError {
    #[error("config.json missing required field: {0}")]
    ConfigMissing(String),

    #[error("ssh protocol failure: {0}")]
    SshProtocolFailure(String),

    #[error("authentication failed for user {0:?}")]
    AuthFailure(String),

    #[error(transparent)]
    BackReferenceEscape(#[from] SandboxError),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("could not parse arguments: {0}")]
    ParseError(String),

    #[error("network address could not be resolved: {0}")]
    NetworkUnresolved(String),

    #[error("channel closed")]
    ChannelClosed,

    #[error("audit store failure: {0}")]
    AuditStoreFailure(#[from] rusqlite::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HiveError>();
    }

    #[test]
    fn auth_failure_displays_username() {
        let err = HiveError::AuthFailure("mallory".to_string());
        assert_eq!(err.to_string(), "authentication failed for user \"mallory\"");
    }

    #[test]
    fn back_reference_escape_wraps_sandbox_error() {
        let err: HiveError = SandboxError::NotFound("/etc/shadow".to_string()).into();
        assert!(matches!(err, HiveError::BackReferenceEscape(_)));
    }
}
