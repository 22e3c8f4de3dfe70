use std::io;

/// Errors from sandboxed filesystem operations.
///
/// `BackReference` is the one variant command implementations are expected
/// to catch and paper over (spec: `cd` falls back to `/`, `ls` rewrites the
/// path to a root-confined one); everything else bubbles up as a generic
/// failure.
#[derive(thiserror::Error, Debug)]
pub enum SandboxError {
    #[error("path escapes sandbox root: {0}")]
    BackReference(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_reference_displays_path() {
        let err = SandboxError::BackReference("../../etc/passwd".into());
        assert_eq!(err.to_string(), "path escapes sandbox root: ../../etc/passwd");
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SandboxError>();
    }
}
