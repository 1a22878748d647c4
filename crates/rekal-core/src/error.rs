use std::fmt;

/// An error whose message has already been shown to the user.
///
/// `main` checks for this in the error chain and exits non-zero without
/// printing the message a second time.
#[derive(Debug)]
pub struct SilentError {
    inner: anyhow::Error,
}

impl SilentError {
    pub fn new(inner: anyhow::Error) -> Self {
        Self { inner }
    }
}

impl fmt::Display for SilentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for SilentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

/// Report whether `err` (or anything it wraps) was already printed.
pub fn is_silent(err: &anyhow::Error) -> bool {
    err.chain().any(|e| e.is::<SilentError>())
}

/// An optional, platform-gated capability is unavailable here.
#[derive(Debug, thiserror::Error)]
#[error("not supported: {0}")]
pub struct NotSupported(pub String);
