//! Analyzer error taxonomy. Mirrors `core/err.py`: capture/validate/transform
//! failures are ordinary, recoverable rejections surfaced through
//! [`Rejected`]; [`ParsePanic`] is the one unrecoverable case and is left to
//! propagate rather than being folded into a loop exit reason.

use std::fmt;

use thiserror::Error;

use crate::analyzer::LoopflowExitReason;

/// Raised by a [`crate::fragment::Capture`] strategy when the token it read
/// doesn't fit what it expected.
#[derive(Debug, Error)]
pub enum CaptureRejected {
    #[error("expected {expected}, got {got}")]
    UnexpectedType { expected: &'static str, got: &'static str },
    #[error("pattern {pattern:?} does not match {raw:?}")]
    RegexMismatch { pattern: String, raw: String },

    #[error("fragment group {group} already rejected this capture")]
    GroupRejected { group: String },

    /// The buffer ran dry mid-capture. Kept distinct from the other
    /// variants so [`crate::mix::Track::forward`] can surface it as a
    /// loop exit rather than a fragment-level rejection.
    #[error("buffer exhausted")]
    OutOfData,
}

/// Raised when a fragment's validator rejects the captured value.
#[derive(Debug, Error)]
#[error("validation failed for fragment {field}, got {value}")]
pub struct ValidateRejected {
    pub field: String,
    pub value: String,
}

/// Unrecoverable: either a transformer/receiver panicked, or the loop
/// observed a state it has no rule for. Propagates past `analyze_loopflow`
/// rather than being converted to a [`Rejected`].
#[derive(Debug, Error)]
pub enum ParsePanic {
    #[error("failed to transform fragment {field}")]
    Transform { field: String, #[source] source: anyhow::Error },
    #[error("receiver panicked for fragment {field}")]
    Receive { field: String, #[source] source: anyhow::Error },
}

/// The union of everything a fragment's capture/validate/transform/receive
/// pipeline can fail with, short of a [`ParsePanic`].
#[derive(Debug, Error)]
pub enum FragmentError {
    #[error(transparent)]
    Capture(#[from] CaptureRejected),
    #[error(transparent)]
    Validate(#[from] ValidateRejected),
}

/// The buffer has no more tokens to hand out.
#[derive(Debug, Error)]
#[error("buffer exhausted")]
pub struct OutOfData;

/// The loop rejected the input. `cause` is set only when the rejection was
/// triggered by a fragment's own pipeline rather than a pure grammar
/// mismatch (e.g. `header_mismatch` carries no cause).
#[derive(Debug, Error)]
pub struct Rejected {
    pub reason: LoopflowExitReason,
    pub cause: Option<FragmentError>,
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rejected: {}", self.reason)
    }
}

impl Rejected {
    pub fn new(reason: LoopflowExitReason) -> Self {
        Self { reason, cause: None }
    }

    pub fn with_cause(reason: LoopflowExitReason, cause: impl Into<FragmentError>) -> Self {
        Self { reason, cause: Some(cause.into()) }
    }
}

impl std::error::Error for Rejected {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c as &(dyn std::error::Error + 'static))
    }
}
