//! Error taxonomy.
//!
//! Three families with different audiences:
//!
//! - [`HeraldError`]: a domain failure raised by command handlers. The
//!   dispatcher is the single catch point; it reports the error through the
//!   emitter and maps it to the process exit code.
//! - [`UsageError`]: a bad CLI invocation; reported like a domain failure
//!   but with exit code 2.
//! - [`EmitterError`]: the emitter was misused by the calling code (wrong
//!   state, double init). Never caught, never user-facing: it propagates
//!   out as a programming-error diagnostic.

use std::error::Error;
use std::fmt;
use std::io;

/// Boxed source for error chaining.
pub type BoxedCause = Box<dyn Error + Send + Sync + 'static>;

/// Exit code for domain failures unless the error overrides it.
pub const RETCODE_FAILURE: i32 = 1;

/// Exit code for bad CLI invocations.
pub const RETCODE_USAGE: i32 = 2;

/// A command/operation failure carrying everything needed to report it well.
///
/// The terminal gets the `message` (plus `resolution` and `docs_url` hints
/// when present); `details` and the cause chain go to the log, surfacing on
/// screen only in the debug-oriented verbosity modes.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HeraldError {
    /// One-line, user-facing description of what went wrong.
    pub message: String,
    /// Extra diagnostic detail, log-oriented.
    pub details: Option<String>,
    /// What the user could do about it.
    pub resolution: Option<String>,
    /// Link to relevant documentation.
    pub docs_url: Option<String>,
    /// Process exit code for this failure.
    pub retcode: i32,
    /// Underlying error, if this failure wraps one.
    #[source]
    pub cause: Option<BoxedCause>,
}

impl HeraldError {
    /// New failure with just a message; everything else defaults.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
            resolution: None,
            docs_url: None,
            retcode: RETCODE_FAILURE,
            cause: None,
        }
    }

    /// Attach diagnostic detail (goes to the log).
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attach a suggested resolution (shown to the user).
    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = Some(resolution.into());
        self
    }

    /// Attach a documentation link (shown to the user).
    pub fn with_docs_url(mut self, url: impl Into<String>) -> Self {
        self.docs_url = Some(url.into());
        self
    }

    /// Override the process exit code.
    pub fn with_retcode(mut self, retcode: i32) -> Self {
        self.retcode = retcode;
        self
    }

    /// Chain the underlying error this failure wraps.
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// The chain of underlying errors, outermost first.
    pub fn cause_chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current: Option<&(dyn Error + 'static)> =
            self.cause.as_deref().map(|c| c as &(dyn Error + 'static));
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }
}

/// A bad command-line invocation: unknown command, bad flag, bad value.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct UsageError {
    /// What was wrong with the invocation.
    pub message: String,
}

impl UsageError {
    /// New usage error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<UsageError> for HeraldError {
    fn from(err: UsageError) -> Self {
        HeraldError::new(err.message).with_retcode(RETCODE_USAGE)
    }
}

/// Emitter misuse: these indicate a bug in the calling application, not a
/// user-recoverable condition, and are not caught by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum EmitterError {
    /// `init` was called twice in the same process.
    #[error("emitter is already initialized in this process")]
    AlreadyInitialized,

    /// A method was called in a state that does not allow it.
    #[error("cannot {action} while the emitter is {state}")]
    InvalidState {
        /// The attempted action.
        action: &'static str,
        /// The state the emitter was in.
        state: &'static str,
    },

    /// Setting up the log file or terminal failed.
    #[error("emitter i/o failure")]
    Io(#[from] io::Error),
}

impl EmitterError {
    pub(crate) fn invalid(action: &'static str, state: &'static str) -> Self {
        Self::InvalidState { action, state }
    }

    /// True for the wrong-state variant; convenient in tests.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}

/// Renders the standard "try help" hint for usage failures.
#[derive(Debug)]
pub(crate) struct UsageHint<'a>(pub &'a str);

impl fmt::Display for UsageHint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "try '{} help'", self.0)
    }
}
