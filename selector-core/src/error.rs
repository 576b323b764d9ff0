//! Error types for the selector engine.
//!
//! Selectors report failure by returning a [`SelectorFault`]. The engine
//! either propagates that fault to the caller of the synchronous compute
//! phase, or records it during the asynchronous recompute and hands it back
//! (correlated with the next fault) on the following synchronous compute.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = SelectError> = std::result::Result<T, E>;

/// A failure raised by a selector.
///
/// Faults are cheap to clone so the engine can keep the last asynchronous
/// fault in its cache while also handing a copy to diagnostics.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SelectorFault {
    message: String,

    /// Underlying error, when the fault wraps one.
    #[source]
    cause: Option<Arc<dyn StdError + Send + Sync>>,

    /// Stack captured at the point the fault was created.
    /// Only populated when `RUST_BACKTRACE`/`RUST_LIB_BACKTRACE` enable it.
    trace: Arc<Backtrace>,

    /// The deferred fault this one was correlated with, if any.
    previous: Option<Box<SelectorFault>>,
}

impl SelectorFault {
    /// Create a fault with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
            trace: Arc::new(Backtrace::capture()),
            previous: None,
        }
    }

    /// Wrap an existing error as a selector fault.
    pub fn from_error<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: err.to_string(),
            cause: Some(Arc::new(err)),
            trace: Arc::new(Backtrace::capture()),
            previous: None,
        }
    }

    /// The (possibly correlated) message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The backtrace captured when this fault was created.
    pub fn backtrace(&self) -> &Backtrace {
        &self.trace
    }

    /// The earlier fault this one was correlated with.
    pub fn previous(&self) -> Option<&SelectorFault> {
        self.previous.as_deref()
    }

    /// Message plus the captured backtrace, when one was captured.
    ///
    /// This is what gets appended to a later fault during correlation.
    pub fn detail(&self) -> String {
        match self.trace.status() {
            BacktraceStatus::Captured => format!("{}\n{}", self.message, self.trace),
            _ => self.message.clone(),
        }
    }

    /// Annotate this fault with the detail of an earlier deferred fault.
    ///
    /// The earlier fault's backtrace is included only if it was captured,
    /// which [`Backtrace::capture`] does when `RUST_BACKTRACE` or
    /// `RUST_LIB_BACKTRACE` is set. Otherwise only its message is appended.
    pub(crate) fn correlate(mut self, previous: &SelectorFault) -> Self {
        self.message.push_str("\nThe error may be correlated with this previous error:\n");
        self.message.push_str(&previous.detail());
        self.message.push_str("\n\n");
        self.previous = Some(Box::new(previous.clone()));
        self
    }
}

/// Errors surfaced by the engine to its host.
#[derive(Debug, Error)]
pub enum SelectError {
    /// The selector failed during the synchronous compute phase.
    #[error(transparent)]
    Selector(#[from] SelectorFault),

    /// No store has been provided for the current scope.
    #[error("no store of the requested state type is provided in the current scope")]
    NoStore,

    /// Selector options could not be parsed.
    #[error("invalid selector options")]
    InvalidOptions(#[source] serde_json::Error),

    /// A diagnostics snapshot could not be encoded.
    #[error("failed to encode diagnostics")]
    Diagnostics(#[from] serde_json::Error),
}

impl SelectError {
    /// The selector fault, if this error came from a selector.
    pub fn fault(&self) -> Option<&SelectorFault> {
        match self {
            SelectError::Selector(fault) => Some(fault),
            _ => None,
        }
    }
}
