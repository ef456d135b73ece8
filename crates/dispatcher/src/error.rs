//! Error types for the dispatcher.

use std::io;

/// Errors reported by dispatcher operations that callers may want to match on.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// An agent command was registered before the agent protocol was enabled.
    #[error("enable the agent protocol before registering agent command {0:?}")]
    AgentProtocolDisabled(String),

    /// A handler panicked while processing a request.
    #[error("handler for {command:?} panicked: {reason}")]
    HandlerPanicked {
        /// The command being processed.
        command: String,
        /// The panic payload, when it was a string.
        reason: String,
    },

    /// The execution engine cannot evaluate scripts.
    #[error("script evaluation is not supported by this engine")]
    ScriptsUnsupported,

    /// The execution engine is no longer accepting commands.
    #[error("execution engine command queue closed")]
    EngineClosed,
}

/// Errors that can occur while reading or writing framed messages.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    /// An I/O error occurred while reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A header other than Content-Length was received.
    #[error("header {0:?} not implemented")]
    UnsupportedHeader(String),

    /// The Content-Length header value could not be parsed as an integer.
    #[error("malformed Content-Length header value")]
    MalformedContentLength,

    /// No Content-Length header was found before the body.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// The message body was not valid UTF-8.
    #[error("invalid UTF-8 in message body")]
    InvalidUtf8,
}
