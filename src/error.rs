//! Typed error kinds shared by the registry, the interface lifecycle, and transports.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SiobaError>;

/// Error kinds surfaced by sioba's public API (spec section 6).
#[derive(Debug, Error)]
pub enum SiobaError {
    /// Operation attempted before `start()`.
    #[error("interface not started")]
    NotStarted,

    /// Operation attempted after `shutdown()`.
    #[error("interface is shut down")]
    TerminalClosed,

    /// Raised inside a worker function when the dispatch loop is gone.
    #[error("interface shut down during blocking call")]
    InterfaceShutdown,

    /// User-initiated interruption (Ctrl-C) during a capture.
    #[error("interface interrupted")]
    InterfaceInterrupt,

    /// `interface_from_uri` / `buffer_from_uri` given a scheme with no registered factory.
    #[error("no handler registered for scheme {0:?}")]
    UnknownScheme(String),

    /// `register_scheme` / `register_buffer` called twice for the same scheme.
    #[error("scheme {0:?} is already registered")]
    DuplicateScheme(String),

    /// A registered factory did not produce the expected trait object.
    #[error("factory for scheme {0:?} produced an invalid interface")]
    InvalidFactory(String),

    /// The peer reset the connection.
    #[error("connection reset: {0}")]
    ConnectionReset(String),

    /// TLS certificate verification failed.
    #[error("TLS verification failed: {0}")]
    SslVerifyFailed(String),

    /// Transport-level I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for boxed transport errors (portable-pty, tokio-tungstenite, serialport, …).
    #[error("transport error: {0}")]
    Transport(#[from] Box<dyn std::error::Error + Send + Sync>),
}
