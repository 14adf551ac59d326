//! Error types for the Novagate gateway.

use thiserror::Error;

/// Main error type for all gateway operations.
///
/// Every decode, governor, or dispatch failure on a connection is terminal
/// for that connection; the protocol defines no application-level error
/// frame.
#[derive(Debug, Error)]
pub enum NovagateError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame header carried the wrong magic bytes.
    #[error("invalid frame magic: 0x{0:04X}")]
    InvalidMagic(u16),

    /// Frame header carried an unsupported protocol version.
    #[error("unsupported frame version: {0}")]
    UnsupportedVersion(u8),

    /// Frame header declared a body larger than the 1 MiB cap.
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Frame flags include a reserved or unsupported bit.
    #[error("unsupported frame flags: 0x{0:02X}")]
    UnsupportedFlags(u8),

    /// Gzip output exceeded the 1 MiB decompressed-size ceiling.
    #[error("decompressed body too large")]
    DecompressedTooLarge,

    /// Frame body is shorter than the fixed message header.
    #[error("message too short: {0} bytes")]
    MessageTooShort(usize),

    /// No handler registered for the decoded command.
    #[error("unknown command: 0x{0:04X}")]
    UnknownCommand(u16),

    /// No payload handler registered in the secondary dispatcher.
    #[error("no dispatcher handler for command: 0x{0:04X}")]
    UnknownDispatch(u16),

    /// Method is not registered and the command map is in strict mode.
    #[error("unregistered command mapping for {0:?}")]
    UnregisteredMapping(String),

    /// Full method name is not of the form "Service.Method".
    #[error("invalid method format: {0:?}")]
    InvalidMethod(String),

    /// The connection's read buffer quota was exceeded.
    #[error("connection buffer quota exceeded")]
    BufferQuotaExceeded,

    /// The connection's token bucket ran dry.
    #[error("rate limit exceeded")]
    RateLimited,

    /// A response write did not complete within the write timeout.
    #[error("write timeout")]
    WriteTimeout,

    /// A command handler failed.
    #[error("handler error: {0}")]
    Handler(String),

    /// Configuration could not be loaded or parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl NovagateError {
    /// Whether this error is an expected peer-side disconnect.
    ///
    /// Benign errors end the connection without being logged.
    pub fn is_benign_disconnect(&self) -> bool {
        match self {
            NovagateError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

/// Result type alias using NovagateError.
pub type Result<T> = std::result::Result<T, NovagateError>;
