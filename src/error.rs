use std::fmt;

/// Main error type for the murmur membership service
#[derive(Debug)]
pub enum GossipError {
    /// Configuration or CLI argument errors
    Config(String),

    /// Transport layer errors: unreachable peers, closed channels
    Transport(String),

    /// A peer answered a request with an explicit rejection
    Rejected(String),

    /// A membership listener failed while handling a callback
    Listener(String),

    /// Wire encoding errors
    Codec(CodecError),

    /// System I/O errors
    Io(std::io::Error),
}

/// Wire codec errors
#[derive(Debug)]
pub enum CodecError {
    Encode(bincode::error::EncodeError),
    Decode(bincode::error::DecodeError),
}

impl fmt::Display for GossipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GossipError::Config(msg) => write!(f, "Configuration error: {}", msg),
            GossipError::Transport(msg) => write!(f, "Transport error: {}", msg),
            GossipError::Rejected(msg) => write!(f, "Request rejected: {}", msg),
            GossipError::Listener(msg) => write!(f, "Listener error: {}", msg),
            GossipError::Codec(err) => write!(f, "Codec error: {}", err),
            GossipError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Encode(err) => write!(f, "encode: {}", err),
            CodecError::Decode(err) => write!(f, "decode: {}", err),
        }
    }
}

impl std::error::Error for GossipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GossipError::Io(err) => Some(err),
            GossipError::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Encode(err) => Some(err),
            CodecError::Decode(err) => Some(err),
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, GossipError>;

impl GossipError {
    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            GossipError::Config(_) => "configuration_error",
            GossipError::Transport(_) => "transport_error",
            GossipError::Rejected(_) => "rejected",
            GossipError::Listener(_) => "listener_error",
            GossipError::Codec(_) => "codec_error",
            GossipError::Io(_) => "io_error",
        }
    }
}

impl From<std::io::Error> for GossipError {
    fn from(err: std::io::Error) -> Self {
        GossipError::Io(err)
    }
}

impl From<bincode::error::EncodeError> for GossipError {
    fn from(err: bincode::error::EncodeError) -> Self {
        GossipError::Codec(CodecError::Encode(err))
    }
}

impl From<bincode::error::DecodeError> for GossipError {
    fn from(err: bincode::error::DecodeError) -> Self {
        GossipError::Codec(CodecError::Decode(err))
    }
}

impl From<std::net::AddrParseError> for GossipError {
    fn from(err: std::net::AddrParseError) -> Self {
        GossipError::Config(format!("Invalid address: {}", err))
    }
}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::GossipError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GossipError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::error::GossipError::Transport($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GossipError::Transport(format!($fmt, $($arg)*))
    };
}
