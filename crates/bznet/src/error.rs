//! Error types for network construction and persistence

/// Errors surfaced by the network engine and the BZ codec.
#[derive(thiserror::Error, Debug)]
pub enum NetworkError {
    /// First four bytes are not `B`, `Z`, major 1, minor 0
    #[error("Invalid network file magic: expected [66, 90, 1, 0], found {found:?}")]
    InvalidMagic { found: [u8; 4] },

    /// Stream ended before the declared topology was fully read
    #[error("Network file truncated while reading {section}")]
    Truncated { section: &'static str },

    /// Zero width, size overflow or layer shape mismatch
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// Learning rate or cost parameters out of range
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// File I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for network operations
pub type Result<T> = std::result::Result<T, NetworkError>;
