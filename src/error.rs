//! Error types for the NAND tags layer

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the tags layer, the simulator or the CLI
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Chunk I/O Errors
    // =========================================================================
    /// Chunk lies in the reserved region below the first usable block
    #[error("Chunk {chunk} is not valid: first usable chunk is {first_valid}")]
    ChunkOutOfRange { chunk: u32, first_valid: u32 },

    /// Block number has no chunk address on this device
    #[error("Block {block} is beyond the chunk address space")]
    BlockOutOfRange { block: u32 },

    /// Driver rejected a chunk write
    #[error("Driver write failed on chunk {chunk}: {reason}")]
    DriverWrite { chunk: u32, reason: String },

    /// Driver rejected a chunk read
    #[error("Driver read failed on chunk {chunk}: {reason}")]
    DriverRead { chunk: u32, reason: String },

    /// Data buffer does not match the device geometry
    #[error("Invalid data buffer: expected at least {expected} bytes, got {actual}")]
    InvalidBuffer { expected: usize, actual: usize },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid device configuration
    #[error("Invalid device configuration: {0}")]
    InvalidConfig(String),

    /// Image file does not match the configured geometry
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Configuration (de)serialisation error
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::ConfigParse(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ConfigParse(e.to_string())
    }
}
