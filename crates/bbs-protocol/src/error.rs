use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid length for {what}: expected {expected} bytes, got {got}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Invalid vote mode: {0}")]
    InvalidVoteMode(i8),

    #[error("Content hash mismatch: header says {header}, body hashes to {computed}")]
    HashMismatch { header: String, computed: String },

    #[error("Content type mismatch: header says {header}, body is {body}")]
    TypeMismatch { header: String, body: String },

    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
