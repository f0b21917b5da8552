use std::fmt;

/// Enum representing errors that can occur while encoding or decoding envelopes.
#[derive(Debug)]
pub enum ProtocolError {
    SerializationError(String),
    Malformed(String),
    UnknownKind(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::SerializationError(detail) => {
                write!(f, "Serialization error: {}", detail)
            }
            ProtocolError::Malformed(detail) => write!(f, "Malformed envelope: {}", detail),
            ProtocolError::UnknownKind(kind) => write!(f, "Unknown message type: {}", kind),
        }
    }
}
