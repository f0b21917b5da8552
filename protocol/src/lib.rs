use errors::ProtocolError;

pub mod envelope;
pub mod errors;

pub use envelope::{Envelope, EventKind};

pub trait Serializable {
    fn to_bytes(&self) -> std::result::Result<Vec<u8>, ProtocolError>;

    fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, ProtocolError>
    where
        Self: Sized;
}
