use std::sync::Mutex;

use protocol::Envelope;

use crate::errors::GameError;

/// Outbound delivery seam. The engine only ever hands envelopes to a
/// `Courier`; the messenger crate provides the one that writes to the relay
/// socket, and tests swap in a recorder.
pub trait Courier: Send + Sync {
    fn deliver(&self, envelope: Envelope) -> Result<(), GameError>;
}

/// Courier that keeps everything it is given. For tests and dry runs.
#[derive(Default)]
pub struct RecordingCourier {
    sent: Mutex<Vec<Envelope>>,
}

impl RecordingCourier {
    pub fn new() -> Self {
        RecordingCourier {
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Everything delivered so far, leaving the recorder empty.
    pub fn take(&self) -> Vec<Envelope> {
        match self.sent.lock() {
            Ok(mut sent) => sent.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }
}

impl Courier for RecordingCourier {
    fn deliver(&self, envelope: Envelope) -> Result<(), GameError> {
        self.sent.lock()?.push(envelope);
        Ok(())
    }
}
