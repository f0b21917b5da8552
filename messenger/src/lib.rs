pub mod errors;
pub mod registry;
pub mod relay;
pub mod service;

pub use errors::MessengerError;
pub use registry::{Page, Registry};
pub use relay::RelayClient;
