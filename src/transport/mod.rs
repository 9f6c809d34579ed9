/*!
 * Transport Module
 * Opaque communicators handed out by virtual machines
 */

pub mod local;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use local::LocalTransport;
pub use traits::Transport;
pub use types::{CommId, Communicator, Endpoint, Envelope, TransportError, TransportResult};
