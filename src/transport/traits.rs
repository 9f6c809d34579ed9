/*!
 * Transport Traits
 * Message-passing transport abstraction used at bring-up and spawn
 */

use super::types::{Communicator, TransportResult};

/// Message-passing transport backing every VM's communicator
pub trait Transport: Send + Sync {
    /// Human-readable transport name
    fn name(&self) -> &'static str;

    /// Bring up the world communicator spanning `size` PETs
    fn init(&self, size: usize) -> TransportResult<Communicator>;

    /// Derive a new communicator of `size` ranks for a child of `parent`
    fn derive(&self, parent: &Communicator, size: usize) -> TransportResult<Communicator>;

    /// Release a derived communicator once its VM retires
    fn release(&self, comm: &Communicator) -> TransportResult<()>;

    /// Shut down the world communicator and everything derived from it
    fn finalize(&self, world: &Communicator) -> TransportResult<()>;
}
