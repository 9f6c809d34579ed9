/*!
 * Local Transport
 * In-process transport with one flume mailbox per rank
 */

use super::traits::Transport;
use super::types::{CommId, Communicator, TransportError, TransportResult};
use crate::core::limits::MAX_COMMUNICATOR_SIZE;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared-memory transport for PETs living in one OS process
pub struct LocalTransport {
    next_id: AtomicU64,
    live: Arc<DashMap<CommId, Communicator, RandomState>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            live: Arc::new(DashMap::with_hasher(RandomState::new())),
        }
    }

    /// Number of communicators not yet released
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    fn create(&self, size: usize) -> TransportResult<Communicator> {
        if size == 0 || size > MAX_COMMUNICATOR_SIZE {
            return Err(TransportError::InvalidSize {
                size,
                max: MAX_COMMUNICATOR_SIZE,
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let comm = Communicator::new(id, size);
        self.live.insert(id, comm.clone());
        Ok(comm)
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LocalTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    fn init(&self, size: usize) -> TransportResult<Communicator> {
        let comm = self.create(size)?;
        info!(comm = comm.id(), size, "Local transport world communicator up");
        Ok(comm)
    }

    fn derive(&self, parent: &Communicator, size: usize) -> TransportResult<Communicator> {
        if parent.is_closed() {
            return Err(TransportError::Closed(parent.id()));
        }
        let comm = self.create(size)?;
        debug!(parent = parent.id(), comm = comm.id(), size, "Derived communicator");
        Ok(comm)
    }

    fn release(&self, comm: &Communicator) -> TransportResult<()> {
        if let Some((_, released)) = self.live.remove(&comm.id()) {
            released.close();
            debug!(comm = comm.id(), "Released communicator");
        }
        Ok(())
    }

    fn finalize(&self, world: &Communicator) -> TransportResult<()> {
        if world.is_closed() {
            return Err(TransportError::Closed(world.id()));
        }
        let closed = self.live.len();
        for entry in self.live.iter() {
            entry.value().close();
        }
        self.live.clear();
        info!(world = world.id(), closed, "Local transport finalized");
        Ok(())
    }
}
