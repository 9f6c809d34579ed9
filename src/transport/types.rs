/*!
 * Transport Types
 * Opaque communicator handle and point-to-point endpoints
 */

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Communicator context identifier
pub type CommId = u64;

/// Transport operation result
pub type TransportResult<T> = Result<T, TransportError>;

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum TransportError {
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid communicator size {size} (max {max})")]
    InvalidSize { size: usize, max: usize },

    #[error("Rank {rank} out of range for communicator of size {size}")]
    InvalidRank { rank: usize, size: usize },

    #[error("Communicator {0} is closed")]
    Closed(CommId),
}

/// Message delivered to a rank's mailbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub source: usize,
    pub payload: Bytes,
}

/// Per-communicator mailboxes, one per rank
///
/// Closing drops every sender, which disconnects the mailboxes and wakes
/// receivers blocked in `recv`.
pub(crate) struct Mesh {
    senders: RwLock<Option<Vec<flume::Sender<Envelope>>>>,
    receivers: Vec<flume::Receiver<Envelope>>,
}

impl Mesh {
    pub(crate) fn new(size: usize) -> Self {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| flume::unbounded()).unzip();
        Self {
            senders: RwLock::new(Some(senders)),
            receivers,
        }
    }

    pub(crate) fn close(&self) {
        self.senders.write().take();
    }

    fn is_closed(&self) -> bool {
        self.senders.read().is_none()
    }
}

/// Opaque handle to a message-passing context
///
/// The VM layer stores and hands out communicators without interpreting
/// them. Messaging layers built on top obtain per-rank endpoints.
#[derive(Clone)]
pub struct Communicator {
    id: CommId,
    size: usize,
    mesh: Arc<Mesh>,
}

impl Communicator {
    /// Create a communicator with fresh mailboxes
    pub fn new(id: CommId, size: usize) -> Self {
        Self {
            id,
            size,
            mesh: Arc::new(Mesh::new(size)),
        }
    }

    #[inline]
    pub fn id(&self) -> CommId {
        self.id
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_closed(&self) -> bool {
        self.mesh.is_closed()
    }

    pub(crate) fn close(&self) {
        self.mesh.close();
    }

    /// Endpoint for `rank`
    pub fn endpoint(&self, rank: usize) -> TransportResult<Endpoint> {
        if rank >= self.size {
            return Err(TransportError::InvalidRank {
                rank,
                size: self.size,
            });
        }
        Ok(Endpoint {
            rank,
            comm: self.clone(),
        })
    }
}

impl fmt::Debug for Communicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Communicator")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PartialEq for Communicator {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.mesh, &other.mesh)
    }
}

impl Eq for Communicator {}

/// Point-to-point access to a communicator as one rank
#[derive(Debug, Clone)]
pub struct Endpoint {
    rank: usize,
    comm: Communicator,
}

impl Endpoint {
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn communicator(&self) -> &Communicator {
        &self.comm
    }

    /// Deliver `payload` to the mailbox of rank `to`
    pub fn send(&self, to: usize, payload: impl Into<Bytes>) -> TransportResult<()> {
        let senders = self.comm.mesh.senders.read();
        let senders = senders
            .as_ref()
            .ok_or(TransportError::Closed(self.comm.id))?;
        let tx = senders
            .get(to)
            .ok_or(TransportError::InvalidRank {
                rank: to,
                size: self.comm.size,
            })?;
        tx.send(Envelope {
            source: self.rank,
            payload: payload.into(),
        })
        .map_err(|_| TransportError::Closed(self.comm.id))
    }

    /// Block until a message arrives for this rank
    ///
    /// Returns `Closed` once the communicator is released, including for a
    /// call already waiting.
    pub fn recv(&self) -> TransportResult<Envelope> {
        if self.comm.mesh.is_closed() {
            return Err(TransportError::Closed(self.comm.id));
        }
        self.comm.mesh.receivers[self.rank]
            .recv()
            .map_err(|_| TransportError::Closed(self.comm.id))
    }

    /// Take a pending message without blocking
    pub fn try_recv(&self) -> TransportResult<Option<Envelope>> {
        if self.comm.mesh.is_closed() {
            return Err(TransportError::Closed(self.comm.id));
        }
        match self.comm.mesh.receivers[self.rank].try_recv() {
            Ok(env) => Ok(Some(env)),
            Err(flume::TryRecvError::Empty) => Ok(None),
            Err(flume::TryRecvError::Disconnected) => Err(TransportError::Closed(self.comm.id)),
        }
    }
}
