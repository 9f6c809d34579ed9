/*!
 * Core Types
 * Identifiers shared across the topology layer
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// PET ordinal inside its owning VM (dense, `0..pet_count`)
pub type PetId = usize;

/// Shared-memory image index
pub type ImageId = usize;

/// Thread slot inside an image
pub type ThreadId = usize;

/// Process-unique virtual machine identifier
pub type VmId = u64;

/// Common result type for topology operations
pub type VmResult<T> = Result<T, super::errors::VmError>;

/// One processing element: a single core of a single image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeId {
    pub image: ImageId,
    pub core: usize,
}

impl PeId {
    #[inline]
    pub const fn new(image: ImageId, core: usize) -> Self {
        Self { image, core }
    }
}

impl fmt::Display for PeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ssi{}:pe{}", self.image, self.core)
    }
}

/// Physical location a PET executes on
///
/// Two PETs of different VMs that share a location run on the same hardware
/// thread of the same image. Within one VM every location is unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub image: ImageId,
    pub thread: ThreadId,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.image, self.thread)
    }
}
