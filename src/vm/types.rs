/*!
 * VM Types
 * PET directory records and query result shapes
 */

use crate::core::serde::{is_false, is_none, is_zero_u32};
use crate::core::types::{ImageId, Location, PeId, PetId, ThreadId, VmId};
use crate::transport::{CommId, Communicator};
use serde::{Deserialize, Serialize};

/// One entry of a VM's PET directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PetRecord {
    pub(crate) pet: PetId,
    pub(crate) location: Location,
    pub(crate) thread_group_size: usize,
    pub(crate) pes: Vec<PeId>,
}

impl PetRecord {
    #[inline]
    pub fn pet(&self) -> PetId {
        self.pet
    }

    #[inline]
    pub fn location(&self) -> Location {
        self.location
    }

    /// Processing elements held by this PET
    pub fn pes(&self) -> &[PeId] {
        &self.pes
    }

    pub fn local_info(&self) -> PetLocalInfo {
        PetLocalInfo {
            pe_count: self.pes.len(),
            image_id: self.location.image,
            thread_group_size: self.thread_group_size,
            thread_id: self.location.thread,
        }
    }
}

/// Physical placement of one PET
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PetLocalInfo {
    pub pe_count: usize,
    pub image_id: ImageId,
    pub thread_group_size: usize,
    pub thread_id: ThreadId,
}

impl PetLocalInfo {
    pub fn location(&self) -> Location {
        Location {
            image: self.image_id,
            thread: self.thread_id,
        }
    }
}

/// Context-wide metadata of a VM as seen from its local PET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmInfo {
    pub local_pet: PetId,
    pub pet_count: usize,
    pub pe_count: usize,
    pub communicator: Communicator,
    pub thread_compat: bool,
}

/// Serializable snapshot of a PET for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PetReport {
    pub pet: PetId,
    #[serde(flatten)]
    pub info: PetLocalInfo,
    pub pes: Vec<PeId>,
}

/// Serializable snapshot of a whole VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TopologyReport {
    pub vm: VmId,
    #[serde(default, skip_serializing_if = "is_none")]
    pub parent: Option<VmId>,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub depth: u32,
    pub local_pet: PetId,
    pub pet_count: usize,
    pub pe_count: usize,
    #[serde(default, skip_serializing_if = "is_false")]
    pub thread_compat: bool,
    pub communicator: CommId,
    pub pets: Vec<PetReport>,
}
