/*!
 * Spawn Types
 * Partitioning policy and child lifecycle
 */

use crate::core::errors::VmError;
use crate::core::types::{PeId, PetId, VmId};
use serde::{Deserialize, Serialize};

/// How a partition's processing elements become child PETs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnPolicy {
    /// One child PET per processing element
    #[default]
    MaxThreads,
    /// One child PET per image, holding all of the partition's PEs on it
    MaxPes,
}

impl SpawnPolicy {
    /// Group a partition's PEs into child PETs
    pub fn pet_groups(&self, pes: &[PeId]) -> Vec<Vec<PeId>> {
        match self {
            SpawnPolicy::MaxThreads => pes.iter().map(|pe| vec![*pe]).collect(),
            SpawnPolicy::MaxPes => {
                let mut groups: Vec<Vec<PeId>> = Vec::new();
                for pe in pes {
                    match groups.iter_mut().find(|g| g[0].image == pe.image) {
                        Some(group) => group.push(*pe),
                        None => groups.push(vec![*pe]),
                    }
                }
                groups
            }
        }
    }

    /// Whether child VMs built with this policy permit nested threading
    pub fn thread_compat(&self) -> bool {
        matches!(self, SpawnPolicy::MaxPes)
    }
}

/// Child VM lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildState {
    /// Partition reserved inside a plan, no VM yet
    Planned,
    /// VM constructed and PEs claimed, threads not confirmed
    Created,
    /// Every PET thread launched
    Running,
    /// Joined; PEs returned to the parent
    Retired,
}

/// Processing elements reserved for one spawn slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Partition {
    pub slot: usize,
    pub pes: Vec<PeId>,
}

impl Partition {
    pub fn pe_count(&self) -> usize {
        self.pes.len()
    }
}

/// Arena record of one spawn slot
#[derive(Debug)]
pub(crate) struct ChildSlot {
    pub(crate) partition: Partition,
    pub(crate) state: ChildState,
}

impl ChildSlot {
    pub(crate) fn planned(partition: Partition) -> Self {
        Self {
            partition,
            state: ChildState::Planned,
        }
    }
}

/// Registry-side record of a live child VM
#[derive(Debug, Clone)]
pub(crate) struct ChildRecord {
    pub(crate) parent: VmId,
    pub(crate) slot: usize,
    pub(crate) state: ChildState,
    pub(crate) pes: Vec<PeId>,
}

/// Result of one child VM after join
#[derive(Debug)]
pub struct ChildOutcome<R> {
    pub slot: usize,
    pub vm: VmId,
    /// Entry result per child PET, in PET order
    pub results: Vec<Result<R, VmError>>,
}

impl<R> ChildOutcome<R> {
    /// Whether every PET's entry returned normally
    pub fn is_success(&self) -> bool {
        self.results.iter().all(Result::is_ok)
    }

    /// PET ids whose entry did not return a value
    pub fn failed_pets(&self) -> Vec<PetId> {
        self.results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_err())
            .map(|(pet, _)| pet)
            .collect()
    }
}
