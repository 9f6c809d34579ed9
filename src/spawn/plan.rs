/*!
 * Spawn Plan
 *
 * Partitions the processing elements of a VM into `nspawn` contiguous,
 * balanced, non-overlapping groups. Each group sits in its own arena slot
 * until `Registry::startup` moves it into a running child context.
 */

use super::types::{ChildSlot, ChildState, Partition, SpawnPolicy};
use crate::core::errors::VmError;
use crate::core::types::{PeId, VmId, VmResult};
use crate::vm::VirtualMachine;
use tracing::info;

#[derive(Debug)]
pub struct SpawnPlan {
    parent: VirtualMachine,
    policy: SpawnPolicy,
    slots: Vec<ChildSlot>,
}

impl SpawnPlan {
    /// Partition `vm`'s processing elements into `nspawn` children
    ///
    /// Group sizes differ by at most one; the first `pe_count % nspawn`
    /// groups receive the extra PE.
    pub fn build(vm: &VirtualMachine, nspawn: usize, policy: SpawnPolicy) -> VmResult<Self> {
        if nspawn == 0 {
            return Err(VmError::InvalidSpawnCount(nspawn));
        }

        let pes: Vec<PeId> = vm.kernel().pes().collect();
        if nspawn > pes.len() {
            return Err(VmError::InsufficientResources {
                requested: nspawn,
                available: pes.len(),
            });
        }

        let base = pes.len() / nspawn;
        let extra = pes.len() % nspawn;
        let mut slots = Vec::with_capacity(nspawn);
        let mut start = 0;
        for slot in 0..nspawn {
            let len = base + usize::from(slot < extra);
            slots.push(ChildSlot::planned(Partition {
                slot,
                pes: pes[start..start + len].to_vec(),
            }));
            start += len;
        }

        info!(
            parent = vm.id(),
            nspawn,
            pes = pes.len(),
            policy = ?policy,
            "Spawn plan built"
        );

        Ok(Self {
            parent: vm.clone(),
            policy,
            slots,
        })
    }

    /// Number of children
    #[inline]
    pub fn nspawn(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn policy(&self) -> SpawnPolicy {
        self.policy
    }

    #[inline]
    pub fn parent_id(&self) -> VmId {
        self.parent.id()
    }

    pub fn partition(&self, slot: usize) -> Option<&Partition> {
        self.slots.get(slot).map(|s| &s.partition)
    }

    pub fn partitions(&self) -> impl Iterator<Item = &Partition> + '_ {
        self.slots.iter().map(|s| &s.partition)
    }

    /// State of `slot` before launch; always `Planned` since startup consumes the plan
    pub fn state(&self, slot: usize) -> Option<ChildState> {
        self.slots.get(slot).map(|s| s.state)
    }

    /// Child PET count the given slot will produce
    pub fn child_pet_count(&self, slot: usize) -> Option<usize> {
        self.partition(slot)
            .map(|p| self.policy.pet_groups(&p.pes).len())
    }

    /// Processing elements covered by the plan
    pub fn total_pes(&self) -> usize {
        self.slots.iter().map(|s| s.partition.pe_count()).sum()
    }

    pub(crate) fn parent(&self) -> &VirtualMachine {
        &self.parent
    }

    pub(crate) fn into_parts(self) -> (VirtualMachine, SpawnPolicy, Vec<ChildSlot>) {
        (self.parent, self.policy, self.slots)
    }
}
