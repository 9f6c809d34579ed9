/*!
 * VM Kernel
 *
 * Immutable core of a virtual machine: the PET directory, the communicator
 * and the VM's place in the spawn tree. Built once and shared by every
 * `VirtualMachine` handle of the VM.
 */

use super::traits::TopologyQuery;
use super::types::PetRecord;
use crate::core::types::{Location, PeId, VmId};
use crate::topology::Topology;
use crate::transport::Communicator;
use ahash::AHashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VM_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique VM id
pub(crate) fn next_vm_id() -> VmId {
    NEXT_VM_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
pub struct VmKernel {
    id: VmId,
    parent: Option<VmId>,
    depth: u32,
    pets: Vec<PetRecord>,
    pe_count: usize,
    thread_compat: bool,
    communicator: Communicator,
}

impl VmKernel {
    /// Global kernel: one PET per processing element, image-major
    pub(crate) fn global(id: VmId, topology: &Topology, communicator: Communicator) -> Self {
        let groups = topology.pes().map(|pe| vec![pe]).collect();
        Self::new(id, None, 0, groups, topology.thread_compat, communicator)
    }

    /// Build a kernel whose PET `i` holds the processing elements of `groups[i]`
    ///
    /// Groups must be non-empty and pairwise disjoint.
    pub(crate) fn new(
        id: VmId,
        parent: Option<VmId>,
        depth: u32,
        groups: Vec<Vec<PeId>>,
        thread_compat: bool,
        communicator: Communicator,
    ) -> Self {
        let mut per_image: AHashMap<usize, usize> = AHashMap::new();
        for group in &groups {
            *per_image.entry(group[0].image).or_insert(0) += 1;
        }

        let pets: Vec<PetRecord> = groups
            .into_iter()
            .enumerate()
            .map(|(pet, pes)| {
                let anchor = pes[0];
                PetRecord {
                    pet,
                    location: Location {
                        image: anchor.image,
                        thread: anchor.core,
                    },
                    thread_group_size: per_image[&anchor.image],
                    pes,
                }
            })
            .collect();
        let pe_count = pets.iter().map(|rec| rec.pes.len()).sum();

        Self {
            id,
            parent,
            depth,
            pets,
            pe_count,
            thread_compat,
            communicator,
        }
    }

    #[inline]
    pub fn id(&self) -> VmId {
        self.id
    }

    #[inline]
    pub fn parent(&self) -> Option<VmId> {
        self.parent
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn thread_compat(&self) -> bool {
        self.thread_compat
    }

    /// All processing elements of the VM in PET order
    pub fn pes(&self) -> impl Iterator<Item = PeId> + '_ {
        self.pets.iter().flat_map(|rec| rec.pes.iter().copied())
    }
}

impl TopologyQuery for VmKernel {
    fn vm_id(&self) -> VmId {
        self.id
    }

    fn directory(&self) -> &[PetRecord] {
        &self.pets
    }

    fn communicator(&self) -> &Communicator {
        &self.communicator
    }

    fn pe_count(&self) -> usize {
        self.pe_count
    }
}
