/*!
 * Virtual Machine
 *
 * Per-PET handle onto an immutable `VmKernel`. Every PET of a VM holds its
 * own handle; handles differ only in `local_pet`. All queries are
 * lock-free reads of construction-time data.
 */

use super::kernel::VmKernel;
use super::traits::{match_pet_into, TopologyQuery};
use super::types::{PetLocalInfo, PetRecord, PetReport, TopologyReport, VmInfo};
use crate::core::types::{PeId, PetId, VmId, VmResult};
use crate::transport::{Communicator, Endpoint, TransportResult};
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct VirtualMachine {
    kernel: Arc<VmKernel>,
    local_pet: PetId,
}

impl VirtualMachine {
    pub(crate) fn new(kernel: Arc<VmKernel>, local_pet: PetId) -> Self {
        debug_assert!(local_pet < kernel.pet_count());
        Self { kernel, local_pet }
    }

    pub(crate) fn kernel(&self) -> &Arc<VmKernel> {
        &self.kernel
    }

    #[inline]
    pub fn id(&self) -> VmId {
        self.kernel.id()
    }

    /// Id of the VM this one was spawned from
    #[inline]
    pub fn parent_id(&self) -> Option<VmId> {
        self.kernel.parent()
    }

    /// Spawn depth (0 for the Global VM)
    #[inline]
    pub fn depth(&self) -> u32 {
        self.kernel.depth()
    }

    #[inline]
    pub fn is_global(&self) -> bool {
        self.kernel.parent().is_none()
    }

    /// Whether both handles refer to the same VM
    pub fn same_vm(&self, other: &VirtualMachine) -> bool {
        Arc::ptr_eq(&self.kernel, &other.kernel)
    }

    #[inline]
    pub fn local_pet(&self) -> PetId {
        self.local_pet
    }

    #[inline]
    pub fn pet_count(&self) -> usize {
        self.kernel.pet_count()
    }

    #[inline]
    pub fn pe_count(&self) -> usize {
        self.kernel.pe_count()
    }

    #[inline]
    pub fn communicator(&self) -> &Communicator {
        self.kernel.communicator()
    }

    /// Whether user code may open nested thread-level parallelism
    #[inline]
    pub fn thread_compat(&self) -> bool {
        self.kernel.thread_compat()
    }

    /// All context-wide metadata at once
    pub fn info(&self) -> VmInfo {
        VmInfo {
            local_pet: self.local_pet,
            pet_count: self.pet_count(),
            pe_count: self.pe_count(),
            communicator: self.communicator().clone(),
            thread_compat: self.thread_compat(),
        }
    }

    /// Physical placement of `pet`
    pub fn pet_local_info(&self, pet: PetId) -> VmResult<PetLocalInfo> {
        Ok(self.kernel.record(pet)?.local_info())
    }

    /// Processing elements held by `pet`
    pub fn pet_pes(&self, pet: PetId) -> VmResult<&[PeId]> {
        Ok(self.kernel.record(pet)?.pes())
    }

    /// PET directory in PET order
    pub fn pets(&self) -> impl Iterator<Item = &PetRecord> + '_ {
        self.kernel.directory().iter()
    }

    /// Match `pet` of this VM against the PETs of `other`
    ///
    /// See [`match_pet_into`] for the buffer contract.
    pub fn match_pet_into<Q>(&self, pet: PetId, other: &Q, buf: &mut [usize]) -> VmResult<usize>
    where
        Q: TopologyQuery + ?Sized,
    {
        match_pet_into(self.kernel.as_ref(), pet, other, buf)
    }

    /// Every PET of `other` sharing the physical location of `pet`
    pub fn match_pet<Q>(&self, pet: PetId, other: &Q) -> VmResult<Vec<PetId>>
    where
        Q: TopologyQuery + ?Sized,
    {
        let mut buf = vec![0; other.pet_count()];
        let count = match_pet_into(self.kernel.as_ref(), pet, other, &mut buf)?;
        buf.truncate(count);
        Ok(buf)
    }

    /// Transport endpoint of the local PET
    pub fn endpoint(&self) -> TransportResult<Endpoint> {
        self.communicator().endpoint(self.local_pet)
    }

    /// Serializable snapshot for diagnostics
    pub fn report(&self) -> TopologyReport {
        TopologyReport {
            vm: self.id(),
            parent: self.parent_id(),
            depth: self.depth(),
            local_pet: self.local_pet,
            pet_count: self.pet_count(),
            pe_count: self.pe_count(),
            thread_compat: self.thread_compat(),
            communicator: self.communicator().id(),
            pets: self
                .pets()
                .map(|rec| PetReport {
                    pet: rec.pet(),
                    info: rec.local_info(),
                    pes: rec.pes().to_vec(),
                })
                .collect(),
        }
    }
}

impl TopologyQuery for VirtualMachine {
    fn vm_id(&self) -> VmId {
        self.kernel.id()
    }

    fn directory(&self) -> &[PetRecord] {
        self.kernel.directory()
    }

    fn communicator(&self) -> &Communicator {
        self.kernel.communicator()
    }

    fn pe_count(&self) -> usize {
        self.kernel.pe_count()
    }
}

impl fmt::Debug for VirtualMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualMachine")
            .field("id", &self.id())
            .field("parent", &self.parent_id())
            .field("local_pet", &self.local_pet)
            .field("pet_count", &self.pet_count())
            .field("pe_count", &self.pe_count())
            .finish()
    }
}
