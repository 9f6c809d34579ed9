/*!
 * VM Traits
 * Narrow capability interface shared by the kernel and its handles
 */

use super::types::PetRecord;
use crate::core::errors::VmError;
use crate::core::types::{PetId, VmId, VmResult};
use crate::transport::Communicator;

/// Topology query and transport capability of a virtual machine
pub trait TopologyQuery {
    /// Process-unique id of the VM
    fn vm_id(&self) -> VmId;

    /// PET directory in PET order
    fn directory(&self) -> &[PetRecord];

    /// Transport handle of the VM
    fn communicator(&self) -> &Communicator;

    /// Number of PETs in the directory
    fn pet_count(&self) -> usize {
        self.directory().len()
    }

    /// Number of processing elements held across all PETs
    fn pe_count(&self) -> usize {
        self.directory().iter().map(|rec| rec.pes.len()).sum()
    }

    /// Directory entry of `pet`
    fn record(&self, pet: PetId) -> VmResult<&PetRecord> {
        self.directory().get(pet).ok_or(VmError::OutOfRange {
            vm: self.vm_id(),
            pet,
            pet_count: self.pet_count(),
        })
    }
}

/// Write into `buf` every PET of `other` located where `pet` of `this` runs
///
/// Returns the number of matches in ascending PET order. When it exceeds
/// `buf.len()` the first `buf.len()` matches are written and
/// `BufferTooSmall` is returned.
pub fn match_pet_into<A, B>(this: &A, pet: PetId, other: &B, buf: &mut [usize]) -> VmResult<usize>
where
    A: TopologyQuery + ?Sized,
    B: TopologyQuery + ?Sized,
{
    let target = this.record(pet)?.location;

    let mut count = 0;
    for candidate in other.directory() {
        if candidate.location == target {
            if let Some(slot) = buf.get_mut(count) {
                *slot = candidate.pet;
            }
            count += 1;
        }
    }

    if count > buf.len() {
        return Err(VmError::BufferTooSmall {
            needed: count,
            capacity: buf.len(),
        });
    }
    Ok(count)
}
