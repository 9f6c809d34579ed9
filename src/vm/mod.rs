/*!
 * VM Module
 * Virtual machines: PET directory, queries, and cross-VM matching
 */

pub mod kernel;
pub mod machine;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use kernel::VmKernel;
pub use machine::VirtualMachine;
pub use traits::{match_pet_into, TopologyQuery};
pub use types::{PetLocalInfo, PetRecord, PetReport, TopologyReport, VmInfo};
