/*!
 * Spawn Module
 * Partitioning a VM's processing elements and launching child VMs
 */

pub mod plan;
pub mod startup;
pub mod types;

// Re-export for convenience
pub use plan::SpawnPlan;
pub use startup::Spawned;
pub use types::{ChildOutcome, ChildState, Partition, SpawnPolicy};
