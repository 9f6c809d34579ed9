/*!
 * PET VM Library
 * Virtual process topology: host discovery, Global/Current VM registry,
 * VM queries, and child VM spawning
 */

pub mod core;
pub mod monitoring;
pub mod registry;
pub mod spawn;
pub mod topology;
pub mod transport;
pub mod vm;

// Re-exports
pub use crate::core::errors::{SerializableError, VmError};
pub use crate::core::types::{ImageId, Location, PeId, PetId, ThreadId, VmId, VmResult};
pub use monitoring::{init_tracing, LaunchSpan};
pub use registry::{Registry, RegistryBuilder, RegistryState};
pub use spawn::{ChildOutcome, ChildState, Partition, SpawnPlan, SpawnPolicy, Spawned};
pub use topology::{DiscoveryConfig, ImageInfo, Topology, TopologyDiscovery};
pub use transport::{
    CommId, Communicator, Endpoint, Envelope, LocalTransport, Transport, TransportError,
    TransportResult,
};
pub use vm::{
    PetLocalInfo, PetRecord, PetReport, TopologyQuery, TopologyReport, VirtualMachine, VmInfo,
};
