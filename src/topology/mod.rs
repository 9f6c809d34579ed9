/*!
 * Topology Module
 * Hardware discovery for bring-up
 */

pub mod discovery;
pub mod types;

// Re-export for convenience
pub use discovery::{DiscoveryConfig, TopologyDiscovery};
pub use types::{ImageInfo, Topology};
