/*!
 * Registry Module
 * Bring-up/teardown and per-context Current VM resolution
 */

pub mod builder;
pub(crate) mod context;
pub mod manager;

// Re-export for convenience
pub use builder::RegistryBuilder;
pub use manager::{Registry, RegistryState};
