/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::{PetId, VmId};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Topology layer errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum VmError {
    #[error("Registry already initialized (global VM {global})")]
    #[diagnostic(
        code(vm::already_initialized),
        help("Call finalize() before initializing the registry again.")
    )]
    AlreadyInitialized { global: VmId },

    #[error("Registry not initialized")]
    #[diagnostic(
        code(vm::not_initialized),
        help("Call initialize() to bring up the global VM first.")
    )]
    NotInitialized,

    #[error("Transport initialization failed: {0}")]
    #[diagnostic(
        code(vm::transport_init),
        help("No global VM can exist without a working transport. Check the transport configuration.")
    )]
    TransportInit(String),

    #[error("No VM registered for execution context '{context}'")]
    #[diagnostic(
        code(vm::no_context),
        help("Only the initializing thread and threads launched by startup() have a current VM.")
    )]
    NoContext { context: String },

    #[error("PET {pet} out of range (VM {vm} has {pet_count} PETs)")]
    #[diagnostic(
        code(vm::out_of_range),
        help("PET ids are dense in [0, pet_count).")
    )]
    OutOfRange {
        vm: VmId,
        pet: PetId,
        pet_count: usize,
    },

    #[error("Match buffer too small: {needed} matches, capacity {capacity}")]
    #[diagnostic(
        code(vm::buffer_too_small),
        help("The first `capacity` matches were written. Retry with a buffer of at least `needed` entries.")
    )]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("Insufficient resources: {requested} children requested, {available} PEs available")]
    #[diagnostic(
        code(vm::insufficient_resources),
        help("Each spawned child needs at least one processing element.")
    )]
    InsufficientResources { requested: usize, available: usize },

    #[error("Invalid spawn count: {0}")]
    #[diagnostic(code(vm::invalid_spawn_count), help("A spawn plan needs at least one child."))]
    InvalidSpawnCount(usize),

    #[error("Launch of child slot {slot} failed: {reason}")]
    #[diagnostic(
        code(vm::launch_error),
        help("No child of this plan was left running. Retry once the conflicting spawn has retired.")
    )]
    LaunchError { slot: usize, reason: String },

    #[error("Entry function panicked on PET {pet} of child slot {slot}: {message}")]
    #[diagnostic(code(vm::entry_panicked))]
    EntryPanicked {
        slot: usize,
        pet: PetId,
        message: String,
    },

    #[error("{count} spawned child VMs not retired")]
    #[diagnostic(
        code(vm::outstanding_children),
        help("Join every Spawned handle before finalizing the registry.")
    )]
    OutstandingChildren { count: usize },

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(vm::configuration_error),
        help("Invalid configuration. Review PETVM_* environment variables and builder parameters.")
    )]
    Config(String),
}

impl VmError {
    /// Whether the caller can retry with corrected arguments
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, VmError::TransportInit(_))
    }
}

/// Serializable error representation for reports
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SerializableError {
    pub error_type: String,
    pub message: String,
}

impl From<&VmError> for SerializableError {
    fn from(err: &VmError) -> Self {
        let error_type = match err {
            VmError::AlreadyInitialized { .. } => "already_initialized",
            VmError::NotInitialized => "not_initialized",
            VmError::TransportInit(_) => "transport_init",
            VmError::NoContext { .. } => "no_context",
            VmError::OutOfRange { .. } => "out_of_range",
            VmError::BufferTooSmall { .. } => "buffer_too_small",
            VmError::InsufficientResources { .. } => "insufficient_resources",
            VmError::InvalidSpawnCount(_) => "invalid_spawn_count",
            VmError::LaunchError { .. } => "launch_error",
            VmError::EntryPanicked { .. } => "entry_panicked",
            VmError::OutstandingChildren { .. } => "outstanding_children",
            VmError::Config(_) => "configuration_error",
        };
        Self {
            error_type: error_type.to_string(),
            message: err.to_string(),
        }
    }
}
