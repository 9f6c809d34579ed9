/*!
 * Topology Limits and Constants
 *
 * Centralized location for the bounds applied to discovered or configured
 * hardware and to spawned execution contexts.
 */

// =============================================================================
// DISCOVERY LIMITS
// =============================================================================

/// Maximum number of shared-memory images a host model may describe
pub const MAX_IMAGES: usize = 1024;

/// Maximum number of cores per image
/// Upper bound for the PE directory of a single image
pub const MAX_PES_PER_IMAGE: usize = 4096;

/// Fallback core count when hardware parallelism cannot be detected
pub const FALLBACK_PES: usize = 1;

// =============================================================================
// SPAWN LIMITS
// =============================================================================

/// Stack size for PET threads created by Startup (2MB)
/// Matches the default stack of `std::thread::spawn`
pub const PET_THREAD_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Maximum nesting depth of spawned VMs
/// Depth 0 is the Global VM
pub const MAX_SPAWN_DEPTH: u32 = 64;

// =============================================================================
// TRANSPORT LIMITS
// =============================================================================

/// Maximum number of ranks in one communicator
pub const MAX_COMMUNICATOR_SIZE: usize = MAX_IMAGES * MAX_PES_PER_IMAGE;

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Number of images to model
pub const ENV_IMAGES: &str = "PETVM_IMAGES";

/// Cores per image
pub const ENV_PES_PER_IMAGE: &str = "PETVM_PES_PER_IMAGE";

/// Whether the Global VM permits nested thread-level parallelism
pub const ENV_THREAD_COMPAT: &str = "PETVM_THREAD_COMPAT";

/// JSON tracing output toggle
pub const ENV_TRACE_JSON: &str = "PETVM_TRACE_JSON";

/// Number of children the demo binary spawns from the Global VM
pub const ENV_DEMO_SPAWN: &str = "PETVM_DEMO_SPAWN";

pub const DEFAULT_DEMO_SPAWN: usize = 2;
