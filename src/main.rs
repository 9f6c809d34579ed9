/*!
 * PET VM - Topology Demo
 *
 * Brings up the Global VM on the detected (or overridden) host, prints its
 * topology report, spawns child VMs across its processing elements and has
 * every child PET locate itself in the Global VM.
 */

use miette::IntoDiagnostic;
use petvm::core::limits::{DEFAULT_DEMO_SPAWN, ENV_DEMO_SPAWN};
use petvm::{init_tracing, PetId, Registry, SpawnPlan, SpawnPolicy, VirtualMachine, VmError, VmId};
use serde::Serialize;
use tracing::{info, warn};

/// What one child PET learned about itself
#[derive(Debug, Serialize)]
struct PetSighting {
    vm: VmId,
    pet: PetId,
    image: usize,
    thread: usize,
    global_pets: Vec<PetId>,
}

fn demo_spawn_count(available: usize) -> miette::Result<usize> {
    let requested = match std::env::var(ENV_DEMO_SPAWN) {
        Ok(raw) => raw.trim().parse::<usize>().map_err(|e| {
            VmError::Config(format!("{}={:?} is not a count: {}", ENV_DEMO_SPAWN, raw, e))
        })?,
        Err(_) => DEFAULT_DEMO_SPAWN,
    };
    if requested > available {
        warn!(requested, available, "Capping spawn count to available PEs");
    }
    Ok(requested.clamp(1, available.max(1)))
}

fn locate(registry: Registry, vm: VirtualMachine) -> Result<PetSighting, VmError> {
    let current = registry.current()?;
    debug_assert!(current.same_vm(&vm));

    let global = registry.global()?;
    let info = vm.pet_local_info(vm.local_pet())?;
    let global_pets = vm.match_pet(vm.local_pet(), &global)?;

    Ok(PetSighting {
        vm: vm.id(),
        pet: vm.local_pet(),
        image: info.image_id,
        thread: info.thread_id,
        global_pets,
    })
}

fn main() -> miette::Result<()> {
    init_tracing();

    info!("PET VM starting...");
    let registry = Registry::builder().with_env_config()?.build();
    let global = registry.initialize()?;

    let report = serde_json::to_string_pretty(&global.report()).into_diagnostic()?;
    println!("{}", report);

    let nspawn = demo_spawn_count(global.pe_count())?;
    let plan = SpawnPlan::build(&global, nspawn, SpawnPolicy::default())?;
    let spawned = registry.startup(plan, locate, registry.clone())?;

    for child in spawned.children() {
        let report = serde_json::to_string_pretty(&child.report()).into_diagnostic()?;
        println!("{}", report);
    }

    for outcome in spawned.join() {
        for result in outcome.results {
            match result.and_then(|located| located) {
                Ok(sighting) => {
                    println!("{}", serde_json::to_string(&sighting).into_diagnostic()?)
                }
                Err(e) => warn!(vm = outcome.vm, error = %e, "Child PET failed"),
            }
        }
    }

    registry.finalize()?;
    info!("PET VM finished");
    Ok(())
}
