/*!
 * Startup
 *
 * Launch protocol for the children of a `SpawnPlan`:
 *
 * 1. Claim every partition's PEs from the parent and derive a communicator
 * 2. Build the child VM kernel and register the child as `Created`
 * 3. Start one OS thread per child PET; each binds its Current VM and acks
 * 4. Once every PET has acked, mark children `Running` and release the gate
 *
 * Any failure before step 4 closes the gate, so already-started threads exit
 * without running entry code, and every claim is rolled back. The caller
 * only waits for launch confirmation; `Spawned::join` waits for completion.
 */

use super::plan::SpawnPlan;
use super::types::{ChildOutcome, ChildRecord, ChildSlot, ChildState};
use crate::core::errors::VmError;
use crate::core::limits::{MAX_SPAWN_DEPTH, PET_THREAD_STACK_SIZE};
use crate::core::types::{VmId, VmResult};
use crate::monitoring::{span_pet, LaunchSpan};
use crate::registry::context;
use crate::registry::Registry;
use crate::vm::kernel::{next_vm_id, VmKernel};
use crate::vm::{TopologyQuery, VirtualMachine};
use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn, Span};

/// A child VM between launch and retirement
struct ChildHandle<R> {
    slot: ChildSlot,
    kernel: Arc<VmKernel>,
    threads: Vec<JoinHandle<Option<R>>>,
}

impl<R> ChildHandle<R> {
    fn index(&self) -> usize {
        self.slot.partition.slot
    }
}

/// Children launched by one `startup` call
///
/// Dropping an unjoined handle joins and retires the children.
pub struct Spawned<R> {
    registry: Registry,
    children: Vec<ChildHandle<R>>,
}

impl<R> Spawned<R> {
    /// Number of child VMs
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Child VM of `slot`, viewed from its PET 0
    pub fn child(&self, slot: usize) -> Option<VirtualMachine> {
        self.children
            .iter()
            .find(|c| c.index() == slot)
            .map(|c| VirtualMachine::new(Arc::clone(&c.kernel), 0))
    }

    /// All child VMs in slot order
    pub fn children(&self) -> Vec<VirtualMachine> {
        self.children
            .iter()
            .map(|c| VirtualMachine::new(Arc::clone(&c.kernel), 0))
            .collect()
    }

    /// Lifecycle state of the child in `slot`, as tracked by the registry
    pub fn state(&self, slot: usize) -> Option<ChildState> {
        let child = self.children.iter().find(|c| c.index() == slot)?;
        Some(
            self.registry
                .child_state(child.kernel.id())
                .unwrap_or(ChildState::Retired),
        )
    }

    pub fn vm_ids(&self) -> Vec<VmId> {
        self.children.iter().map(|c| c.kernel.id()).collect()
    }

    /// Wait for every child PET's entry to return, then retire the children
    pub fn join(mut self) -> Vec<ChildOutcome<R>> {
        let children = std::mem::take(&mut self.children);
        children
            .into_iter()
            .map(|child| retire(&self.registry, child))
            .collect()
    }
}

impl<R> Drop for Spawned<R> {
    fn drop(&mut self) {
        if self.children.is_empty() {
            return;
        }
        warn!(
            children = self.children.len(),
            "Spawned handle dropped without join; joining children"
        );
        for child in std::mem::take(&mut self.children) {
            retire(&self.registry, child);
        }
    }
}

fn retire<R>(registry: &Registry, mut child: ChildHandle<R>) -> ChildOutcome<R> {
    let slot = child.index();
    let results = child
        .threads
        .drain(..)
        .enumerate()
        .map(|(pet, handle)| match handle.join() {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(VmError::LaunchError {
                slot,
                reason: format!("PET {} exited before running entry", pet),
            }),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(vm = child.kernel.id(), pet, %message, "Entry panicked");
                Err(VmError::EntryPanicked { slot, pet, message })
            }
        })
        .collect();

    registry.retire_child(&child.kernel);

    ChildOutcome {
        slot,
        vm: child.kernel.id(),
        results,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Children created so far, for rollback
struct Launch<R> {
    registry: Registry,
    children: Vec<ChildHandle<R>>,
}

impl<R> Launch<R> {
    /// Close the gate, wait for started threads to exit, undo every claim
    fn abort(self, gate: flume::Sender<()>) {
        drop(gate);
        for child in self.children {
            for handle in child.threads {
                let _ = handle.join();
            }
            self.registry.retire_child(&child.kernel);
        }
    }
}

fn launch_error(slot: usize, reason: impl Into<String>) -> VmError {
    VmError::LaunchError {
        slot,
        reason: reason.into(),
    }
}

pub(crate) fn launch<C, R, F>(
    registry: &Registry,
    plan: SpawnPlan,
    entry: F,
    cargo: C,
) -> VmResult<Spawned<R>>
where
    C: Clone + Send + 'static,
    R: Send + 'static,
    F: Fn(C, VirtualMachine) -> R + Send + Sync + 'static,
{
    let caller = registry.current()?;
    if !caller.same_vm(plan.parent()) {
        return Err(launch_error(
            0,
            format!(
                "caller runs in VM {}, plan was built for VM {}",
                caller.id(),
                plan.parent_id()
            ),
        ));
    }

    let span = LaunchSpan::new(plan.parent_id(), plan.nspawn());
    let _entered = span.enter();

    let result = launch_children(registry, plan, entry, cargo, span.span());
    match &result {
        Ok(spawned) => {
            let pets: usize = spawned.children.iter().map(|c| c.threads.len()).sum();
            span.record_launched(pets);
            info!(
                trace_id = %span.trace_id(),
                children = spawned.len(),
                pets,
                "Child VMs launched"
            );
        }
        Err(e) => {
            span.record_error(&e.to_string());
            error!(trace_id = %span.trace_id(), error = %e, "Startup aborted");
        }
    }
    result
}

fn launch_children<C, R, F>(
    registry: &Registry,
    plan: SpawnPlan,
    entry: F,
    cargo: C,
    launch_span: &Span,
) -> VmResult<Spawned<R>>
where
    C: Clone + Send + 'static,
    R: Send + 'static,
    F: Fn(C, VirtualMachine) -> R + Send + Sync + 'static,
{
    let (parent, policy, slots) = plan.into_parts();
    let depth = parent.depth() + 1;
    if depth > MAX_SPAWN_DEPTH {
        return Err(launch_error(
            0,
            format!("spawn depth {} exceeds {}", depth, MAX_SPAWN_DEPTH),
        ));
    }

    let (gate_tx, gate_rx) = flume::unbounded::<()>();
    let mut launch = Launch {
        registry: registry.clone(),
        children: Vec::with_capacity(slots.len()),
    };

    // Claim resources and build kernels
    for slot in slots {
        let index = slot.partition.slot;
        let child_id = next_vm_id();

        if let Err(reason) = registry.claim_pes(parent.id(), child_id, &slot.partition.pes) {
            launch.abort(gate_tx);
            return Err(launch_error(index, reason));
        }

        let groups = policy.pet_groups(&slot.partition.pes);
        let comm = match registry
            .inner
            .transport
            .derive(parent.communicator(), groups.len())
        {
            Ok(comm) => comm,
            Err(e) => {
                registry.release_pes(child_id, parent.id(), &slot.partition.pes);
                launch.abort(gate_tx);
                return Err(launch_error(index, format!("transport: {}", e)));
            }
        };

        let kernel = Arc::new(VmKernel::new(
            child_id,
            Some(parent.id()),
            depth,
            groups,
            policy.thread_compat(),
            comm,
        ));
        registry.register_child(
            child_id,
            ChildRecord {
                parent: parent.id(),
                slot: index,
                state: ChildState::Created,
                pes: slot.partition.pes.clone(),
            },
        );
        debug!(vm = child_id, slot = index, pets = kernel.pet_count(), "Child VM created");

        launch.children.push(ChildHandle {
            slot,
            kernel,
            threads: Vec::new(),
        });
    }

    // Start PET threads
    let (ack_tx, ack_rx) = flume::unbounded::<()>();
    let entry = Arc::new(entry);
    let registry_id = registry.id();
    let generation = registry.generation();
    let mut spawn_failure = None;

    'spawn: for child in launch.children.iter_mut() {
        for pet in 0..child.kernel.pet_count() {
            let vm = VirtualMachine::new(Arc::clone(&child.kernel), pet);
            let entry = Arc::clone(&entry);
            let cargo = cargo.clone();
            let ack = ack_tx.clone();
            let gate = gate_rx.clone();
            let pet_span = span_pet(launch_span, child.kernel.id(), pet);

            let spawned = thread::Builder::new()
                .name(format!("petvm-{}-pet{}", child.kernel.id(), pet))
                .stack_size(PET_THREAD_STACK_SIZE)
                .spawn(move || {
                    context::bind(registry_id, generation, vm.clone());
                    let _ = ack.send(());
                    drop(ack);

                    if gate.recv().is_err() {
                        context::unbind(registry_id);
                        return None;
                    }

                    let _entered = pet_span.entered();
                    debug!("Entry started");
                    let result = entry(cargo, vm);
                    context::unbind(registry_id);
                    Some(result)
                });

            match spawned {
                Ok(handle) => child.threads.push(handle),
                Err(e) => {
                    spawn_failure = Some(launch_error(child.index(), format!("thread: {}", e)));
                    break 'spawn;
                }
            }
        }
    }
    drop(ack_tx);

    if let Some(err) = spawn_failure {
        launch.abort(gate_tx);
        return Err(err);
    }

    // Wait for launch confirmation from every PET
    let total: usize = launch.children.iter().map(|c| c.threads.len()).sum();
    for confirmed in 0..total {
        if ack_rx.recv().is_err() {
            launch.abort(gate_tx);
            return Err(launch_error(
                0,
                format!("only {} of {} PETs confirmed launch", confirmed, total),
            ));
        }
    }

    for child in &launch.children {
        registry.set_child_state(child.kernel.id(), ChildState::Running);
    }
    for _ in 0..total {
        let _ = gate_tx.send(());
    }

    let Launch { registry, children } = launch;
    Ok(Spawned { registry, children })
}
