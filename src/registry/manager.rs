/*!
 * Process-Wide Registry
 *
 * Explicit replacement for global/current singletons. A `Registry` owns one
 * bring-up of the host topology:
 *
 * - `Uninitialized -> Initialized` via `initialize()`
 * - `Initialized -> Finalized` via `finalize()`, after which it may be
 *   initialized again
 *
 * It publishes the Global VM, tracks which VM owns each processing element,
 * and tracks live child VMs so teardown can refuse to run while children
 * are outstanding. Registries are independent; tests build one each.
 */

use super::builder::RegistryBuilder;
use super::context;
use crate::core::errors::VmError;
use crate::core::types::{PeId, VmId, VmResult};
use crate::spawn::startup;
use crate::spawn::types::{ChildRecord, ChildState};
use crate::spawn::{SpawnPlan, Spawned};
use crate::topology::{Topology, TopologyDiscovery};
use crate::transport::Transport;
use crate::vm::kernel::{next_vm_id, VmKernel};
use crate::vm::{TopologyQuery, VirtualMachine};
use ahash::RandomState;
use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Registry lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryState {
    Uninitialized,
    Initialized,
    Finalized,
}

pub(crate) struct RegistryInner {
    pub(crate) id: u64,
    pub(crate) transport: Arc<dyn Transport>,
    discovery: TopologyDiscovery,
    state: Mutex<RegistryState>,
    generation: AtomicU64,
    global: ArcSwapOption<VirtualMachine>,
    topology: ArcSwapOption<Topology>,
    owners: DashMap<PeId, VmId, RandomState>,
    children: DashMap<VmId, ChildRecord, RandomState>,
    retire_lock: Mutex<()>,
}

/// Handle to one process-wide registry
#[derive(Clone)]
pub struct Registry {
    pub(crate) inner: Arc<RegistryInner>,
}

impl Registry {
    /// Registry over the local transport and detected hardware
    pub fn new() -> Self {
        RegistryBuilder::new().build()
    }

    /// Create a builder for constructing a Registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub(crate) fn from_parts(transport: Arc<dyn Transport>, discovery: TopologyDiscovery) -> Self {
        let id = NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed);
        debug!(registry = id, transport = transport.name(), "Registry created");
        Self {
            inner: Arc::new(RegistryInner {
                id,
                transport,
                discovery,
                state: Mutex::new(RegistryState::Uninitialized),
                generation: AtomicU64::new(0),
                global: ArcSwapOption::empty(),
                topology: ArcSwapOption::empty(),
                owners: DashMap::with_hasher(RandomState::new()),
                children: DashMap::with_hasher(RandomState::new()),
                retire_lock: Mutex::new(()),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> RegistryState {
        *self.inner.state.lock()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.global.load().is_some()
    }

    /// Topology discovered by the current bring-up
    pub fn topology(&self) -> VmResult<Arc<Topology>> {
        self.inner.topology.load_full().ok_or(VmError::NotInitialized)
    }

    /// Bring up the Global VM and make it Current for the calling thread
    pub fn initialize(&self) -> VmResult<VirtualMachine> {
        let mut state = self.inner.state.lock();
        if let Some(global) = self.inner.global.load_full() {
            return Err(VmError::AlreadyInitialized { global: global.id() });
        }

        let topology = self.inner.discovery.discover()?;
        let world = self
            .inner
            .transport
            .init(topology.pe_count())
            .map_err(|e| {
                tracing::error!(
                    transport = self.inner.transport.name(),
                    error = %e,
                    "Transport bring-up failed"
                );
                VmError::TransportInit(e.to_string())
            })?;

        let kernel = Arc::new(VmKernel::global(next_vm_id(), &topology, world));
        let global = VirtualMachine::new(kernel, 0);

        self.inner.owners.clear();
        for pe in topology.pes() {
            self.inner.owners.insert(pe, global.id());
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.topology.store(Some(Arc::new(topology)));
        self.inner.global.store(Some(Arc::new(global.clone())));
        *state = RegistryState::Initialized;

        context::bind(self.inner.id, generation, global.clone());

        info!(
            registry = self.inner.id,
            vm = global.id(),
            pets = global.pet_count(),
            transport = self.inner.transport.name(),
            "Global VM initialized"
        );
        Ok(global)
    }

    /// Tear down the Global VM
    ///
    /// Transport teardown errors are logged and not reported; the registry
    /// is reset regardless.
    pub fn finalize(&self) -> VmResult<()> {
        let mut state = self.inner.state.lock();
        let global = self.inner.global.load_full().ok_or(VmError::NotInitialized)?;

        let outstanding = self.inner.children.len();
        if outstanding > 0 {
            warn!(registry = self.inner.id, outstanding, "Finalize refused");
            return Err(VmError::OutstandingChildren { count: outstanding });
        }

        if let Err(e) = self.inner.transport.finalize(global.communicator()) {
            warn!(error = %e, "Transport finalize failed");
        }

        self.inner.global.store(None);
        self.inner.topology.store(None);
        self.inner.owners.clear();
        *state = RegistryState::Finalized;
        context::unbind(self.inner.id);

        info!(registry = self.inner.id, vm = global.id(), "Global VM finalized");
        Ok(())
    }

    /// The Global VM
    pub fn global(&self) -> VmResult<VirtualMachine> {
        self.inner
            .global
            .load_full()
            .map(|vm| (*vm).clone())
            .ok_or(VmError::NotInitialized)
    }

    /// The VM registered for the calling execution context
    ///
    /// Never falls back to the Global VM.
    pub fn current(&self) -> VmResult<VirtualMachine> {
        if !self.is_initialized() {
            return Err(VmError::NotInitialized);
        }
        let generation = self.inner.generation.load(Ordering::SeqCst);
        context::lookup(self.inner.id, generation).ok_or_else(|| VmError::NoContext {
            context: context::context_name(),
        })
    }

    /// Launch the children described by `plan`
    ///
    /// Blocks until every child PET is launched and bound, not until the
    /// entry functions return. See [`Spawned::join`].
    pub fn startup<C, R, F>(&self, plan: SpawnPlan, entry: F, cargo: C) -> VmResult<Spawned<R>>
    where
        C: Clone + Send + 'static,
        R: Send + 'static,
        F: Fn(C, VirtualMachine) -> R + Send + Sync + 'static,
    {
        startup::launch(self, plan, entry, cargo)
    }

    /// Number of spawned child VMs not yet retired
    pub fn outstanding_children(&self) -> usize {
        self.inner.children.len()
    }

    /// Lifecycle state of a live child VM
    pub fn child_state(&self, vm: VmId) -> Option<ChildState> {
        self.inner.children.get(&vm).map(|rec| rec.state)
    }

    /// VM currently owning `pe`
    pub fn pe_owner(&self, pe: PeId) -> Option<VmId> {
        self.inner.owners.get(&pe).map(|owner| *owner)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Move `pes` from `parent` to `child`; all or nothing
    pub(crate) fn claim_pes(&self, parent: VmId, child: VmId, pes: &[PeId]) -> Result<(), String> {
        for (i, pe) in pes.iter().enumerate() {
            let claimed = match self.inner.owners.get_mut(pe) {
                Some(mut owner) if *owner == parent => {
                    *owner = child;
                    None
                }
                Some(owner) => Some(format!("{} is held by VM {}", pe, *owner)),
                None => Some(format!("{} is not known to this registry", pe)),
            };
            if let Some(reason) = claimed {
                self.release_pes(child, parent, &pes[..i]);
                return Err(reason);
            }
        }
        Ok(())
    }

    /// Return `pes` held by `child` to `parent`
    pub(crate) fn release_pes(&self, child: VmId, parent: VmId, pes: &[PeId]) {
        for pe in pes {
            if let Some(mut owner) = self.inner.owners.get_mut(pe) {
                if *owner == child {
                    *owner = parent;
                }
            }
        }
    }

    pub(crate) fn register_child(&self, vm: VmId, record: ChildRecord) {
        self.inner.children.insert(vm, record);
    }

    pub(crate) fn set_child_state(&self, vm: VmId, state: ChildState) {
        if let Some(mut rec) = self.inner.children.get_mut(&vm) {
            rec.state = state;
        }
    }

    /// Forget a child VM and give its PETs' resources back to the parent
    ///
    /// Children the VM spawned that are still live are handed to its
    /// parent, so their PEs return there when they retire. PEs they hold
    /// stay with them until then.
    pub(crate) fn retire_child(&self, kernel: &VmKernel) {
        let _serial = self.inner.retire_lock.lock();
        if let Some((vm, rec)) = self.inner.children.remove(&kernel.id()) {
            let mut adopted = 0;
            for mut orphan in self.inner.children.iter_mut() {
                if orphan.parent == vm {
                    orphan.parent = rec.parent;
                    adopted += 1;
                }
            }
            if adopted > 0 {
                warn!(
                    vm,
                    parent = rec.parent,
                    adopted,
                    "Retired VM had live children; re-parented"
                );
            }

            self.release_pes(vm, rec.parent, &rec.pes);
            if let Err(e) = self.inner.transport.release(kernel.communicator()) {
                warn!(vm, error = %e, "Failed to release child communicator");
            }
            debug!(vm, parent = rec.parent, slot = rec.slot, "Child VM retired");
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("transport", &self.inner.transport.name())
            .field("children", &self.inner.children.len())
            .finish()
    }
}
