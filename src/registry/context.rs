/*!
 * Execution Context Bindings
 *
 * Each OS thread carries its own Current VM per registry. A binding is
 * written once by `initialize` (for the calling thread) or by `startup`
 * (for each launched PET thread) and is only ever read by that thread.
 */

use crate::vm::VirtualMachine;
use ahash::AHashMap;
use std::cell::RefCell;

struct Binding {
    generation: u64,
    vm: VirtualMachine,
}

thread_local! {
    static BINDINGS: RefCell<AHashMap<u64, Binding>> = RefCell::new(AHashMap::new());
}

/// Register `vm` as the calling thread's Current VM for `registry`
pub(crate) fn bind(registry: u64, generation: u64, vm: VirtualMachine) {
    BINDINGS.with(|b| {
        b.borrow_mut().insert(registry, Binding { generation, vm });
    });
}

/// Drop the calling thread's binding for `registry`
pub(crate) fn unbind(registry: u64) {
    // Ignore access after thread-local destruction during thread teardown
    let _ = BINDINGS.try_with(|b| {
        b.borrow_mut().remove(&registry);
    });
}

/// Current VM of the calling thread, if bound in `generation`
pub(crate) fn lookup(registry: u64, generation: u64) -> Option<VirtualMachine> {
    BINDINGS.with(|b| {
        b.borrow()
            .get(&registry)
            .filter(|binding| binding.generation == generation)
            .map(|binding| binding.vm.clone())
    })
}

/// Name of the calling execution context for diagnostics
pub(crate) fn context_name() -> String {
    let current = std::thread::current();
    match current.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", current.id()),
    }
}
