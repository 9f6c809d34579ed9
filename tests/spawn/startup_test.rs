/*!
 * Startup Tests
 * Child VM launch, Current binding, retirement, and failure atomicity
 */

use petvm::{
    ChildState, DiscoveryConfig, PeId, PetId, Registry, SpawnPlan, SpawnPolicy, Spawned,
    VirtualMachine, VmError, VmId, VmResult,
};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn registry(images: usize, pes: usize) -> Registry {
    Registry::builder()
        .with_config(
            DiscoveryConfig::new()
                .with_images(images)
                .with_pes_per_image(pes),
        )
        .build()
}

/// Entry that reports the Current VM seen by each child PET
fn whoami(reg: Registry, vm: VirtualMachine) -> VmResult<(VmId, PetId)> {
    let current = reg.current()?;
    assert!(current.same_vm(&vm));
    assert_eq!(current.local_pet(), vm.local_pet());
    Ok((current.id(), current.local_pet()))
}

#[test]
fn test_four_pe_host_two_children() {
    let reg = registry(1, 4);
    let global = reg.initialize().unwrap();
    assert_eq!(global.pet_count(), 4);
    assert_eq!(global.pet_local_info(2).unwrap().image_id, 0);

    let plan = SpawnPlan::build(&global, 2, SpawnPolicy::MaxThreads).unwrap();
    let spawned = reg.startup(plan, whoami, reg.clone()).unwrap();
    assert_eq!(spawned.len(), 2);

    let children = spawned.children();
    let total: usize = children.iter().map(|c| c.pet_count()).sum();
    assert_eq!(total, 4);

    let mut claimed = HashSet::new();
    for child in &children {
        assert_eq!(child.parent_id(), Some(global.id()));
        assert_eq!(child.depth(), 1);
        assert_eq!(reg.child_state(child.id()), Some(ChildState::Running));
        for rec in child.pets() {
            for pe in rec.pes() {
                assert!(claimed.insert(*pe), "{} claimed twice", pe);
                assert_eq!(reg.pe_owner(*pe), Some(child.id()));
            }
        }
    }
    assert_eq!(claimed.len(), 4);

    assert_eq!(
        reg.finalize().unwrap_err(),
        VmError::OutstandingChildren { count: 2 }
    );

    let ids = spawned.vm_ids();
    let outcomes = spawned.join();
    assert_eq!(outcomes.len(), 2);
    for (outcome, id) in outcomes.iter().zip(&ids) {
        assert!(outcome.is_success());
        assert_eq!(outcome.vm, *id);
        for (pet, result) in outcome.results.iter().enumerate() {
            assert_eq!(result.as_ref().unwrap().as_ref().unwrap(), &(*id, pet));
        }
    }

    assert_eq!(reg.outstanding_children(), 0);
    for core in 0..4 {
        assert_eq!(reg.pe_owner(PeId::new(0, core)), Some(global.id()));
    }
    reg.finalize().unwrap();
}

#[test]
fn test_entry_runs_once_per_child_pet() {
    let reg = registry(2, 3);
    let global = reg.initialize().unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let plan = SpawnPlan::build(&global, 3, SpawnPolicy::MaxThreads).unwrap();
    let spawned = reg
        .startup(
            plan,
            |runs: Arc<AtomicUsize>, _vm| {
                runs.fetch_add(1, Ordering::SeqCst);
            },
            Arc::clone(&runs),
        )
        .unwrap();
    let outcomes = spawned.join();

    assert_eq!(outcomes.len(), 3);
    assert_eq!(runs.load(Ordering::SeqCst), 6);
    reg.finalize().unwrap();
}

#[test]
fn test_max_pes_child_folds_per_image() {
    let reg = registry(2, 2);
    let global = reg.initialize().unwrap();

    let plan = SpawnPlan::build(&global, 1, SpawnPolicy::MaxPes).unwrap();
    assert_eq!(plan.child_pet_count(0), Some(2));

    let spawned = reg.startup(plan, |_: (), vm| vm.pet_count(), ()).unwrap();
    let child = spawned.child(0).unwrap();
    assert!(child.thread_compat());
    assert_eq!(child.pet_count(), 2);
    assert_eq!(child.pe_count(), 4);

    let info = child.pet_local_info(1).unwrap();
    assert_eq!(info.image_id, 1);
    assert_eq!(info.pe_count, 2);
    assert_eq!(info.thread_group_size, 1);

    for outcome in spawned.join() {
        assert!(outcome.results.into_iter().all(|r| r.unwrap() == 2));
    }
    reg.finalize().unwrap();
}

#[test]
fn test_conflicting_spawn_fails_atomically() {
    let reg = registry(1, 4);
    let global = reg.initialize().unwrap();

    let first = SpawnPlan::build(&global, 2, SpawnPolicy::MaxThreads).unwrap();
    let second = SpawnPlan::build(&global, 1, SpawnPolicy::MaxThreads).unwrap();

    let running = reg.startup(first, |_: (), _vm| (), ()).unwrap();
    let owners: Vec<_> = (0..4).map(|c| reg.pe_owner(PeId::new(0, c))).collect();

    let err = reg.startup(second, |_: (), _vm| (), ()).err().unwrap();
    assert!(matches!(err, VmError::LaunchError { slot: 0, .. }));

    // Nothing from the failed attempt is left behind
    assert_eq!(reg.outstanding_children(), 2);
    let after: Vec<_> = (0..4).map(|c| reg.pe_owner(PeId::new(0, c))).collect();
    assert_eq!(owners, after);

    running.join();
    reg.finalize().unwrap();
}

#[test]
fn test_startup_from_unregistered_thread() {
    let reg = registry(1, 2);
    let global = reg.initialize().unwrap();
    let plan = SpawnPlan::build(&global, 1, SpawnPolicy::MaxThreads).unwrap();

    let other = reg.clone();
    let result = thread::spawn(move || {
        other
            .startup(plan, |_: (), _vm| (), ())
            .map(|spawned| spawned.len())
    })
    .join()
    .unwrap();

    assert!(matches!(result, Err(VmError::NoContext { .. })));
    assert_eq!(reg.outstanding_children(), 0);
    reg.finalize().unwrap();
}

#[test]
fn test_nested_spawn() {
    let reg = registry(1, 4);
    let global = reg.initialize().unwrap();

    // One child PET holding all four PEs, which splits them again
    let plan = SpawnPlan::build(&global, 1, SpawnPolicy::MaxPes).unwrap();
    let spawned = reg
        .startup(
            plan,
            |reg: Registry, vm: VirtualMachine| -> VmResult<Vec<(Option<VmId>, u32, usize)>> {
                let plan = SpawnPlan::build(&vm, 2, SpawnPolicy::MaxThreads)?;
                let grandchildren = reg.startup(
                    plan,
                    |_: (), vm: VirtualMachine| (vm.parent_id(), vm.depth(), vm.pet_count()),
                    (),
                )?;
                grandchildren
                    .join()
                    .into_iter()
                    .flat_map(|outcome| outcome.results)
                    .collect()
            },
            reg.clone(),
        )
        .unwrap();

    let child_id = spawned.vm_ids()[0];
    let outcomes = spawned.join();
    let seen = outcomes[0].results[0].as_ref().unwrap().as_ref().unwrap();

    assert_eq!(seen.len(), 4);
    for (parent, depth, pets) in seen {
        assert_eq!(*parent, Some(child_id));
        assert_eq!(*depth, 2);
        assert_eq!(*pets, 2);
    }

    assert_eq!(reg.outstanding_children(), 0);
    reg.finalize().unwrap();
}

#[test]
fn test_entry_panic_reported_per_pet() {
    let reg = registry(1, 2);
    let global = reg.initialize().unwrap();

    let plan = SpawnPlan::build(&global, 1, SpawnPolicy::MaxThreads).unwrap();
    let spawned = reg
        .startup(
            plan,
            |_: (), vm: VirtualMachine| {
                if vm.local_pet() == 1 {
                    panic!("boom");
                }
                vm.local_pet()
            },
            (),
        )
        .unwrap();

    let outcome = spawned.join().pop().unwrap();
    assert!(!outcome.is_success());
    assert_eq!(outcome.failed_pets(), vec![1]);
    assert_eq!(outcome.results[0], Ok(0));
    assert_eq!(
        outcome.results[1],
        Err(VmError::EntryPanicked {
            slot: 0,
            pet: 1,
            message: "boom".to_string()
        })
    );

    // Retired despite the panic
    reg.finalize().unwrap();
}

#[test]
fn test_dropped_handle_retires_children() {
    let reg = registry(1, 3);
    let global = reg.initialize().unwrap();

    let plan = SpawnPlan::build(&global, 3, SpawnPolicy::MaxThreads).unwrap();
    let spawned = reg.startup(plan, |_: (), _vm| (), ()).unwrap();
    assert_eq!(reg.outstanding_children(), 3);

    drop(spawned);
    assert_eq!(reg.outstanding_children(), 0);
    reg.finalize().unwrap();
}

#[test]
fn test_child_pets_exchange_messages() {
    let reg = registry(1, 4);
    let global = reg.initialize().unwrap();

    let plan = SpawnPlan::build(&global, 1, SpawnPolicy::MaxThreads).unwrap();
    let spawned = reg
        .startup(
            plan,
            |_: (), vm: VirtualMachine| {
                let ep = vm.endpoint().unwrap();
                let next = (vm.local_pet() + 1) % vm.pet_count();
                ep.send(next, vec![vm.local_pet() as u8]).unwrap();
                let env = ep.recv().unwrap();
                (env.source, env.payload[0] as usize)
            },
            (),
        )
        .unwrap();

    let outcome = spawned.join().pop().unwrap();
    for (pet, result) in outcome.results.into_iter().enumerate() {
        let (source, payload) = result.unwrap();
        assert_eq!(source, (pet + 3) % 4);
        assert_eq!(payload, source);
    }
    reg.finalize().unwrap();
}

#[test]
fn test_child_communicator_released_on_retire() {
    let reg = registry(1, 2);
    let global = reg.initialize().unwrap();

    let plan = SpawnPlan::build(&global, 1, SpawnPolicy::MaxThreads).unwrap();
    let spawned = reg.startup(plan, |_: (), _vm| (), ()).unwrap();
    let child = spawned.child(0).unwrap();
    assert!(!child.communicator().is_closed());
    assert_ne!(child.communicator().id(), global.communicator().id());

    spawned.join();
    assert!(child.communicator().is_closed());
    assert!(!global.communicator().is_closed());
    reg.finalize().unwrap();
}

#[test]
fn test_startup_returns_before_entries_finish() {
    let reg = registry(1, 2);
    let global = reg.initialize().unwrap();
    let (release_tx, release_rx) = flume::unbounded::<()>();
    let finished = Arc::new(AtomicUsize::new(0));

    let plan = SpawnPlan::build(&global, 1, SpawnPolicy::MaxThreads).unwrap();
    let spawned = reg
        .startup(
            plan,
            |(release, finished): (flume::Receiver<()>, Arc<AtomicUsize>), _vm| {
                let released = release.recv_timeout(Duration::from_secs(5)).is_ok();
                finished.fetch_add(1, Ordering::SeqCst);
                released
            },
            (release_rx, Arc::clone(&finished)),
        )
        .unwrap();

    // Every PET is launched and parked inside its entry
    assert_eq!(spawned.state(0), Some(ChildState::Running));
    assert_eq!(finished.load(Ordering::SeqCst), 0);

    for _ in 0..2 {
        release_tx.send(()).unwrap();
    }
    let outcome = spawned.join().pop().unwrap();
    assert_eq!(outcome.results, vec![Ok(true), Ok(true)]);
    assert_eq!(finished.load(Ordering::SeqCst), 2);
    reg.finalize().unwrap();
}

#[test]
fn test_child_retired_before_its_own_children() {
    let reg = registry(1, 4);
    let global = reg.initialize().unwrap();

    // The child hands its unjoined grandchildren back to the caller
    let plan = SpawnPlan::build(&global, 1, SpawnPolicy::MaxPes).unwrap();
    let spawned = reg
        .startup(
            plan,
            |reg: Registry, vm: VirtualMachine| -> VmResult<Spawned<()>> {
                let plan = SpawnPlan::build(&vm, 2, SpawnPolicy::MaxThreads)?;
                reg.startup(plan, |_: (), _vm| (), ())
            },
            reg.clone(),
        )
        .unwrap();

    let mut outcomes = spawned.join();
    assert_eq!(reg.outstanding_children(), 2);

    let grandchildren = outcomes
        .pop()
        .unwrap()
        .results
        .pop()
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(grandchildren.join().iter().all(|o| o.is_success()));

    assert_eq!(reg.outstanding_children(), 0);
    for core in 0..4 {
        assert_eq!(reg.pe_owner(PeId::new(0, core)), Some(global.id()));
    }

    // The PEs can be handed out again
    let plan = SpawnPlan::build(&global, 4, SpawnPolicy::MaxThreads).unwrap();
    let again = reg.startup(plan, |_: (), _vm| (), ()).unwrap();
    assert_eq!(again.join().len(), 4);
    reg.finalize().unwrap();
}

#[test]
fn test_spawned_state_follows_registry() {
    let reg = registry(1, 2);
    let global = reg.initialize().unwrap();

    let plan = SpawnPlan::build(&global, 2, SpawnPolicy::MaxThreads).unwrap();
    assert_eq!(plan.state(1), Some(ChildState::Planned));

    let spawned = reg.startup(plan, |_: (), _vm| (), ()).unwrap();
    assert_eq!(spawned.state(1), Some(ChildState::Running));
    assert_eq!(spawned.state(2), None);

    spawned.join();
    assert_eq!(reg.outstanding_children(), 0);
    reg.finalize().unwrap();
}
