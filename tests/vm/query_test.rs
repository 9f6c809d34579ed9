/*!
 * VM Query Tests
 * Directory shape, placement records, and diagnostics reports
 */

use petvm::{DiscoveryConfig, Location, PeId, Registry, TopologyReport, VmError};
use pretty_assertions::assert_eq;
use std::collections::HashSet;

fn registry(images: usize, pes: usize) -> Registry {
    Registry::builder()
        .with_config(
            DiscoveryConfig::new()
                .with_images(images)
                .with_pes_per_image(pes),
        )
        .build()
}

#[test]
fn test_directory_is_dense() {
    let reg = registry(3, 2);
    let global = reg.initialize().unwrap();

    assert_eq!(global.pets().count(), global.pet_count());
    for (i, rec) in global.pets().enumerate() {
        assert_eq!(rec.pet(), i);
    }
    reg.finalize().unwrap();
}

#[test]
fn test_info_of_global_vm() {
    let reg = registry(1, 4);
    let global = reg.initialize().unwrap();

    let info = global.info();
    assert_eq!(info.local_pet, 0);
    assert_eq!(info.pet_count, 4);
    assert_eq!(info.pe_count, 4);
    assert_eq!(&info.communicator, global.communicator());
    assert!(!info.thread_compat);
    reg.finalize().unwrap();
}

#[test]
fn test_global_placement_is_image_major() {
    let reg = registry(2, 3);
    let global = reg.initialize().unwrap();

    for pet in 0..6 {
        let info = global.pet_local_info(pet).unwrap();
        assert_eq!(info.image_id, pet / 3);
        assert_eq!(info.thread_id, pet % 3);
        assert_eq!(info.thread_group_size, 3);
        assert_eq!(info.pe_count, 1);
        assert_eq!(
            global.pet_pes(pet).unwrap(),
            &[PeId::new(pet / 3, pet % 3)][..]
        );
    }
    reg.finalize().unwrap();
}

#[test]
fn test_locations_unique_within_vm() {
    let reg = registry(2, 4);
    let global = reg.initialize().unwrap();

    let locations: HashSet<Location> = (0..global.pet_count())
        .map(|pet| global.pet_local_info(pet).unwrap().location())
        .collect();
    assert_eq!(locations.len(), global.pet_count());
    reg.finalize().unwrap();
}

#[test]
fn test_out_of_range_pet() {
    let reg = registry(1, 4);
    let global = reg.initialize().unwrap();

    assert_eq!(
        global.pet_local_info(4).unwrap_err(),
        VmError::OutOfRange {
            vm: global.id(),
            pet: 4,
            pet_count: 4
        }
    );
    assert!(global.pet_pes(usize::MAX).is_err());
    reg.finalize().unwrap();
}

#[test]
fn test_report_serializes() {
    let reg = registry(1, 2);
    let global = reg.initialize().unwrap();

    let report = global.report();
    assert_eq!(report.vm, global.id());
    assert_eq!(report.parent, None);
    assert_eq!(report.pets.len(), 2);

    let json = serde_json::to_value(&report).unwrap();
    assert!(json.get("parent").is_none());
    assert!(json.get("depth").is_none());
    assert_eq!(json["pets"][1]["image_id"], 0);
    assert_eq!(json["pets"][1]["thread_id"], 1);

    let back: TopologyReport = serde_json::from_value(json).unwrap_or_else(|e| panic!("{}", e));
    assert_eq!(back.pet_count, 2);
    reg.finalize().unwrap();
}
