/*!
 * Partition Property Tests
 * Balanced, contiguous, disjoint splits of a VM's processing elements
 */

use petvm::{DiscoveryConfig, PeId, Registry, SpawnPlan, SpawnPolicy, VmError};
use proptest::prelude::*;
use std::collections::HashSet;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_partitions_cover_parent(images in 1usize..4, cores in 1usize..6, pick in 0usize..64) {
        let reg = Registry::builder()
            .with_config(DiscoveryConfig::new().with_images(images).with_pes_per_image(cores))
            .build();
        let global = reg.initialize().unwrap();
        let total = images * cores;
        let nspawn = pick % total + 1;

        let plan = SpawnPlan::build(&global, nspawn, SpawnPolicy::MaxThreads).unwrap();
        prop_assert_eq!(plan.nspawn(), nspawn);
        prop_assert_eq!(plan.total_pes(), total);

        let sizes: Vec<usize> = plan.partitions().map(|p| p.pe_count()).collect();
        let min = *sizes.iter().min().unwrap();
        let max = *sizes.iter().max().unwrap();
        prop_assert!(min >= 1);
        prop_assert!(max - min <= 1);
        // Larger groups come first
        prop_assert!(sizes.windows(2).all(|w| w[0] >= w[1]));

        // Concatenating the partitions in slot order yields the parent's PEs
        let flat: Vec<PeId> = plan.partitions().flat_map(|p| p.pes.iter().copied()).collect();
        let parent: Vec<PeId> = global.pets().flat_map(|rec| rec.pes().iter().copied()).collect();
        prop_assert_eq!(&flat, &parent);
        let unique: HashSet<PeId> = flat.iter().copied().collect();
        prop_assert_eq!(unique.len(), total);

        reg.finalize().unwrap();
    }

    #[test]
    fn prop_too_many_children_rejected(cores in 1usize..8, extra in 1usize..4) {
        let reg = Registry::builder()
            .with_config(DiscoveryConfig::new().with_images(1).with_pes_per_image(cores))
            .build();
        let global = reg.initialize().unwrap();

        let err = SpawnPlan::build(&global, cores + extra, SpawnPolicy::MaxPes).unwrap_err();
        prop_assert_eq!(err, VmError::InsufficientResources { requested: cores + extra, available: cores });

        reg.finalize().unwrap();
    }
}
