mod common;

use globopt::{
    OptimizerOptions,
    middle::{
        optimization::{pruner::DeadCodeEliminator, reachability::ReachabilityAnalyzer},
        type_oracle::TypeOracle,
    },
};
use proptest::prelude::*;

use common::{hierarchy, hierarchy_with_entries, select};

proptest! {
    #[test]
    fn live_sets_grow_with_the_entry_set(
        (hierarchy, first) in hierarchy_with_entries(),
        extra in prop::collection::vec(any::<bool>(), 4),
    ) {
        let generated = hierarchy.build();
        let program = &generated.program;
        let oracle = TypeOracle::new(program);

        let smaller = select(&generated.functions, &first);
        let mask = first
            .iter()
            .zip(extra.iter().chain(std::iter::repeat(&false)))
            .map(|(a, b)| *a || *b)
            .collect::<Vec<_>>();
        let larger = select(&generated.functions, &mask);

        let small = ReachabilityAnalyzer::analyze(program, &oracle, &smaller).unwrap();
        let large = ReachabilityAnalyzer::analyze(program, &oracle, &larger).unwrap();

        prop_assert!(small.is_subset_of(&large));
    }

    #[test]
    fn live_sets_do_not_depend_on_traversal_order((hierarchy, mask) in hierarchy_with_entries()) {
        let generated = hierarchy.build();
        let entries = select(&generated.functions, &mask);

        let oracle = TypeOracle::new(&generated.program);
        let forward = ReachabilityAnalyzer::analyze(&generated.program, &oracle, &entries).unwrap();

        let mut permuted = generated.program.clone();
        permuted.type_order.reverse();
        for declared in permuted.types.iter_mut() {
            let initializers = if declared.is_interface() { 1 } else { 2 };
            if declared.methods.len() > initializers {
                declared.methods[initializers..].reverse();
            }
            declared.fields.reverse();
            declared.interfaces.reverse();
        }
        let reversed = entries.iter().rev().copied().collect::<Vec<_>>();
        let oracle = TypeOracle::new(&permuted);
        let backward = ReachabilityAnalyzer::analyze(&permuted, &oracle, &reversed).unwrap();

        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn extending_an_analysis_matches_a_fresh_one((hierarchy, mask) in hierarchy_with_entries()) {
        let generated = hierarchy.build();
        let program = &generated.program;
        let oracle = TypeOracle::new(program);
        let entries = select(&generated.functions, &mask);
        let (first, rest) = entries.split_at(entries.len() / 2);

        let mut extended = ReachabilityAnalyzer::new(program, &oracle);
        extended.rescue_entry_methods(first).unwrap();
        extended.rescue_entry_methods(rest).unwrap();

        let fresh = ReachabilityAnalyzer::analyze(program, &oracle, &entries).unwrap();

        prop_assert_eq!(extended.into_live_set(), fresh);
    }

    #[test]
    fn elimination_is_idempotent((hierarchy, mask) in hierarchy_with_entries()) {
        let generated = hierarchy.build();
        let mut program = generated.program;
        program.entry_methods = select(&generated.functions, &mask);

        let eliminator = DeadCodeEliminator::new(OptimizerOptions::default());
        let mut oracle = TypeOracle::new(&program);
        eliminator.eliminate(&mut program, &mut oracle).unwrap();

        let once = program.clone();
        let stats = eliminator.eliminate(&mut program, &mut oracle).unwrap();

        prop_assert!(!stats.changed());
        prop_assert_eq!(once, program);
    }

    #[test]
    fn generated_programs_always_build(shape in hierarchy()) {
        let generated = shape.build();
        prop_assert_eq!(generated.classes.len(), shape.parents.len());
        prop_assert_eq!(generated.functions.len(), shape.bodies.len());
    }
}
