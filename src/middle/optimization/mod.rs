//! Whole-program optimization passes.
//!
//! Dead code elimination and type narrowing feed each other: pruning shrinks
//! the set of instantiated types, which lets narrowing pick tighter types,
//! and devirtualized calls can leave more code dead. [`Optimizer`] alternates
//! the two until narrowing has nothing left to do.

pub mod flow_graph;
pub mod pruner;
pub mod reachability;
pub mod tightener;

use log::{debug, info, warn};
use serde::Serialize;

use self::{
    pruner::{DeadCodeEliminator, PruneStats},
    tightener::{TightenStats, TypeTightener},
};
use crate::{
    config::OptimizerOptions,
    error::{OptimizerResult, ResultExt},
    middle::{ir::Program, type_oracle::TypeOracle},
};

/// Totals over every round of an [`Optimizer::optimize`] run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OptimizationStats {
    pub rounds: usize,
    pub types_removed: usize,
    pub methods_removed: usize,
    pub fields_removed: usize,
    pub parameters_removed: usize,
    pub locals_removed: usize,
    pub bodies_emptied: usize,
    pub slots_narrowed: usize,
    pub casts_removed: usize,
    pub casts_failed: usize,
    pub calls_devirtualized: usize,
    pub null_receivers: usize,
    /// The round cap was hit before narrowing stopped changing the program
    pub hit_round_limit: bool,
}

impl OptimizationStats {
    fn add_pruning(&mut self, stats: &PruneStats) {
        self.types_removed += stats.types_removed;
        self.methods_removed += stats.methods_removed;
        self.fields_removed += stats.fields_removed;
        self.parameters_removed += stats.parameters_removed;
        self.locals_removed += stats.locals_removed;
        self.bodies_emptied += stats.bodies_emptied;
    }

    fn add_narrowing(&mut self, stats: &TightenStats) {
        self.slots_narrowed += stats.slots_narrowed;
        self.casts_removed += stats.casts_removed;
        self.casts_failed += stats.casts_failed;
        self.calls_devirtualized += stats.calls_devirtualized;
        self.null_receivers += stats.null_receivers;
    }
}

pub struct Optimizer {
    options: OptimizerOptions,
}

impl Optimizer {
    pub fn new(options: OptimizerOptions) -> Self {
        Self { options }
    }

    /// Optimizes `program` in place and returns the oracle describing the
    /// result, ready for fragment partitioning
    pub fn optimize(&self, program: &mut Program) -> OptimizerResult<(TypeOracle, OptimizationStats)> {
        program.validate()?;

        let eliminator = DeadCodeEliminator::new(self.options);
        let tightener = TypeTightener::new(self.options);

        let mut oracle = TypeOracle::new(program);
        let mut stats = OptimizationStats::default();

        loop {
            stats.rounds += 1;

            let pruned = eliminator
                .eliminate(program, &mut oracle)
                .context_with(|| format!("in optimization round {}", stats.rounds))?;
            stats.add_pruning(&pruned);

            let narrowed = tightener
                .tighten(program, &oracle)
                .context_with(|| format!("in optimization round {}", stats.rounds))?;
            stats.add_narrowing(&narrowed);

            debug!(
                "optimization round {}: pruning changed {}, narrowing changed {}",
                stats.rounds,
                pruned.changed(),
                narrowed.changed()
            );

            if !narrowed.changed() {
                break;
            }

            if stats.rounds >= self.options.max_rounds {
                warn!(
                    "stopping after {} rounds although narrowing still changes the program",
                    stats.rounds
                );
                stats.hit_round_limit = true;

                // Leave nothing behind that refers to what narrowing made dead
                let pruned = eliminator.eliminate(program, &mut oracle)?;
                stats.add_pruning(&pruned);
                break;
            }
        }

        info!(
            "optimized in {} rounds: {} types, {} methods and {} fields removed, {} slots narrowed",
            stats.rounds,
            stats.types_removed,
            stats.methods_removed,
            stats.fields_removed,
            stats.slots_narrowed
        );

        Ok((oracle, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::Index,
        middle::ir::{MethodId, Statement, Type, builder::ProgramBuilder as B},
    };

    #[test]
    fn stops_once_narrowing_changes_nothing() {
        let mut builder = B::new();
        let main = builder.class("Main", None);
        let unused = builder.class("Unused", None);
        builder.static_method(unused, "idle", Type::VOID);
        let run = builder.static_method(main, "run", Type::VOID);
        builder.entry(run);
        let mut program = builder.finish();

        let (_, stats) = Optimizer::new(OptimizerOptions::default())
            .optimize(&mut program)
            .unwrap();

        assert_eq!(stats.rounds, 1);
        assert_eq!(stats.types_removed, 1);
        assert!(!stats.hit_round_limit);
    }

    #[test]
    fn round_cap_is_honored() {
        let mut builder = B::new();
        let main = builder.class("Main", None);
        let a = builder.class("A", None);
        let b = builder.class("B", Some(a));
        let b_new = builder.constructor(b);
        let run = builder.static_method(main, "run", Type::VOID);
        builder.entry(run);
        let x = builder.local(run, "x", Type::Reference(a));
        builder.push_statement(run, B::declare_local(x, Some(B::new_object(b, b_new, vec![]))));
        builder.push_statement(
            run,
            B::if_statement(B::instance_of(b, B::local_ref(x)), vec![B::return_value(None)], None),
        );
        let mut program = builder.finish();

        let options = OptimizerOptions {
            max_rounds: 1,
            ..Default::default()
        };
        let (_, stats) = Optimizer::new(options).optimize(&mut program).unwrap();

        assert_eq!(stats.rounds, 1);
        assert!(stats.hit_round_limit);
        assert_eq!(program.locals[x].ty, Type::Reference(b));
    }

    #[test]
    fn dangling_ids_are_internal_errors_not_panics() {
        let mut builder = B::new();
        let main = builder.class("Main", None);
        let run = builder.static_method(main, "run", Type::VOID);
        builder.entry(run);
        let missing = MethodId::new(1000);
        builder.push_statement(run, Statement::expression(B::static_call(missing, vec![])));
        let mut program = builder.finish();

        let error = Optimizer::new(OptimizerOptions::default())
            .optimize(&mut program)
            .unwrap_err();

        assert_eq!(error.message, "dangling method id");
        assert_eq!(error.node, "method M1000");
    }
}
