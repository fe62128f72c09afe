//! Type narrowing.
//!
//! Narrows the declared type of every reference slot to the join of the
//! values that can flow into it, then uses the narrower types to simplify
//! casts and instance-of tests, devirtualize calls and mark dereferences of
//! receivers that can only be null.

use hashbrown::HashMap;
use log::{debug, trace};

use super::flow_graph::FlowGraph;
use crate::{
    config::OptimizerOptions,
    error::{OptimizerResult, ResultExt},
    middle::{
        ir::{
            BinaryOperator, Dispatch, Expression, ExpressionKind, Literal, MethodId, Program,
            Type, TypeId,
            rewrite::{ExpressionEdits, Position, RewriteContext, Rewriter, rewrite_method},
        },
        override_graph::OverrideGraph,
        type_oracle::TypeOracle,
    },
};

/// What a call to [`TypeTightener::tighten`] changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TightenStats {
    /// Full passes over the flow graph, including the final quiet one
    pub passes: usize,
    pub slots_narrowed: usize,
    pub casts_removed: usize,
    pub casts_narrowed: usize,
    pub casts_failed: usize,
    pub casts_unchecked: usize,
    pub instance_ofs_simplified: usize,
    pub calls_devirtualized: usize,
    pub null_receivers: usize,
}

impl TightenStats {
    pub fn changed(&self) -> bool {
        self.slots_narrowed > 0 || self.rewrites() > 0
    }

    pub fn rewrites(&self) -> usize {
        self.casts_removed
            + self.casts_narrowed
            + self.casts_failed
            + self.casts_unchecked
            + self.instance_ofs_simplified
            + self.calls_devirtualized
            + self.null_receivers
    }
}

pub struct TypeTightener {
    options: OptimizerOptions,
}

impl TypeTightener {
    pub fn new(options: OptimizerOptions) -> Self {
        Self { options }
    }

    /// Runs narrowing to convergence. `oracle` must describe the instantiated
    /// types of `program`, as left by the dead code eliminator.
    pub fn tighten(
        &self,
        program: &mut Program,
        oracle: &TypeOracle,
    ) -> OptimizerResult<TightenStats> {
        let mut stats = TightenStats::default();
        let overrides = OverrideGraph::new(program);
        let graph = FlowGraph::build(program, oracle, &overrides);

        debug!(
            "flow graph: {} slots, {} edges",
            graph.slots().len(),
            graph.edge_count()
        );

        loop {
            stats.passes += 1;
            let narrowed = narrow_slots(program, oracle, &graph);
            stats.slots_narrowed += narrowed;

            if narrowed == 0 {
                break;
            }
        }

        let mut simplifier = Simplifier {
            oracle,
            overrides: &overrides,
            options: self.options,
            resolved: HashMap::new(),
            stats: &mut stats,
        };

        for method in program.attached_methods().collect::<Vec<_>>() {
            rewrite_method(program, method, &mut simplifier).context_with(|| {
                format!("while narrowing {}", program.qualified_method_name(method))
            })?;
        }

        debug!(
            "narrowing: {} slots narrowed in {} passes, {} rewrites",
            stats.slots_narrowed,
            stats.passes,
            stats.rewrites()
        );

        Ok(stats)
    }
}

/// One full pass over every slot that is not frozen. Returns how many slots
/// got narrower.
fn narrow_slots(program: &mut Program, oracle: &TypeOracle, graph: &FlowGraph) -> usize {
    let mut narrowed = 0;

    for &slot in graph.slots().iter().filter(|&&slot| !graph.is_frozen(slot)) {
        let current = program.slot_type(slot);

        let joined = oracle.join(
            graph
                .sources(slot)
                .iter()
                .map(|source| graph.evaluate(source, program, oracle)),
        );
        let candidate = oracle.stronger_of(oracle.tighten_reference(joined), current);

        if candidate != current {
            trace!(
                "narrowing {slot:?} from {} to {}",
                program.type_name(current),
                program.type_name(candidate)
            );
            program.set_slot_type(slot, candidate);
            narrowed += 1;
        }
    }

    narrowed
}

struct Simplifier<'a> {
    oracle: &'a TypeOracle,
    overrides: &'a OverrideGraph,
    options: OptimizerOptions,
    /// Implementation of a method on a runtime class
    resolved: HashMap<(TypeId, MethodId), Option<MethodId>>,
    stats: &'a mut TightenStats,
}

impl Simplifier<'_> {
    fn type_of(&self, cx: &RewriteContext<'_>, expression: &Expression) -> Type {
        self.oracle.type_of(cx.program, expression, cx.method)
    }

    /// No object other than null can pass a test against `target`
    fn is_impossible(&self, operand: Type, target: TypeId) -> bool {
        self.oracle.is_disjoint(operand, target) || !self.oracle.has_instantiated_subtype(target)
    }

    /// Narrower test target, if the only runtime class below `target` can
    /// stand in for it
    fn narrow_target(&self, target: TypeId) -> Option<TypeId> {
        self.oracle
            .single_concrete_implementor(target)
            .filter(|&single| single != target)
    }

    fn simplify_cast(
        &mut self,
        cx: &RewriteContext<'_>,
        expression: &Expression,
        edits: &mut ExpressionEdits,
    ) {
        let ExpressionKind::Cast {
            target,
            checked,
            operand,
        } = &expression.kind
        else {
            return;
        };

        let operand_type = self.type_of(cx, operand);

        if self.oracle.can_trivially_cast(operand_type, *target) {
            self.stats.casts_removed += 1;
            edits.replace(operand.as_ref().clone());
            return;
        }

        if !self.options.disable_cast_checking && self.is_impossible(operand_type, *target) {
            self.stats.casts_failed += 1;
            edits.replace(Expression::new(
                ExpressionKind::CastFailure {
                    operand: operand.clone(),
                },
                expression.span,
            ));
            return;
        }

        let narrowed = self.narrow_target(*target);
        let unchecked = *checked && self.options.disable_cast_checking;

        if narrowed.is_none() && !unchecked {
            return;
        }

        if narrowed.is_some() {
            self.stats.casts_narrowed += 1;
        }
        if unchecked {
            self.stats.casts_unchecked += 1;
        }

        edits.replace(Expression::new(
            ExpressionKind::Cast {
                target: narrowed.unwrap_or(*target),
                checked: *checked && !self.options.disable_cast_checking,
                operand: operand.clone(),
            },
            expression.span,
        ));
    }

    fn simplify_instance_of(
        &mut self,
        cx: &RewriteContext<'_>,
        expression: &Expression,
        edits: &mut ExpressionEdits,
    ) {
        let ExpressionKind::InstanceOf { test, operand } = &expression.kind else {
            return;
        };

        let span = expression.span;
        let operand_type = self.type_of(cx, operand);

        if operand_type.is_null() || self.is_impossible(operand_type, *test) {
            let mut effects = Vec::new();
            operand.as_ref().clone().into_residual_effects(&mut effects);

            self.stats.instance_ofs_simplified += 1;
            edits.replace(Expression::sequence_then(
                effects,
                Expression::new(ExpressionKind::Literal(Literal::Bool(false)), span),
            ));
            return;
        }

        if self.oracle.can_trivially_cast(operand_type, *test) {
            self.stats.instance_ofs_simplified += 1;
            edits.replace(Expression::new(
                ExpressionKind::Binary {
                    operator: BinaryOperator::NotEquals,
                    lhs: operand.clone(),
                    rhs: Box::new(Expression::new(ExpressionKind::Literal(Literal::Null), span)),
                },
                span,
            ));
            return;
        }

        if let Some(narrowed) = self.narrow_target(*test) {
            self.stats.instance_ofs_simplified += 1;
            edits.replace(Expression::new(
                ExpressionKind::InstanceOf {
                    test: narrowed,
                    operand: operand.clone(),
                },
                span,
            ));
        }
    }

    /// The method a call of `method` runs on an object of runtime class
    /// `class`
    fn resolve(&mut self, program: &Program, class: TypeId, method: MethodId) -> Option<MethodId> {
        if let Some(&resolved) = self.resolved.get(&(class, method)) {
            return resolved;
        }

        let resolved = program.superclass_chain(class).find_map(|ty| {
            program.types[ty].methods.iter().copied().find(|&candidate| {
                let declared = &program.methods[candidate];

                !declared.pruned
                    && !declared.is_abstract
                    && (candidate == method || self.overrides.overrides(candidate).contains(&method))
            })
        });

        self.resolved.insert((class, method), resolved);
        resolved
    }

    /// The single implementation every possible receiver dispatches to
    fn devirtualize(&mut self, program: &Program, receiver: Type, method: MethodId) -> Option<MethodId> {
        let Type::Reference(receiver) = receiver else {
            return None;
        };

        if self.oracle.may_be_foreign(receiver) {
            return None;
        }

        let mut target = None;

        for class in self.oracle.instantiated_subtypes(receiver) {
            let implementation = self.resolve(program, class, method)?;

            match target {
                None => target = Some(implementation),
                Some(existing) if existing == implementation => {}
                Some(_) => return None,
            }
        }

        target.filter(|&implementation| !program.methods[implementation].is_foreign)
    }

    fn null_receiver(
        &mut self,
        instance: &Expression,
        arguments: Vec<Expression>,
        expression: &Expression,
        edits: &mut ExpressionEdits,
    ) {
        self.stats.null_receivers += 1;
        edits.replace(Expression::new(
            ExpressionKind::NullReceiver {
                instance: Box::new(instance.clone()),
                arguments,
            },
            expression.span,
        ));
    }
}

impl Rewriter for Simplifier<'_> {
    fn rewrite_expression(
        &mut self,
        cx: &mut RewriteContext<'_>,
        expression: &Expression,
        position: Position,
        edits: &mut ExpressionEdits,
    ) -> OptimizerResult<()> {
        match &expression.kind {
            ExpressionKind::Cast { .. } => self.simplify_cast(cx, expression, edits),
            ExpressionKind::InstanceOf { .. } => self.simplify_instance_of(cx, expression, edits),
            ExpressionKind::Call {
                instance: Some(instance),
                method,
                arguments,
                dispatch,
            } => {
                if self.type_of(cx, instance).is_null() {
                    self.null_receiver(instance, arguments.clone(), expression, edits);
                    return Ok(());
                }

                if *dispatch != Dispatch::Virtual {
                    return Ok(());
                }

                let receiver = self.type_of(cx, instance);
                if let Some(target) = self.devirtualize(cx.program, receiver, *method) {
                    trace!(
                        "devirtualizing call of {} to {}",
                        cx.program.qualified_method_name(*method),
                        cx.program.qualified_method_name(target)
                    );
                    self.stats.calls_devirtualized += 1;
                    edits.replace(Expression::new(
                        ExpressionKind::Call {
                            instance: Some(instance.clone()),
                            method: target,
                            arguments: arguments.clone(),
                            dispatch: Dispatch::Static,
                        },
                        expression.span,
                    ));
                }
            }
            ExpressionKind::Field {
                instance: Some(instance),
                ..
            } if position != Position::AssignTarget => {
                if self.type_of(cx, instance).is_null() {
                    self.null_receiver(instance, Vec::new(), expression, edits);
                }
            }
            ExpressionKind::Assign { target, value, .. } => {
                if let ExpressionKind::Field {
                    instance: Some(instance),
                    ..
                } = &target.kind
                {
                    if self.type_of(cx, instance).is_null() {
                        self.null_receiver(instance, vec![value.as_ref().clone()], expression, edits);
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::{
        ir::{
            ForeignReference, LocalId, Slot, Statement, StatementKind,
            builder::ProgramBuilder as B,
        },
        optimization::pruner::DeadCodeEliminator,
    };

    struct Chain {
        program: Program,
        c: TypeId,
        x: LocalId,
    }

    /// `A <- B <- C` with `A x = new C()` in the entry method
    fn chain() -> Chain {
        let mut builder = B::new();
        let main = builder.class("Main", None);
        let a = builder.class("A", None);
        let b = builder.class("B", Some(a));
        let c = builder.class("C", Some(b));
        let c_new = builder.constructor(c);
        let run = builder.static_method(main, "run", Type::VOID);
        builder.entry(run);
        let x = builder.local(run, "x", Type::Reference(a));
        builder.push_statement(run, B::declare_local(x, Some(B::new_object(c, c_new, vec![]))));

        Chain {
            program: builder.finish(),
            c,
            x,
        }
    }

    fn optimize(program: &mut Program, options: OptimizerOptions) -> TightenStats {
        let mut oracle = TypeOracle::new(program);
        DeadCodeEliminator::new(options)
            .eliminate(program, &mut oracle)
            .unwrap();
        TypeTightener::new(options).tighten(program, &oracle).unwrap()
    }

    fn body(program: &Program, method: MethodId) -> &[Statement] {
        &program.methods[method].body.as_ref().unwrap().block.statements
    }

    fn expression_of(statement: &Statement) -> &Expression {
        match &statement.kind {
            StatementKind::Expression(expression) => expression,
            kind => panic!("expected an expression statement, found {kind:?}"),
        }
    }

    #[test]
    fn narrows_a_local_to_the_only_assigned_class() {
        let mut chain = chain();
        let stats = optimize(&mut chain.program, OptimizerOptions::default());

        assert_eq!(chain.program.locals[chain.x].ty, Type::Reference(chain.c));
        assert!(stats.changed());
    }

    #[test]
    fn trivially_true_tests_disappear() {
        let mut builder = B::new();
        let main = builder.class("Main", None);
        let a = builder.class("A", None);
        let b = builder.class("B", Some(a));
        let c = builder.class("C", Some(b));
        let c_new = builder.constructor(c);
        let run = builder.static_method(main, "run", Type::VOID);
        builder.entry(run);
        let x = builder.local(run, "x", Type::Reference(a));
        let y = builder.local(run, "y", Type::Reference(c));
        builder.push_statement(run, B::declare_local(x, Some(B::new_object(c, c_new, vec![]))));
        builder.push_statement(run, B::declare_local(y, Some(B::cast(c, B::local_ref(x)))));
        builder.push_statement(
            run,
            B::if_statement(B::instance_of(a, B::local_ref(y)), vec![B::return_value(None)], None),
        );
        let mut program = builder.finish();

        let stats = optimize(&mut program, OptimizerOptions::default());

        assert_eq!(stats.casts_removed, 1);
        assert_eq!(stats.instance_ofs_simplified, 1);
        assert_eq!(
            body(&program, run)[1],
            B::declare_local(y, Some(B::local_ref(x)))
        );
        assert_eq!(
            body(&program, run)[2],
            B::if_statement(
                B::binary(BinaryOperator::NotEquals, B::local_ref(y), B::null()),
                vec![B::return_value(None)],
                None
            )
        );
    }

    #[test]
    fn impossible_casts_become_failures_unless_checking_is_disabled() {
        for disabled in [false, true] {
            let mut builder = B::new();
            let main = builder.class("Main", None);
            let dog = builder.class("Dog", None);
            let dog_new = builder.constructor(dog);
            let cat = builder.class("Cat", None);
            let cat_new = builder.constructor(cat);
            let run = builder.static_method(main, "run", Type::VOID);
            builder.entry(run);
            let object = builder.program().well_known.object;
            let pet = builder.local(run, "pet", Type::Reference(object));
            let sink = builder.static_method(main, "sink", Type::VOID);
            let sunk = builder.param(sink, "sunk", Type::Reference(cat));
            builder.push_statement(
                sink,
                Statement::expression(B::assign(B::local_ref(sunk), B::local_ref(sunk))),
            );
            builder.push_statement(run, B::declare_local(pet, Some(B::new_object(dog, dog_new, vec![]))));
            builder.push_statement(
                run,
                Statement::expression(B::static_call(
                    sink,
                    vec![B::cast(cat, B::local_ref(pet))],
                )),
            );
            builder.push_statement(
                run,
                Statement::expression(B::new_object(cat, cat_new, vec![])),
            );
            let mut program = builder.finish();

            let options = OptimizerOptions {
                disable_cast_checking: disabled,
                ..Default::default()
            };
            optimize(&mut program, options);

            let ExpressionKind::Call { arguments, .. } = &expression_of(&body(&program, run)[1]).kind
            else {
                panic!("expected a call");
            };

            if disabled {
                assert!(matches!(
                    arguments[0].kind,
                    ExpressionKind::Cast { checked: false, .. }
                ));
            } else {
                assert!(matches!(arguments[0].kind, ExpressionKind::CastFailure { .. }));
            }
        }
    }

    #[test]
    fn fields_without_inbound_values_collapse_to_null() {
        let mut builder = B::new();
        let main = builder.class("Main", None);
        let node = builder.class("Node", None);
        let node_new = builder.constructor(node);
        let next = builder.field(node, "next", Type::Reference(node), false);
        let size = builder.method(node, "size", Type::INT);
        builder.push_statement(size, B::return_value(Some(B::int(1))));
        let run = builder.static_method(main, "run", Type::INT);
        builder.entry(run);
        let n = builder.local(run, "n", Type::Reference(node));
        builder.push_statement(run, B::declare_local(n, Some(B::new_object(node, node_new, vec![]))));
        builder.push_statement(
            run,
            B::return_value(Some(B::call(
                B::field_ref(Some(B::local_ref(n)), next),
                size,
                vec![],
            ))),
        );
        let mut program = builder.finish();

        let stats = optimize(&mut program, OptimizerOptions::default());

        assert_eq!(program.slot_type(Slot::Field(next)), Type::Null);
        assert_eq!(stats.null_receivers, 1);
        assert!(matches!(
            &body(&program, run)[1].kind,
            StatementKind::Return(Some(Expression {
                kind: ExpressionKind::NullReceiver { .. },
                ..
            }))
        ));
    }

    #[test]
    fn calls_with_one_possible_target_are_devirtualized() {
        let mut builder = B::new();
        let main = builder.class("Main", None);
        let shape = builder.class("Shape", None);
        builder.set_abstract(shape);
        let area = builder.abstract_method(shape, "area", Type::INT);
        let square = builder.class("Square", Some(shape));
        let square_new = builder.constructor(square);
        let square_area = builder.method(square, "area", Type::INT);
        builder.push_statement(square_area, B::return_value(Some(B::int(4))));
        let circle = builder.class("Circle", Some(shape));
        let circle_area = builder.method(circle, "area", Type::INT);
        builder.push_statement(circle_area, B::return_value(Some(B::int(3))));
        let run = builder.static_method(main, "run", Type::INT);
        builder.entry(run);
        let s = builder.param(run, "s", Type::Reference(shape));
        builder.push_statement(
            run,
            Statement::expression(B::assign(
                B::local_ref(s),
                B::new_object(square, square_new, vec![]),
            )),
        );
        builder.push_statement(
            run,
            B::return_value(Some(B::call(B::local_ref(s), area, vec![]))),
        );
        let mut program = builder.finish();

        let stats = optimize(&mut program, OptimizerOptions::default());

        assert_eq!(stats.calls_devirtualized, 1);
        assert_eq!(
            body(&program, run)[1],
            B::return_value(Some(Expression::new(
                ExpressionKind::Call {
                    instance: Some(Box::new(B::local_ref(s))),
                    method: square_area,
                    arguments: vec![],
                    dispatch: Dispatch::Static,
                },
                Default::default(),
            )))
        );
        assert!(program.methods[circle_area].pruned);
    }

    #[test]
    fn a_second_run_changes_nothing() {
        let mut chain = chain();
        optimize(&mut chain.program, OptimizerOptions::default());

        let oracle = {
            let mut oracle = TypeOracle::new(&chain.program);
            DeadCodeEliminator::new(OptimizerOptions::default())
                .eliminate(&mut chain.program, &mut oracle)
                .unwrap();
            oracle
        };
        let stats = TypeTightener::new(OptimizerOptions::default())
            .tighten(&mut chain.program, &oracle)
            .unwrap();

        assert!(!stats.changed());
        assert_eq!(stats.passes, 1);
    }

    #[test]
    fn slots_written_by_foreign_code_keep_their_declared_type() {
        let mut builder = B::new();
        let main = builder.class("Main", None);
        let animal = builder.interface("Animal", &[]);
        let dog = builder.class("Dog", None);
        builder.implement(dog, animal);
        let dog_new = builder.constructor(dog);
        let pet = builder.field(main, "pet", Type::Reference(animal), true);
        let run = builder.static_method(main, "run", Type::VOID);
        builder.entry(run);
        let written = builder.local(run, "written", Type::Reference(animal));
        let read = builder.local(run, "read", Type::Reference(animal));
        for local in [written, read] {
            builder.push_statement(
                run,
                B::declare_local(local, Some(B::new_object(dog, dog_new, vec![]))),
            );
        }
        builder.push_statement(
            run,
            Statement::expression(B::assign(
                B::field_ref(None, pet),
                B::new_object(dog, dog_new, vec![]),
            )),
        );
        builder.push_statement(
            run,
            Statement::expression(B::foreign(
                "host.swap(written, read, Main.pet)",
                Type::VOID,
                vec![
                    ForeignReference::WriteLocal(written),
                    ForeignReference::ReadLocal(read),
                    ForeignReference::WriteField(pet),
                ],
            )),
        );
        let mut program = builder.finish();

        optimize(&mut program, OptimizerOptions::default());

        assert_eq!(program.slot_type(Slot::Local(written)), Type::Reference(animal));
        assert_eq!(program.slot_type(Slot::Field(pet)), Type::Reference(animal));
        assert_eq!(program.slot_type(Slot::Local(read)), Type::Reference(dog));
    }

    #[test]
    fn catch_bindings_keep_their_declared_type() {
        let mut builder = B::new();
        let main = builder.class("Main", None);
        let failure = builder.class("Failure", None);
        builder.set_abstract(failure);
        let run = builder.static_method(main, "run", Type::VOID);
        builder.entry(run);
        let caught = builder.catch_binding(run, "caught", Type::Reference(failure));
        builder.push_statement(
            run,
            B::try_catch(
                vec![Statement::expression(B::foreign("host.mayFail()", Type::VOID, vec![]))],
                vec![(
                    vec![failure],
                    caught,
                    vec![Statement::expression(B::foreign(
                        "host.report(caught)",
                        Type::VOID,
                        vec![ForeignReference::ReadLocal(caught)],
                    ))],
                )],
            ),
        );
        let mut program = builder.finish();

        optimize(&mut program, OptimizerOptions::default());

        assert_eq!(program.slot_type(Slot::Local(caught)), Type::Reference(failure));
    }

    #[test]
    fn parameters_foreign_code_can_pass_keep_their_declared_type() {
        let mut builder = B::new();
        let main = builder.class("Main", None);
        let animal = builder.interface("Animal", &[]);
        let dog = builder.class("Dog", None);
        builder.implement(dog, animal);
        let dog_new = builder.constructor(dog);
        let run = builder.static_method(main, "run", Type::VOID);
        builder.entry(run);

        let mut params = Vec::new();
        for name in ["exported", "invoked", "internal"] {
            let method = builder.static_method(main, name, Type::VOID);
            let param = builder.param(method, "animal", Type::Reference(animal));
            builder.push_statement(
                method,
                Statement::expression(B::foreign(
                    "host.keep(animal)",
                    Type::VOID,
                    vec![ForeignReference::ReadLocal(param)],
                )),
            );
            builder.push_statement(
                run,
                Statement::expression(B::static_call(
                    method,
                    vec![B::new_object(dog, dog_new, vec![])],
                )),
            );
            params.push((method, param));
        }
        let [(exported, exported_param), (invoked, invoked_param), (_, internal_param)] = params[..]
        else {
            unreachable!();
        };
        builder.export(exported);
        builder.push_statement(
            run,
            Statement::expression(B::foreign(
                "host.later(Main.invoked)",
                Type::VOID,
                vec![ForeignReference::Invoke(invoked)],
            )),
        );
        let mut program = builder.finish();

        optimize(&mut program, OptimizerOptions::default());

        assert_eq!(program.slot_type(Slot::Local(exported_param)), Type::Reference(animal));
        assert_eq!(program.slot_type(Slot::Local(invoked_param)), Type::Reference(animal));
        assert_eq!(program.slot_type(Slot::Local(internal_param)), Type::Reference(dog));
    }

    #[test]
    fn overridden_returns_cover_what_overriders_return() {
        let mut builder = B::new();
        let main = builder.class("Main", None);
        let animal = builder.class("Animal", None);
        let dog = builder.class("Dog", Some(animal));
        let dog_new = builder.constructor(dog);
        let cat = builder.class("Cat", Some(animal));
        let cat_new = builder.constructor(cat);
        let base = builder.class("Base", None);
        let base_new = builder.constructor(base);
        let base_make = builder.method(base, "make", Type::Reference(animal));
        builder.push_statement(
            base_make,
            B::return_value(Some(B::new_object(dog, dog_new, vec![]))),
        );
        let sub = builder.class("Sub", Some(base));
        let sub_new = builder.constructor(sub);
        let sub_make = builder.method(sub, "make", Type::Reference(animal));
        builder.push_statement(
            sub_make,
            B::return_value(Some(B::new_object(cat, cat_new, vec![]))),
        );
        let run = builder.static_method(main, "run", Type::VOID);
        builder.entry(run);
        let flag = builder.param(run, "flag", Type::BOOLEAN);
        let maker = builder.local(run, "maker", Type::Reference(base));
        builder.push_statement(
            run,
            B::declare_local(
                maker,
                Some(B::conditional(
                    B::local_ref(flag),
                    B::new_object(base, base_new, vec![]),
                    B::new_object(sub, sub_new, vec![]),
                )),
            ),
        );
        builder.push_statement(
            run,
            Statement::expression(B::call(B::local_ref(maker), base_make, vec![])),
        );
        let mut program = builder.finish();

        optimize(&mut program, OptimizerOptions::default());

        assert_eq!(program.slot_type(Slot::Return(sub_make)), Type::Reference(cat));
        assert_eq!(program.slot_type(Slot::Return(base_make)), Type::Reference(animal));
    }

    #[test]
    fn casts_to_a_type_with_one_runtime_class_are_narrowed() {
        let mut builder = B::new();
        let main = builder.class("Main", None);
        let shape = builder.class("Shape", None);
        builder.set_abstract(shape);
        let square = builder.class("Square", Some(shape));
        let square_new = builder.constructor(square);
        let object = builder.program().well_known.object;
        let run = builder.static_method(main, "run", Type::Reference(shape));
        builder.entry(run);
        let input = builder.param(run, "input", Type::Reference(object));
        builder.push_statement(
            run,
            Statement::expression(B::new_object(square, square_new, vec![])),
        );
        builder.push_statement(
            run,
            B::return_value(Some(B::cast(shape, B::local_ref(input)))),
        );
        let mut program = builder.finish();

        let stats = optimize(&mut program, OptimizerOptions::default());

        assert_eq!(stats.casts_narrowed, 1);
        assert_eq!(
            body(&program, run)[1],
            B::return_value(Some(B::cast(square, B::local_ref(input))))
        );
    }
}
