//! Dead code elimination driven by whole-program reachability.
//!
//! Each round runs a fresh [`ReachabilityAnalyzer`] from the entry methods,
//! detaches every type, member, parameter and local it did not find, and then
//! rewrites the surviving bodies so nothing refers to a detached node any
//! more. Rounds repeat until one detaches nothing: removing code can make more
//! code dead, but never the other way around.

use hashbrown::{HashMap, HashSet};
use log::{debug, trace};

use super::reachability::{LiveSet, ReachabilityAnalyzer};
use crate::{
    config::{OptimizerOptions, SCAFFOLDING_TYPES},
    error::{OptimizerResult, ResultExt, ice},
    middle::{
        ir::{
            Body, Expression, ExpressionKind, LocalKind, MethodId, Program, Span, Statement,
            StatementKind,
            rewrite::{
                ExpressionEdits, Position, RewriteContext, Rewriter, StatementEdits,
                rewrite_method,
            },
        },
        type_oracle::TypeOracle,
    },
};

/// What a call to [`DeadCodeEliminator::eliminate`] removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub rounds: usize,
    pub types_removed: usize,
    pub methods_removed: usize,
    pub fields_removed: usize,
    pub parameters_removed: usize,
    pub locals_removed: usize,
    pub bodies_emptied: usize,
    /// Method bodies changed while repairing references to removed nodes
    pub bodies_rewritten: usize,
}

impl PruneStats {
    pub fn changed(&self) -> bool {
        self.removed() > 0 || self.bodies_rewritten > 0
    }

    fn removed(&self) -> usize {
        self.types_removed
            + self.methods_removed
            + self.fields_removed
            + self.parameters_removed
            + self.locals_removed
            + self.bodies_emptied
    }
}

pub struct DeadCodeEliminator {
    options: OptimizerOptions,
}

impl DeadCodeEliminator {
    pub fn new(options: OptimizerOptions) -> Self {
        Self { options }
    }

    /// Removes everything unreachable from the program's entry methods and
    /// installs the final instantiated set in `oracle`. Calling it again on
    /// its own output changes nothing.
    pub fn eliminate(
        &self,
        program: &mut Program,
        oracle: &mut TypeOracle,
    ) -> OptimizerResult<PruneStats> {
        let mut stats = PruneStats::default();

        let live = loop {
            stats.rounds += 1;

            let live = self
                .analyze(program, oracle)
                .context_with(|| format!("in dead code elimination round {}", stats.rounds))?;

            let before = stats.removed();
            let dropped_params = detach_dead(program, &live, &mut stats);
            let removed = stats.removed() - before;

            let rewritten = repair(program, oracle, &live, &dropped_params)
                .context_with(|| format!("in dead code elimination round {}", stats.rounds))?;
            stats.bodies_rewritten += rewritten;

            debug!(
                "pruning round {}: removed {} nodes, rewrote {} bodies, {} live members",
                stats.rounds,
                removed,
                rewritten,
                live.live_members.len()
            );

            // A rewrite may drop the last read of something
            if removed == 0 && rewritten == 0 {
                break live;
            }
        };

        oracle.refresh(program, live.instantiated_types.iter().copied());

        Ok(stats)
    }

    fn analyze(&self, program: &Program, oracle: &TypeOracle) -> OptimizerResult<LiveSet> {
        let mut analyzer = ReachabilityAnalyzer::new(program, oracle);
        analyzer.rescue_entry_methods(&program.entry_methods)?;

        if self.options.preserve_scaffolding_types {
            analyzer.rescue_types_by_name(SCAFFOLDING_TYPES)?;
        }

        Ok(analyzer.into_live_set())
    }
}

/// Per method whose parameter list shrank, which of the original positions
/// were kept
type DroppedParameters = HashMap<MethodId, Vec<bool>>;

fn detach_dead(program: &mut Program, live: &LiveSet, stats: &mut PruneStats) -> DroppedParameters {
    detach_types(program, live, stats);
    detach_members(program, live, stats);
    unlink_detached_methods(program);

    let dropped = detach_parameters(program, live, stats);
    detach_locals(program, live, stats);
    dropped
}

fn detach_types(program: &mut Program, live: &LiveSet, stats: &mut PruneStats) {
    let object = program.well_known.object;
    let order = std::mem::take(&mut program.type_order);
    let mut kept = Vec::with_capacity(order.len());

    for ty in order {
        if ty == object || live.is_referenced(ty) {
            kept.push(ty);
            continue;
        }

        trace!("removing type {}", program.types[ty].name);
        stats.types_removed += 1;

        let declared = &mut program.types[ty];
        declared.pruned = true;
        let methods = declared.methods.clone();
        let fields = declared.fields.clone();

        for method in methods {
            detach_method(program, method);
        }

        for field in fields {
            program.fields[field].pruned = true;
        }
    }

    program.type_order = kept;

    let attached = program.type_order.iter().copied().collect::<HashSet<_>>();
    for &ty in program.type_order.iter() {
        program.types[ty]
            .interfaces
            .retain(|interface| attached.contains(interface));
    }
}

fn detach_method(program: &mut Program, method: MethodId) {
    let locals = program.locals_of(method).collect::<Vec<_>>();

    for local in locals {
        program.locals[local].pruned = true;
    }

    program.methods[method].pruned = true;
}

fn detach_members(program: &mut Program, live: &LiveSet, stats: &mut PruneStats) {
    for ty in program.type_order.clone() {
        let instantiated = live.is_instantiated(ty);

        let fields = std::mem::take(&mut program.types[ty].fields);
        let mut kept_fields = Vec::with_capacity(fields.len());

        for field in fields {
            let declared = &program.fields[field];

            if live.is_field_live(field) && (declared.is_static || instantiated) {
                kept_fields.push(field);
            } else {
                trace!("removing field {}", program.qualified_field_name(field));
                program.fields[field].pruned = true;
                stats.fields_removed += 1;
            }
        }

        program.types[ty].fields = kept_fields;

        let methods = std::mem::take(&mut program.types[ty].methods);
        let mut kept_methods = Vec::with_capacity(methods.len());

        for method in methods {
            let declared = &program.methods[method];

            if declared.is_initializer() {
                // Initializer slots are fixed; a dead initializer only loses
                // its body
                let has_code = declared
                    .body
                    .as_ref()
                    .is_some_and(|body| !body.block.is_empty() || !body.locals.is_empty());

                if !live.is_method_live(method) && has_code {
                    empty_body(program, method);
                    stats.bodies_emptied += 1;
                }

                kept_methods.push(method);
            } else if live.is_method_live(method) && (declared.is_static() || instantiated) {
                kept_methods.push(method);
            } else {
                trace!("removing method {}", program.qualified_method_name(method));
                detach_method(program, method);
                stats.methods_removed += 1;
            }
        }

        program.types[ty].methods = kept_methods;
    }
}

fn empty_body(program: &mut Program, method: MethodId) {
    if let Some(body) = program.methods[method].body.replace(Body::default()) {
        for local in body.locals {
            program.locals[local].pruned = true;
        }
    }
}

fn unlink_detached_methods(program: &mut Program) {
    let attached = program.attached_methods().collect::<HashSet<_>>();

    for &method in attached.iter() {
        let declared = &mut program.methods[method];
        declared.overrides.retain(|m| attached.contains(m));
        declared.overridden_by.retain(|m| attached.contains(m));
    }

    program
        .entry_methods
        .retain(|method| attached.contains(method));
}

/// Drops unread parameters of methods whose signature nothing outside the
/// program depends on
fn detach_parameters(
    program: &mut Program,
    live: &LiveSet,
    stats: &mut PruneStats,
) -> DroppedParameters {
    let entries = program.entry_methods.iter().copied().collect::<HashSet<_>>();
    let mut dropped = DroppedParameters::new();

    for method in program.attached_methods().collect::<Vec<_>>() {
        let declared = &program.methods[method];

        if declared.is_polymorphic()
            || declared.is_foreign
            || declared.is_exported
            || declared.body.is_none()
            || entries.contains(&method)
            || live.foreign_invoked.contains(&method)
        {
            continue;
        }

        let retained = declared
            .params
            .iter()
            .map(|&param| live.is_local_live(param))
            .collect::<Vec<_>>();

        if retained.iter().all(|&keep| keep) {
            continue;
        }

        let params = std::mem::take(&mut program.methods[method].params);
        let mut kept = Vec::with_capacity(params.len());

        for (param, &keep) in params.into_iter().zip(retained.iter()) {
            if keep {
                kept.push(param);
            } else {
                trace!(
                    "removing parameter {} of {}",
                    program.locals[param].name,
                    program.qualified_method_name(method)
                );
                program.locals[param].pruned = true;
                stats.parameters_removed += 1;
            }
        }

        program.methods[method].params = kept;
        dropped.insert(method, retained);
    }

    dropped
}

fn detach_locals(program: &mut Program, live: &LiveSet, stats: &mut PruneStats) {
    for method in program.attached_methods().collect::<Vec<_>>() {
        let Some(body) = program.methods[method].body.as_mut() else {
            continue;
        };

        let locals = std::mem::take(&mut body.locals);
        let mut kept = Vec::with_capacity(locals.len());

        for local in locals {
            let declared = &program.locals[local];

            // Catch bindings are written by the runtime and stay declared
            if live.is_local_live(local) || declared.kind == LocalKind::CatchBinding {
                kept.push(local);
            } else {
                trace!("removing local {}", declared.name);
                program.locals[local].pruned = true;
                stats.locals_removed += 1;
            }
        }

        if let Some(body) = program.methods[method].body.as_mut() {
            body.locals = kept;
        }
    }
}

/// Rewrites every surviving body so it no longer mentions detached nodes.
/// Returns how many bodies changed.
fn repair(
    program: &mut Program,
    oracle: &TypeOracle,
    live: &LiveSet,
    dropped_params: &DroppedParameters,
) -> OptimizerResult<usize> {
    let mut repair = Repair {
        oracle,
        live,
        dropped_params,
    };
    let mut rewritten = 0;

    for method in program.attached_methods().collect::<Vec<_>>() {
        let changed = rewrite_method(program, method, &mut repair)
            .context_with(|| format!("while repairing {}", program.qualified_method_name(method)))?;

        if changed {
            rewritten += 1;
        }
    }

    Ok(rewritten)
}

struct Repair<'a> {
    oracle: &'a TypeOracle,
    live: &'a LiveSet,
    dropped_params: &'a DroppedParameters,
}

impl Repair<'_> {
    fn dead_store(
        &self,
        cx: &RewriteContext<'_>,
        target: &Expression,
    ) -> Option<Vec<Expression>> {
        match &target.kind {
            ExpressionKind::Local(local) if cx.program.locals[*local].pruned => Some(Vec::new()),
            ExpressionKind::Field { instance, field }
                if cx.program.fields[*field].pruned && !self.live.is_field_live(*field) =>
            {
                let mut effects = Vec::new();

                if let Some(instance) = instance {
                    instance.as_ref().clone().into_residual_effects(&mut effects);
                }

                Some(effects)
            }
            _ => None,
        }
    }

    /// Removes the arguments of dropped parameters, keeping their side
    /// effects in evaluation order
    fn drop_arguments(
        &self,
        cx: &mut RewriteContext<'_>,
        edits: &mut ExpressionEdits,
        mut instance: Option<Expression>,
        arguments: &[Expression],
        retained: &[bool],
    ) -> (Option<Expression>, Vec<Expression>, Vec<Expression>) {
        let mut pending = Vec::new();
        let mut kept: Vec<Expression> = Vec::new();

        for (argument, &keep) in arguments.iter().zip(retained.iter()) {
            if keep {
                let effects = std::mem::take(&mut pending);
                kept.push(Expression::sequence_then(effects, argument.clone()));
            } else {
                argument.clone().into_residual_effects(&mut pending);
            }
        }

        if pending.is_empty() {
            return (instance, kept, Vec::new());
        }

        // Effects that trail the last retained operand run right after it
        let last = kept.last_mut().or(instance.as_mut());

        match last {
            Some(operand) => {
                let spilled = self.spill(cx, edits, operand.clone(), pending);
                *operand = spilled;
                (instance, kept, Vec::new())
            }
            None => (instance, kept, pending),
        }
    }

    /// Evaluates `operand`, then `effects`, and yields the operand's value
    fn spill(
        &self,
        cx: &mut RewriteContext<'_>,
        edits: &mut ExpressionEdits,
        operand: Expression,
        effects: Vec<Expression>,
    ) -> Expression {
        let span = operand.span;

        let immutable = matches!(
            operand.kind,
            ExpressionKind::Literal(_) | ExpressionKind::This | ExpressionKind::ClassLiteral(_)
        );
        if immutable {
            return Expression::sequence_then(effects, operand);
        }

        let ty = self.oracle.type_of(cx.program, &operand, cx.method);
        let temporary = cx.new_temporary(ty, span);
        edits.insert_before(Statement::new(
            StatementKind::Declaration {
                local: temporary,
                initializer: None,
            },
            span,
        ));

        let read = Expression::new(ExpressionKind::Local(temporary), span);
        let write = Expression::new(
            ExpressionKind::Assign {
                operator: None,
                target: Box::new(read.clone()),
                value: Box::new(operand),
            },
            span,
        );

        let mut sequence = vec![write];
        sequence.extend(effects);
        sequence.push(read);

        Expression::new(ExpressionKind::Sequence(sequence), span)
    }

    fn null_receiver(
        instance: &Expression,
        arguments: Vec<Expression>,
        span: Span,
    ) -> Expression {
        Expression::new(
            ExpressionKind::NullReceiver {
                instance: Box::new(instance.clone()),
                arguments,
            },
            span,
        )
    }
}

impl Rewriter for Repair<'_> {
    fn rewrite_expression(
        &mut self,
        cx: &mut RewriteContext<'_>,
        expression: &Expression,
        position: Position,
        edits: &mut ExpressionEdits,
    ) -> OptimizerResult<()> {
        let span = expression.span;

        match &expression.kind {
            ExpressionKind::Assign {
                operator,
                target,
                value,
            } => {
                if let Some(mut effects) = self.dead_store(cx, target) {
                    if operator.is_some() {
                        return Err(ice!(
                            format!("{:?}", target.kind),
                            cx.program.method_location(cx.method),
                            "compound assignment to a removed variable"
                        ));
                    }

                    let replacement = if position == Position::Value {
                        Expression::sequence_then(effects, value.as_ref().clone())
                    } else {
                        value.as_ref().clone().into_residual_effects(&mut effects);
                        Expression::effects_only(effects, span)
                    };

                    edits.replace(replacement);
                    return Ok(());
                }

                // Stores through a receiver of a type that is never
                // instantiated
                if let ExpressionKind::Field {
                    instance: Some(instance),
                    field,
                } = &target.kind
                {
                    if cx.program.fields[*field].pruned {
                        edits.replace(Self::null_receiver(
                            instance,
                            vec![value.as_ref().clone()],
                            span,
                        ));
                    }
                }
            }
            ExpressionKind::Field { instance, field } if cx.program.fields[*field].pruned => {
                if position == Position::AssignTarget {
                    return Ok(());
                }

                match instance {
                    Some(instance) => edits.replace(Self::null_receiver(instance, Vec::new(), span)),
                    None => {
                        return Err(ice!(
                            format!("field {}", cx.program.qualified_field_name(*field)),
                            cx.program.method_location(cx.method),
                            "read of a removed static field"
                        ));
                    }
                }
            }
            ExpressionKind::Local(local) if cx.program.locals[*local].pruned => {
                if position != Position::AssignTarget {
                    return Err(ice!(
                        format!("local {}", cx.program.locals[*local].name),
                        cx.program.method_location(cx.method),
                        "read of a removed local"
                    ));
                }
            }
            ExpressionKind::Call {
                instance,
                method,
                arguments,
                dispatch,
            } => {
                if cx.program.methods[*method].pruned {
                    match instance {
                        Some(instance) => {
                            edits.replace(Self::null_receiver(instance, arguments.clone(), span))
                        }
                        None => {
                            return Err(ice!(
                                format!("method {}", cx.program.qualified_method_name(*method)),
                                cx.program.method_location(cx.method),
                                "static call to a removed method"
                            ));
                        }
                    }

                    return Ok(());
                }

                let Some(retained) = self.dropped_params.get(method) else {
                    return Ok(());
                };

                check_arity(cx, *method, arguments.len(), retained.len())?;

                let (instance, arguments, leading) = self.drop_arguments(
                    cx,
                    edits,
                    instance.as_deref().cloned(),
                    arguments,
                    retained,
                );

                let call = Expression::new(
                    ExpressionKind::Call {
                        instance: instance.map(Box::new),
                        method: *method,
                        arguments,
                        dispatch: *dispatch,
                    },
                    span,
                );

                edits.replace(Expression::sequence_then(leading, call));
            }
            ExpressionKind::New {
                class,
                constructor,
                arguments,
            } => {
                let Some(retained) = self.dropped_params.get(constructor) else {
                    return Ok(());
                };

                check_arity(cx, *constructor, arguments.len(), retained.len())?;

                let (_, arguments, leading) =
                    self.drop_arguments(cx, edits, None, arguments, retained);

                let construction = Expression::new(
                    ExpressionKind::New {
                        class: *class,
                        constructor: *constructor,
                        arguments,
                    },
                    span,
                );

                edits.replace(Expression::sequence_then(leading, construction));
            }
            _ => {}
        }

        Ok(())
    }

    fn rewrite_statement(
        &mut self,
        cx: &mut RewriteContext<'_>,
        statement: &Statement,
        edits: &mut StatementEdits,
    ) -> OptimizerResult<()> {
        match &statement.kind {
            StatementKind::Declaration { local, initializer } if cx.program.locals[*local].pruned => {
                let mut effects = Vec::new();

                if let Some(initializer) = initializer {
                    initializer.clone().into_residual_effects(&mut effects);
                }

                if effects.is_empty() {
                    edits.remove();
                } else {
                    edits.replace(Statement::new(
                        StatementKind::Expression(Expression::effects_only(effects, statement.span)),
                        statement.span,
                    ));
                }
            }
            StatementKind::Expression(expression) if !expression.has_side_effects() => {
                edits.remove();
            }
            _ => {}
        }

        Ok(())
    }
}

fn check_arity(
    cx: &RewriteContext<'_>,
    method: MethodId,
    arguments: usize,
    parameters: usize,
) -> OptimizerResult<()> {
    if arguments == parameters {
        return Ok(());
    }

    Err(ice!(
        format!("call to {}", cx.program.qualified_method_name(method)),
        cx.program.method_location(cx.method),
        "call passes {} arguments to {} parameters",
        arguments,
        parameters
    ))
}
