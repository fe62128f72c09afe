//! Whole-program liveness.
//!
//! Starting from a set of entry methods the analyzer rescues every method,
//! field, local, type and string literal that code reachable from those
//! entries can touch. The result is the least fixed point of the rescue rules
//! and does not depend on the order in which the program is traversed.
//!
//! An analyzer can be cloned and extended with more entry methods, which is
//! how the fragment partitioner asks "what would be live without entry i"
//! without redoing the shared part of the work.

use std::sync::Arc;

use hashbrown::HashSet;
use itertools::Itertools;
use log::trace;

use crate::{
    error::{InternalCompilerError, OptimizerResult, ice},
    middle::{
        ir::{
            Body, CatchClause, Expression, ExpressionKind, FieldId, ForeignCode, ForeignReference,
            Literal, LocalId, MethodId, Program, SpecialCategory, Type, TypeId,
            visit::{Visitor, walk_catch_clause, walk_expression},
        },
        override_graph::OverrideGraph,
        type_oracle::TypeOracle,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Member {
    Method(MethodId),
    Field(FieldId),
    Local(LocalId),
}

/// Everything a reachability analysis found to be needed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSet {
    pub referenced_types: HashSet<TypeId>,
    /// Types an object may exist of, including the supertypes of such objects.
    /// Always a subset of `referenced_types`.
    pub instantiated_types: HashSet<TypeId>,
    pub live_members: HashSet<Member>,
    pub live_strings: HashSet<String>,
    /// Methods foreign code invokes by name. Their parameter lists are part
    /// of a contract the optimizer cannot see.
    pub foreign_invoked: HashSet<MethodId>,
}

impl LiveSet {
    pub fn is_referenced(&self, ty: TypeId) -> bool {
        self.referenced_types.contains(&ty)
    }

    pub fn is_instantiated(&self, ty: TypeId) -> bool {
        self.instantiated_types.contains(&ty)
    }

    pub fn is_method_live(&self, method: MethodId) -> bool {
        self.live_members.contains(&Member::Method(method))
    }

    pub fn is_field_live(&self, field: FieldId) -> bool {
        self.live_members.contains(&Member::Field(field))
    }

    pub fn is_local_live(&self, local: LocalId) -> bool {
        self.live_members.contains(&Member::Local(local))
    }

    pub fn is_string_live(&self, string: &str) -> bool {
        self.live_strings.contains(string)
    }

    pub fn is_subset_of(&self, other: &LiveSet) -> bool {
        self.referenced_types.is_subset(&other.referenced_types)
            && self.instantiated_types.is_subset(&other.instantiated_types)
            && self.live_members.is_subset(&other.live_members)
            && self.live_strings.is_subset(&other.live_strings)
            && self.foreign_invoked.is_subset(&other.foreign_invoked)
    }

    pub fn live_methods(&self) -> impl Iterator<Item = MethodId> + '_ {
        self.live_members.iter().filter_map(|member| match member {
            Member::Method(method) => Some(*method),
            _ => None,
        })
    }

    pub fn live_fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.live_members.iter().filter_map(|member| match member {
            Member::Field(field) => Some(*field),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReachabilityAnalyzer<'p> {
    program: &'p Program,
    oracle: &'p TypeOracle,
    overrides: Arc<OverrideGraph>,
    live: LiveSet,
    /// Live methods whose bodies have not been scanned yet
    worklist: Vec<MethodId>,
    /// Method whose body is being scanned
    current: Option<MethodId>,
    /// First invariant violation seen while scanning
    fault: Option<InternalCompilerError>,
}

impl<'p> ReachabilityAnalyzer<'p> {
    pub fn new(program: &'p Program, oracle: &'p TypeOracle) -> Self {
        Self::with_override_graph(program, oracle, Arc::new(OverrideGraph::new(program)))
    }

    pub fn with_override_graph(
        program: &'p Program,
        oracle: &'p TypeOracle,
        overrides: Arc<OverrideGraph>,
    ) -> Self {
        Self {
            program,
            oracle,
            overrides,
            live: LiveSet::default(),
            worklist: Vec::new(),
            current: None,
            fault: None,
        }
    }

    /// Runs a fresh analysis from `entries`
    pub fn analyze(
        program: &'p Program,
        oracle: &'p TypeOracle,
        entries: &[MethodId],
    ) -> OptimizerResult<LiveSet> {
        let mut analyzer = Self::new(program, oracle);
        analyzer.rescue_entry_methods(entries)?;
        Ok(analyzer.into_live_set())
    }

    pub fn live_set(&self) -> &LiveSet {
        &self.live
    }

    pub fn into_live_set(self) -> LiveSet {
        self.live
    }

    /// Adds entry methods to the analysis and runs it to its fixed point.
    /// Anything already live stays live, so this can be called repeatedly.
    pub fn rescue_entry_methods(&mut self, entries: &[MethodId]) -> OptimizerResult<()> {
        for &entry in entries {
            self.rescue_method(entry);
        }

        self.run()
    }

    /// Rescues the named types with their static initializers and all of
    /// their methods, then runs the analysis to its fixed point
    pub fn rescue_types_by_name(&mut self, names: &[&str]) -> OptimizerResult<()> {
        let program = self.program;
        for &name in names {
            let Some(ty) = program.find_type(name) else {
                continue;
            };

            if program.types[ty].is_concrete_class() {
                self.rescue_instantiated(ty);
            } else {
                self.rescue_referenced(ty);
            }

            self.rescue_static_initializer(ty);

            for &method in program.types[ty].methods.iter() {
                self.rescue_method(method);
            }
        }

        self.run()
    }

    fn run(&mut self) -> OptimizerResult<()> {
        loop {
            while let Some(method) = self.worklist.pop() {
                self.scan_method(method);
            }

            if !self.rescue_overriders() {
                break;
            }
        }

        match self.fault.take() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    fn scan_method(&mut self, method: MethodId) {
        let program = self.program;
        let Some(body) = &program.methods[method].body else {
            return;
        };

        self.current = Some(method);
        self.visit_body(body);
        self.current = None;
    }

    /// Up-ref step: a method of an instantiated type becomes live as soon as
    /// something it overrides is live. Returns whether anything was rescued.
    fn rescue_overriders(&mut self) -> bool {
        let program = self.program;
        let instantiated = self.live.instantiated_types.iter().copied().sorted().collect_vec();
        let mut rescued = false;

        for ty in instantiated {
            for &method in program.types[ty].methods.iter() {
                if program.methods[method].is_static() || self.live.is_method_live(method) {
                    continue;
                }

                let overrides_live = self
                    .overrides
                    .overrides(method)
                    .iter()
                    .any(|&overridden| self.live.is_method_live(overridden));

                if overrides_live {
                    self.rescue_method(method);
                    rescued = true;
                }
            }
        }

        rescued
    }

    fn fail(&mut self, error: InternalCompilerError) {
        let program = self.program;
        let error = match self.current {
            Some(method) => error.with_context(format!(
                "while scanning {}",
                program.qualified_method_name(method)
            )),
            None => error,
        };

        self.fault.get_or_insert(error);
    }

    fn current_location(&self) -> String {
        let program = self.program;
        self.current
            .map(|method| program.method_location(method))
            .unwrap_or_default()
    }

    pub fn rescue_referenced(&mut self, ty: TypeId) {
        let program = self.program;
        if !program.is_type_attached(ty) {
            let location = self.current_location();
            self.fail(ice!(
                format!("type {ty}"),
                location,
                "reference to a type that is no longer part of the program"
            ));
            return;
        }

        if !self.live.referenced_types.insert(ty) {
            return;
        }

        trace!("referenced {}", program.types[ty].name);

        if let Some(superclass) = program.types[ty].superclass {
            self.rescue_referenced(superclass);
        }
    }

    fn rescue_type(&mut self, ty: Type) {
        if let Type::Reference(id) = ty {
            self.rescue_referenced(id);
        }
    }

    /// Rescues the static initializer of `ty` and of its superclasses
    pub fn rescue_static_initializer(&mut self, ty: TypeId) {
        let program = self.program;
        self.rescue_referenced(ty);

        let Some(initializer) = program.static_initializer(ty) else {
            return;
        };

        if self.live.is_method_live(initializer) {
            return;
        }

        self.rescue_method(initializer);

        if let Some(superclass) = program.types[ty].superclass {
            self.rescue_static_initializer(superclass);
        }
    }

    pub fn rescue_instantiated(&mut self, ty: TypeId) {
        let program = self.program;
        self.rescue_referenced(ty);

        if !program.is_type_attached(ty) || !self.live.instantiated_types.insert(ty) {
            return;
        }

        trace!("instantiated {}", program.types[ty].name);

        let declared = &program.types[ty];

        if let Some(superclass) = declared.superclass {
            self.rescue_instantiated(superclass);
        }

        for &interface in declared.interfaces.iter() {
            self.rescue_instantiated(interface);
        }

        self.rescue_static_initializer(ty);

        if let Some(initializer) = program.instance_initializer(ty) {
            self.rescue_method(initializer);
        }
    }

    pub fn rescue_method(&mut self, method: MethodId) {
        let program = self.program;
        if !program.is_method_attached(method) {
            let location = self.current_location();
            self.fail(ice!(
                format!("method {method}"),
                location,
                "reference to a method that is no longer part of the program"
            ));
            return;
        }

        if !self.live.live_members.insert(Member::Method(method)) {
            return;
        }

        let declared = &program.methods[method];
        trace!("rescued {}", program.qualified_method_name(method));

        self.rescue_referenced(declared.enclosing_type);
        self.rescue_type(declared.return_type);

        for &param in declared.params.iter() {
            self.rescue_type(program.locals[param].ty);
        }

        if declared.is_foreign {
            self.rescue_foreign_boundary(declared.return_type);
        }

        if declared.is_exported {
            self.rescue_foreign_parameters(method);
        }

        if declared.body.is_some() {
            self.worklist.push(method);
        }
    }

    fn rescue_field(&mut self, field: FieldId) {
        let program = self.program;
        if !program.is_field_attached(field) {
            let location = self.current_location();
            self.fail(ice!(
                format!("field {field}"),
                location,
                "reference to a field that is no longer part of the program"
            ));
            return;
        }

        if !self.live.live_members.insert(Member::Field(field)) {
            return;
        }

        let declared = &program.fields[field];

        self.rescue_referenced(declared.enclosing_type);
        self.rescue_type(declared.ty);

        if declared.is_static {
            self.rescue_static_initializer(declared.enclosing_type);
        }

        if let Some(Literal::String(string)) = &declared.initializer {
            self.rescue_string(string);
        }
    }

    fn rescue_local(&mut self, local: LocalId) {
        let program = self.program;
        if !program.is_local_attached(local) {
            let location = self.current_location();
            self.fail(ice!(
                format!("local {local}"),
                location,
                "reference to a local that is no longer part of the program"
            ));
            return;
        }

        if self.live.live_members.insert(Member::Local(local)) {
            self.rescue_type(program.locals[local].ty);
        }
    }

    fn rescue_string(&mut self, string: &str) {
        let program = self.program;
        if !self.live.live_strings.contains(string) {
            self.live.live_strings.insert(string.to_string());
        }

        if let Some(string_type) = program.well_known.string {
            self.rescue_instantiated(string_type);
        }
    }

    /// A value of static type `ty` produced by foreign code may be any
    /// foreign object that type can denote
    fn rescue_foreign_boundary(&mut self, ty: Type) {
        let program = self.program;
        let Type::Reference(id) = ty else {
            return;
        };
        let Some(category) = program.types.get(id).map(|declared| declared.category) else {
            return;
        };

        let bridges = self
            .oracle
            .subtypes(id)
            .iter()
            .copied()
            .filter(|&sub| {
                program.is_type_attached(sub)
                    && program.types[sub].category.is_foreign_bridge()
            })
            .sorted()
            .collect_vec();

        for bridge in bridges {
            self.rescue_instantiated(bridge);
        }

        let may_be_foreign_root = id == program.well_known.object
            || category.is_foreign_bridge()
            || category == SpecialCategory::DualDispatchInterface;

        if may_be_foreign_root {
            if let Some(root) = program.well_known.foreign_object {
                self.rescue_instantiated(root);
            }
        }
    }

    fn rescue_foreign_parameters(&mut self, method: MethodId) {
        let program = self.program;
        for &param in program.methods[method].params.iter() {
            self.rescue_foreign_boundary(program.locals[param].ty);
        }
    }

    fn visit_assignment(
        &mut self,
        compound: bool,
        target: &Expression,
        value: &Expression,
    ) {
        let program = self.program;
        if compound {
            // Reads its target before writing it
            self.visit_expression(target);
        } else {
            match &target.kind {
                ExpressionKind::Local(_) => {}
                ExpressionKind::Field { instance, field } => {
                    if let Some(instance) = instance {
                        self.visit_expression(instance);
                    }

                    let Some(declared) = program.fields.get(*field) else {
                        // Reports the dangling id
                        self.rescue_field(*field);
                        return;
                    };

                    if declared.is_volatile {
                        self.rescue_field(*field);
                    } else if declared.is_static {
                        self.rescue_static_initializer(declared.enclosing_type);
                    }
                }
                _ => {
                    let location = self.current_location();
                    self.fail(ice!(
                        format!("{:?}", target.kind),
                        location,
                        "invalid assignment target"
                    ));
                }
            }
        }

        self.visit_expression(value);
    }
}

impl Visitor for ReachabilityAnalyzer<'_> {
    fn visit_body(&mut self, body: &Body) {
        self.visit_block(&body.block);
    }

    fn visit_catch_clause(&mut self, clause: &CatchClause) {
        for &exception in clause.exception_types.iter() {
            self.rescue_referenced(exception);
        }

        let program = self.program;
        if let Some(binding) = program.locals.get(clause.binding) {
            self.rescue_type(binding.ty);
        }

        walk_catch_clause(self, clause);
    }

    fn visit_literal(&mut self, literal: &Literal) {
        if let Literal::String(string) = literal {
            self.rescue_string(string);
        }
    }

    fn visit_foreign_code(&mut self, code: &ForeignCode) {
        let program = self.program;
        for reference in code.references.iter() {
            match *reference {
                ForeignReference::Invoke(method) => {
                    self.rescue_method(method);

                    if program.methods.contains_index(method)
                        && self.live.foreign_invoked.insert(method)
                    {
                        self.rescue_foreign_parameters(method);
                    }
                }
                ForeignReference::ReadField(field) | ForeignReference::WriteField(field) => {
                    self.rescue_field(field)
                }
                ForeignReference::ReadLocal(local) | ForeignReference::WriteLocal(local) => {
                    self.rescue_local(local)
                }
            }
        }

        self.rescue_type(code.result_type);
        self.rescue_foreign_boundary(code.result_type);
    }

    fn visit_expression(&mut self, expression: &Expression) {
        let program = self.program;
        match &expression.kind {
            ExpressionKind::Local(local) => self.rescue_local(*local),
            ExpressionKind::Field { field, .. } => {
                self.rescue_field(*field);
                walk_expression(self, expression);
            }
            ExpressionKind::Call { method, .. } => {
                self.rescue_method(*method);

                if let Some(callee) = program.methods.get(*method) {
                    if callee.is_static() {
                        self.rescue_static_initializer(callee.enclosing_type);
                    }
                }

                walk_expression(self, expression);
            }
            ExpressionKind::New {
                class,
                constructor,
                ..
            } => {
                self.rescue_instantiated(*class);
                self.rescue_method(*constructor);
                walk_expression(self, expression);
            }
            ExpressionKind::Assign {
                operator,
                target,
                value,
            } => self.visit_assignment(operator.is_some(), target, value),
            ExpressionKind::Cast { target, .. } => {
                self.rescue_referenced(*target);
                walk_expression(self, expression);
            }
            ExpressionKind::InstanceOf { test, .. } => {
                self.rescue_referenced(*test);
                walk_expression(self, expression);
            }
            ExpressionKind::ClassLiteral(ty) => {
                self.rescue_referenced(*ty);

                if let Some(class) = program.well_known.class {
                    self.rescue_instantiated(class);
                }

                if let Some(declared) = program.types.get(*ty) {
                    self.rescue_string(&declared.name);
                }
            }
            _ => walk_expression(self, expression),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ir::{BinaryOperator, Statement, builder::ProgramBuilder as B};

    struct Fixture {
        builder: B,
        main: TypeId,
        run: MethodId,
    }

    fn fixture() -> Fixture {
        let mut builder = B::new();
        let main = builder.class("Main", None);
        let run = builder.static_method(main, "run", Type::VOID);
        builder.entry(run);

        Fixture { builder, main, run }
    }

    fn analyze(program: &Program) -> LiveSet {
        let oracle = TypeOracle::new(program);
        ReachabilityAnalyzer::analyze(program, &oracle, &program.entry_methods).unwrap()
    }

    #[test]
    fn construction_instantiates_and_static_reference_does_not() {
        let Fixture {
            mut builder, run, ..
        } = fixture();
        let shape = builder.interface("Shape", &[]);
        let circle = builder.class("Circle", None);
        builder.implement(circle, shape);
        let circle_new = builder.constructor(circle);
        let util = builder.class("Util", None);
        let helper = builder.static_method(util, "helper", Type::VOID);
        builder.push_statement(
            run,
            Statement::expression(B::new_object(circle, circle_new, vec![])),
        );
        builder.push_statement(run, Statement::expression(B::static_call(helper, vec![])));
        let program = builder.finish();

        let live = analyze(&program);

        assert!(live.is_instantiated(circle));
        assert!(live.is_instantiated(shape));
        assert!(live.is_referenced(util));
        assert!(!live.is_instantiated(util));
        assert!(live.is_method_live(helper));
        assert!(live.is_method_live(program.static_initializer(util).unwrap()));
        assert!(live.is_method_live(program.instance_initializer(circle).unwrap()));
        assert!(!live.is_method_live(program.instance_initializer(util).unwrap()));
    }

    #[test]
    fn referenced_class_does_not_rescue_its_interfaces() {
        let Fixture {
            mut builder, run, ..
        } = fixture();
        let shape = builder.interface("Shape", &[]);
        let square = builder.class("Square", None);
        builder.implement(square, shape);
        let local = builder.local(run, "s", Type::Reference(square));
        builder.push_statement(run, B::declare_local(local, Some(B::null())));
        builder.push_statement(
            run,
            Statement::expression(B::instance_of(square, B::local_ref(local))),
        );
        let program = builder.finish();

        let live = analyze(&program);

        assert!(live.is_referenced(square));
        assert!(!live.is_referenced(shape));
    }

    #[test]
    fn assignment_to_local_does_not_rescue_it() {
        let Fixture {
            mut builder, run, ..
        } = fixture();
        let x = builder.local(run, "x", Type::INT);
        builder.push_statement(run, B::declare_local(x, None));
        builder.push_statement(
            run,
            Statement::expression(B::assign(B::local_ref(x), B::int(1))),
        );
        let program = builder.finish();

        assert!(!analyze(&program).is_local_live(x));
    }

    #[test]
    fn assignment_to_instance_field_visits_the_qualifier_only() {
        let Fixture {
            mut builder,
            main,
            run,
        } = fixture();
        let holder = builder.class("Holder", None);
        let value = builder.field(holder, "value", Type::INT, false);
        let make = builder.static_method(main, "make", Type::Reference(holder));
        builder.push_statement(
            run,
            Statement::expression(B::assign(
                B::field_ref(Some(B::static_call(make, vec![])), value),
                B::int(3),
            )),
        );
        let program = builder.finish();

        let live = analyze(&program);

        assert!(live.is_method_live(make));
        assert!(!live.is_field_live(value));
    }

    #[test]
    fn assignment_to_volatile_field_rescues_it() {
        let Fixture {
            mut builder,
            main,
            run,
        } = fixture();
        let flag = builder.field(main, "flag", Type::BOOLEAN, true);
        builder.set_volatile(flag);
        builder.push_statement(
            run,
            Statement::expression(B::assign(B::field_ref(None, flag), B::bool(true))),
        );
        let program = builder.finish();

        assert!(analyze(&program).is_field_live(flag));
    }

    #[test]
    fn assignment_to_static_field_runs_the_static_initializer() {
        let Fixture {
            mut builder, run, ..
        } = fixture();
        let config = builder.class("Config", None);
        let level = builder.field(config, "level", Type::INT, true);
        builder.push_statement(
            run,
            Statement::expression(B::assign(B::field_ref(None, level), B::int(2))),
        );
        let program = builder.finish();

        let live = analyze(&program);

        assert!(!live.is_field_live(level));
        assert!(live.is_method_live(program.static_initializer(config).unwrap()));
    }

    #[test]
    fn compound_assignment_reads_its_target() {
        let Fixture {
            mut builder,
            main,
            run,
        } = fixture();
        let counter = builder.field(main, "counter", Type::INT, true);
        let x = builder.local(run, "x", Type::INT);
        builder.push_statement(run, B::declare_local(x, Some(B::int(0))));
        builder.push_statement(
            run,
            Statement::expression(B::compound_assign(
                BinaryOperator::Add,
                B::field_ref(None, counter),
                B::int(1),
            )),
        );
        builder.push_statement(
            run,
            Statement::expression(B::compound_assign(
                BinaryOperator::Add,
                B::local_ref(x),
                B::int(1),
            )),
        );
        let program = builder.finish();

        let live = analyze(&program);

        assert!(live.is_field_live(counter));
        assert!(live.is_local_live(x));
    }

    #[test]
    fn overriders_of_live_methods_in_instantiated_types_are_rescued() {
        let Fixture {
            mut builder, run, ..
        } = fixture();
        let animal = builder.class("Animal", None);
        builder.set_abstract(animal);
        let speak = builder.abstract_method(animal, "speak", Type::VOID);
        let dog = builder.class("Dog", Some(animal));
        let dog_new = builder.constructor(dog);
        let dog_speak = builder.method(dog, "speak", Type::VOID);
        let cat = builder.class("Cat", Some(animal));
        let cat_speak = builder.method(cat, "speak", Type::VOID);
        let a = builder.local(run, "a", Type::Reference(animal));
        builder.push_statement(
            run,
            B::declare_local(a, Some(B::new_object(dog, dog_new, vec![]))),
        );
        builder.push_statement(
            run,
            Statement::expression(B::call(B::local_ref(a), speak, vec![])),
        );
        let program = builder.finish();

        let live = analyze(&program);

        assert!(live.is_method_live(dog_speak));
        assert!(!live.is_method_live(cat_speak));
        assert!(!live.is_instantiated(cat));
    }

    #[test]
    fn values_from_foreign_code_instantiate_foreign_bridge_types() {
        let Fixture {
            mut builder,
            main,
            run,
        } = fixture();
        let root = builder.foreign_root("JsObject");
        let element = builder.class("Element", Some(root));
        builder.set_category(element, crate::middle::ir::SpecialCategory::ForeignBridgeSubclass);
        let unrelated = builder.class("Unrelated", None);
        builder.set_category(unrelated, crate::middle::ir::SpecialCategory::ForeignBridge);
        let callback = builder.method(main, "on_event", Type::VOID);
        builder.param(callback, "target", Type::Reference(element));
        builder.push_statement(
            run,
            Statement::expression(B::foreign(
                "window.listen(...)",
                Type::VOID,
                vec![ForeignReference::Invoke(callback)],
            )),
        );
        let program = builder.finish();

        let live = analyze(&program);

        assert!(live.is_method_live(callback));
        assert!(live.is_instantiated(element));
        assert!(live.is_instantiated(root));
        assert!(!live.is_instantiated(unrelated));
    }

    #[test]
    fn class_literals_keep_the_type_name() {
        let Fixture {
            mut builder, run, ..
        } = fixture();
        let string = builder.string_class();
        let class = builder.class_literal_class();
        let widget = builder.class("Widget", None);
        builder.push_statement(run, Statement::expression(B::class_literal(widget)));
        let program = builder.finish();

        let live = analyze(&program);

        assert!(live.is_referenced(widget));
        assert!(!live.is_instantiated(widget));
        assert!(live.is_instantiated(class));
        assert!(live.is_instantiated(string));
        assert!(live.is_string_live("Widget"));
    }

    #[test]
    fn detached_callee_is_an_internal_error() {
        let Fixture {
            mut builder,
            main,
            run,
        } = fixture();
        let gone = builder.static_method(main, "gone", Type::VOID);
        builder.push_statement(run, Statement::expression(B::static_call(gone, vec![])));
        let mut program = builder.finish();
        program.methods[gone].pruned = true;

        let oracle = TypeOracle::new(&program);
        let error = ReachabilityAnalyzer::analyze(&program, &oracle, &program.entry_methods)
            .unwrap_err();

        assert!(error.message.contains("no longer part of the program"));
        assert_eq!(error.context, ["while scanning Main.run"]);
    }

    #[test]
    fn extending_an_analysis_only_adds() {
        let Fixture {
            mut builder,
            main,
            run,
        } = fixture();
        let later = builder.static_method(main, "later", Type::VOID);
        builder.push_statement(later, Statement::expression(B::string("hello")));
        let program = builder.finish();

        let oracle = TypeOracle::new(&program);
        let mut analyzer = ReachabilityAnalyzer::new(&program, &oracle);
        analyzer.rescue_entry_methods(&[run]).unwrap();
        let before = analyzer.live_set().clone();
        analyzer.rescue_entry_methods(&[later]).unwrap();

        assert!(before.is_subset_of(analyzer.live_set()));
        assert!(!before.is_string_live("hello"));
        assert!(analyzer.live_set().is_string_live("hello"));
    }

    #[test]
    fn foreign_method_results_instantiate_foreign_bridge_types() {
        let Fixture {
            mut builder, run, ..
        } = fixture();
        let root = builder.foreign_root("JsObject");
        let element = builder.class("Element", Some(root));
        builder.set_category(element, SpecialCategory::ForeignBridgeSubclass);
        let node = builder.class("Node", Some(root));
        builder.set_category(node, SpecialCategory::ForeignBridgeSubclass);
        let document = builder.class("Document", None);
        let document_new = builder.constructor(document);
        let query = builder.foreign_method(document, "query", Type::Reference(element));
        let first = builder.method(document, "first", Type::Reference(node));
        builder.push_statement(first, B::return_value(Some(B::null())));
        for method in [query, first] {
            builder.push_statement(
                run,
                Statement::expression(B::call(
                    B::new_object(document, document_new, vec![]),
                    method,
                    vec![],
                )),
            );
        }
        let program = builder.finish();

        let live = analyze(&program);

        assert!(live.is_instantiated(element));
        assert!(live.is_instantiated(root));
        assert!(live.is_referenced(node));
        assert!(!live.is_instantiated(node));
    }

    #[test]
    fn only_exported_parameters_instantiate_foreign_bridge_types() {
        for exported in [false, true] {
            let mut builder = B::new();
            let root = builder.foreign_root("JsObject");
            let event = builder.class("Event", Some(root));
            builder.set_category(event, SpecialCategory::ForeignBridgeSubclass);
            let main = builder.class("Main", None);
            let on_click = builder.static_method(main, "onClick", Type::VOID);
            builder.param(on_click, "event", Type::Reference(event));
            builder.entry(on_click);
            if exported {
                builder.export(on_click);
            }
            let program = builder.finish();

            let live = analyze(&program);

            assert!(live.is_referenced(event));
            assert_eq!(live.is_instantiated(event), exported);
        }
    }

    #[test]
    fn loop_and_throw_bodies_are_scanned() {
        let Fixture {
            mut builder, run, ..
        } = fixture();
        let color = builder.enumeration("Color");
        let red = builder.field(color, "RED", Type::Reference(color), true);
        let widget = builder.class("Widget", None);
        let widget_new = builder.constructor(widget);
        let failure = builder.class("Failure", None);
        let failure_new = builder.constructor(failure);
        builder.push_statement(
            run,
            B::while_statement(
                B::binary(BinaryOperator::Equals, B::field_ref(None, red), B::null()),
                vec![Statement::expression(B::new_object(widget, widget_new, vec![]))],
            ),
        );
        builder.push_statement(run, B::throw(B::new_object(failure, failure_new, vec![])));
        let program = builder.finish();

        let live = analyze(&program);

        assert!(live.is_field_live(red));
        assert!(live.is_method_live(program.static_initializer(color).unwrap()));
        assert!(!live.is_instantiated(color));
        assert!(live.is_instantiated(widget));
        assert!(live.is_instantiated(failure));
    }
}
