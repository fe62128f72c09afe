//! Value flow between slots, the input of type narrowing.
//!
//! Every edge says "a value described by this source may be stored in this
//! slot". The graph is built once per narrowing run and never changes while
//! the fixpoint runs; sources are evaluated against the program's current slot
//! types each time they are read.

use hashbrown::{HashMap, HashSet};

use crate::middle::{
    ir::{
        Body, Expression, ExpressionKind, FieldId, ForeignCode, ForeignReference, LocalKind,
        MethodId, Program, Slot, Statement, StatementKind, Type, TypeId,
        visit::{Visitor, walk_expression, walk_statement},
    },
    override_graph::OverrideGraph,
    type_oracle::TypeOracle,
};

#[derive(Debug, Clone, PartialEq)]
pub enum FlowSource {
    /// A value of a fixed type, e.g. a literal or an object construction
    Type(Type),
    /// Whatever the slot currently holds
    Slot(Slot),
    /// The operand's value, known to also satisfy the cast target
    Cast {
        target: TypeId,
        operand: Box<FlowSource>,
    },
    /// Any of the sources
    Join(Vec<FlowSource>),
}

#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    /// Reference-typed slots, in program order
    slots: Vec<Slot>,
    edges: HashMap<Slot, Vec<FlowSource>>,
    /// Slots written by code the optimizer cannot see. They keep their
    /// declared type.
    frozen: HashSet<Slot>,
}

impl FlowGraph {
    pub fn build(program: &Program, oracle: &TypeOracle, overrides: &OverrideGraph) -> Self {
        let mut builder = GraphBuilder {
            program,
            oracle,
            graph: FlowGraph::default(),
            current: None,
        };

        builder.collect_slots();
        builder.add_field_initializers();
        builder.add_override_edges(overrides);

        for method in program.attached_methods() {
            builder.add_signature_edges(method);

            if let Some(body) = &program.methods[method].body {
                builder.current = Some(method);
                builder.visit_body(body);
            }
        }

        builder.graph
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn sources(&self, slot: Slot) -> &[FlowSource] {
        self.edges.get(&slot).map_or(&[], Vec::as_slice)
    }

    pub fn is_frozen(&self, slot: Slot) -> bool {
        self.frozen.contains(&slot)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Current type of the values a source describes
    pub fn evaluate(&self, source: &FlowSource, program: &Program, oracle: &TypeOracle) -> Type {
        match source {
            FlowSource::Type(ty) => *ty,
            FlowSource::Slot(slot) => program.slot_type(*slot),
            FlowSource::Cast { target, operand } => oracle.stronger_of(
                self.evaluate(operand, program, oracle),
                Type::Reference(*target),
            ),
            FlowSource::Join(sources) => oracle.join(
                sources
                    .iter()
                    .map(|source| self.evaluate(source, program, oracle)),
            ),
        }
    }
}

struct GraphBuilder<'p> {
    program: &'p Program,
    oracle: &'p TypeOracle,
    graph: FlowGraph,
    current: Option<MethodId>,
}

impl GraphBuilder<'_> {
    fn is_tracked(&self, slot: Slot) -> bool {
        self.program.slot_type(slot).is_reference()
    }

    fn add_edge(&mut self, slot: Slot, source: FlowSource) {
        if self.is_tracked(slot) {
            self.graph.edges.entry(slot).or_default().push(source);
        }
    }

    /// Keeps the slot at its declared type
    fn freeze(&mut self, slot: Slot) {
        if self.is_tracked(slot) {
            self.graph.frozen.insert(slot);
        }
        self.add_edge(slot, FlowSource::Slot(slot));
    }

    fn collect_slots(&mut self) {
        let program = self.program;

        for field in program.attached_fields() {
            self.push_slot(Slot::Field(field));
        }

        for method in program.attached_methods() {
            self.push_slot(Slot::Return(method));

            for local in program.locals_of(method) {
                self.push_slot(Slot::Local(local));
            }
        }
    }

    fn push_slot(&mut self, slot: Slot) {
        if self.is_tracked(slot) {
            self.graph.slots.push(slot);
        }
    }

    fn add_field_initializers(&mut self) {
        let program = self.program;

        for field in program.attached_fields() {
            let source = match &program.fields[field].initializer {
                Some(literal) => FlowSource::Type(self.oracle.literal_type(literal)),
                None => FlowSource::Type(Type::Null),
            };

            self.add_edge(Slot::Field(field), source);
        }
    }

    /// Parameters receive what the overridden method's parameters receive,
    /// and an overridden method returns what its overriders return
    fn add_override_edges(&mut self, overrides: &OverrideGraph) {
        let program = self.program;

        for method in program.attached_methods() {
            for &overridden in overrides.overrides(method) {
                let params = program.methods[method].params.iter();
                let overridden_params = program.methods[overridden].params.iter();

                for (&param, &overridden_param) in params.zip(overridden_params) {
                    self.add_edge(
                        Slot::Local(param),
                        FlowSource::Slot(Slot::Local(overridden_param)),
                    );
                }

                self.add_edge(
                    Slot::Return(overridden),
                    FlowSource::Slot(Slot::Return(method)),
                );
            }
        }
    }

    /// Freezes slots written by code the optimizer cannot see
    fn add_signature_edges(&mut self, method: MethodId) {
        let program = self.program;
        let declared = &program.methods[method];

        if declared.is_exported || program.entry_methods.contains(&method) {
            self.freeze_parameters(method);
        }

        if declared.is_foreign {
            self.freeze(Slot::Return(method));
        }

        for local in program.locals_of(method) {
            if program.locals[local].kind == LocalKind::CatchBinding {
                self.freeze(Slot::Local(local));
            }
        }
    }

    fn freeze_parameters(&mut self, method: MethodId) {
        let program = self.program;

        for &param in program.methods[method].params.iter() {
            self.freeze(Slot::Local(param));
        }
    }

    fn source_of(&self, expression: &Expression) -> FlowSource {
        let program = self.program;

        match &expression.kind {
            ExpressionKind::Local(local) => FlowSource::Slot(Slot::Local(*local)),
            ExpressionKind::Field { field, .. } => FlowSource::Slot(Slot::Field(*field)),
            ExpressionKind::Call { method, .. } => FlowSource::Slot(Slot::Return(*method)),
            ExpressionKind::Cast {
                target, operand, ..
            } => FlowSource::Cast {
                target: *target,
                operand: Box::new(self.source_of(operand)),
            },
            ExpressionKind::Conditional {
                then_value,
                else_value,
                ..
            } => FlowSource::Join(vec![self.source_of(then_value), self.source_of(else_value)]),
            ExpressionKind::Sequence(expressions) => match expressions.last() {
                Some(last) => self.source_of(last),
                None => FlowSource::Type(Type::VOID),
            },
            ExpressionKind::Assign {
                operator: None,
                value,
                ..
            } => self.source_of(value),
            _ => match self.current {
                Some(method) => FlowSource::Type(self.oracle.type_of(program, expression, method)),
                None => FlowSource::Type(Type::Null),
            },
        }
    }

    fn target_slot(&self, target: &Expression) -> Option<Slot> {
        match target.kind {
            ExpressionKind::Local(local) => Some(Slot::Local(local)),
            ExpressionKind::Field { field, .. } => Some(Slot::Field(field)),
            _ => None,
        }
    }

    fn add_argument_edges(&mut self, callee: MethodId, arguments: &[Expression]) {
        let program = self.program;

        for (&param, argument) in program.methods[callee].params.iter().zip(arguments) {
            let source = self.source_of(argument);
            self.add_edge(Slot::Local(param), source);
        }
    }

    fn freeze_field(&mut self, field: FieldId) {
        self.freeze(Slot::Field(field));
    }
}

impl Visitor for GraphBuilder<'_> {
    fn visit_body(&mut self, body: &Body) {
        self.visit_block(&body.block);
    }

    fn visit_statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Declaration {
                local,
                initializer: Some(initializer),
            } => {
                let source = self.source_of(initializer);
                self.add_edge(Slot::Local(*local), source);
            }
            StatementKind::Return(Some(value)) => {
                if let Some(method) = self.current {
                    let source = self.source_of(value);
                    self.add_edge(Slot::Return(method), source);
                }
            }
            _ => {}
        }

        walk_statement(self, statement);
    }

    fn visit_expression(&mut self, expression: &Expression) {
        match &expression.kind {
            ExpressionKind::Assign {
                operator,
                target,
                value,
            } => {
                if let Some(slot) = self.target_slot(target) {
                    match operator {
                        None => {
                            let source = self.source_of(value);
                            self.add_edge(slot, source);
                        }
                        Some(_) => self.freeze(slot),
                    }
                }
            }
            ExpressionKind::Call {
                method, arguments, ..
            } => self.add_argument_edges(*method, arguments),
            ExpressionKind::New {
                constructor,
                arguments,
                ..
            } => self.add_argument_edges(*constructor, arguments),
            _ => {}
        }

        walk_expression(self, expression);
    }

    fn visit_foreign_code(&mut self, code: &ForeignCode) {
        for reference in code.references.iter() {
            match *reference {
                ForeignReference::Invoke(method) => self.freeze_parameters(method),
                ForeignReference::WriteField(field) => self.freeze_field(field),
                ForeignReference::WriteLocal(local) => self.freeze(Slot::Local(local)),
                ForeignReference::ReadField(_) | ForeignReference::ReadLocal(_) => {}
            }
        }
    }
}
