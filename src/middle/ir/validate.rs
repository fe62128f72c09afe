//! Structural checks on a program that did not come from [`ProgramBuilder`].
//!
//! Every pass indexes the arenas directly, so a program loaded from JSON is
//! checked once up front: every stored id must point into its arena and no
//! superclass chain may loop.
//!
//! [`ProgramBuilder`]: super::builder::ProgramBuilder

use super::{
    CatchClause, Expression, ExpressionKind, FieldId, ForeignCode, ForeignReference, LocalId,
    MethodId, Program, Span, Statement, StatementKind, Type, TypeId,
    visit::{Visitor, walk_catch_clause, walk_expression, walk_statement},
};
use crate::error::{InternalCompilerError, OptimizerResult, ice};

impl Program {
    /// Fails with an internal compiler error naming the first dangling id or
    /// superclass cycle
    pub fn validate(&self) -> OptimizerResult<()> {
        let mut validator = Validator {
            program: self,
            current_type: None,
            location: String::new(),
            owner: "while validating the program header".to_string(),
            fault: None,
        };

        validator.check_program();

        match validator.fault {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

struct Validator<'p> {
    program: &'p Program,
    /// Type whose source file spans are relative to
    current_type: Option<TypeId>,
    location: String,
    owner: String,
    fault: Option<InternalCompilerError>,
}

impl Validator<'_> {
    fn fail(&mut self, node: String, what: &str) {
        if self.fault.is_some() {
            return;
        }

        let error = ice!(node, self.location.clone(), "dangling {what} id");
        self.fault = Some(error.with_context(self.owner.clone()));
    }

    fn locate(&mut self, span: Span) {
        if let Some(ty) = self.current_type {
            self.location = self.program.location(ty, span);
        }
    }

    fn check_type(&mut self, id: TypeId) -> bool {
        let valid = self.program.types.contains_index(id);
        if !valid {
            self.fail(format!("type {id}"), "type");
        }
        valid
    }

    fn check_method(&mut self, id: MethodId) -> bool {
        let valid = self.program.methods.contains_index(id);
        if !valid {
            self.fail(format!("method {id}"), "method");
        }
        valid
    }

    fn check_field(&mut self, id: FieldId) {
        if !self.program.fields.contains_index(id) {
            self.fail(format!("field {id}"), "field");
        }
    }

    fn check_local(&mut self, id: LocalId) {
        if !self.program.locals.contains_index(id) {
            self.fail(format!("local {id}"), "local");
        }
    }

    fn check_value_type(&mut self, ty: Type) {
        if let Type::Reference(id) = ty {
            self.check_type(id);
        }
    }

    fn check_program(&mut self) {
        let program = self.program;
        let well_known = &program.well_known;

        self.check_type(well_known.object);
        for ty in [well_known.string, well_known.class, well_known.foreign_object]
            .into_iter()
            .flatten()
        {
            self.check_type(ty);
        }

        for &ty in program.type_order.iter() {
            self.check_type(ty);
        }

        for &entry in program.entry_methods.iter() {
            self.check_method(entry);
        }

        for id in program.types.indices() {
            self.check_declared_type(id);
        }

        for id in program.methods.indices() {
            self.check_method_node(id);
        }

        for (id, field) in program.fields.enumerate() {
            self.current_type = None;
            self.location.clear();
            self.owner = format!("while validating field {id}");

            if self.check_type(field.enclosing_type) {
                self.current_type = Some(field.enclosing_type);
                self.locate(field.span);
                self.owner = format!("while validating {}", program.qualified_field_name(id));
            }

            self.check_value_type(field.ty);
        }

        for (id, local) in program.locals.enumerate() {
            self.location.clear();
            self.owner = format!("while validating local {id} ({})", local.name);
            self.check_method(local.enclosing_method);
            self.check_value_type(local.ty);
        }
    }

    fn check_declared_type(&mut self, id: TypeId) {
        let program = self.program;
        let declared = &program.types[id];

        self.current_type = Some(id);
        self.locate(declared.span);
        self.owner = format!("while validating type {}", declared.name);

        if let Some(superclass) = declared.superclass {
            if self.check_type(superclass) {
                self.check_superclass_chain(id);
            }
        }

        for &interface in declared.interfaces.iter() {
            self.check_type(interface);
        }

        for &method in declared.methods.iter() {
            self.check_method(method);
        }

        for &field in declared.fields.iter() {
            self.check_field(field);
        }
    }

    /// A chain longer than the number of types must revisit one of them
    fn check_superclass_chain(&mut self, id: TypeId) {
        let program = self.program;
        let mut current = id;

        for _ in 0..program.types.len() {
            match program.types.get(current).and_then(|declared| declared.superclass) {
                Some(superclass) => current = superclass,
                None => return,
            }
        }

        if self.fault.is_none() {
            let error = ice!(
                format!("type {}", program.types[id].name),
                self.location.clone(),
                "cyclic superclass chain"
            );
            self.fault = Some(error.with_context(self.owner.clone()));
        }
    }

    fn check_method_node(&mut self, id: MethodId) {
        let program = self.program;
        let method = &program.methods[id];

        self.current_type = None;
        self.location.clear();
        self.owner = format!("while validating method {id} ({})", method.name);

        if !self.check_type(method.enclosing_type) {
            return;
        }

        self.current_type = Some(method.enclosing_type);
        self.locate(method.span);
        self.owner = format!("while validating {}", program.qualified_method_name(id));

        self.check_value_type(method.return_type);

        for &param in method.params.iter() {
            self.check_local(param);
        }

        for &other in method.overrides.iter().chain(method.overridden_by.iter()) {
            self.check_method(other);
        }

        if let Some(body) = &method.body {
            for &local in body.locals.iter() {
                self.check_local(local);
            }

            self.visit_body(body);
        }
    }
}

impl Visitor for Validator<'_> {
    fn visit_statement(&mut self, statement: &Statement) {
        self.locate(statement.span);

        if let StatementKind::Declaration { local, .. } = statement.kind {
            self.check_local(local);
        }

        walk_statement(self, statement);
    }

    fn visit_catch_clause(&mut self, clause: &CatchClause) {
        for &exception in clause.exception_types.iter() {
            self.check_type(exception);
        }

        self.check_local(clause.binding);
        walk_catch_clause(self, clause);
    }

    fn visit_expression(&mut self, expression: &Expression) {
        self.locate(expression.span);

        match &expression.kind {
            ExpressionKind::Local(local) => self.check_local(*local),
            ExpressionKind::Field { field, .. } => self.check_field(*field),
            ExpressionKind::Call { method, .. } => {
                self.check_method(*method);
            }
            ExpressionKind::New {
                class, constructor, ..
            } => {
                self.check_type(*class);
                self.check_method(*constructor);
            }
            ExpressionKind::Cast { target: ty, .. }
            | ExpressionKind::InstanceOf { test: ty, .. }
            | ExpressionKind::ClassLiteral(ty) => {
                self.check_type(*ty);
            }
            _ => {}
        }

        walk_expression(self, expression);
    }

    fn visit_foreign_code(&mut self, code: &ForeignCode) {
        self.check_value_type(code.result_type);

        for reference in code.references.iter() {
            match *reference {
                ForeignReference::Invoke(method) => {
                    self.check_method(method);
                }
                ForeignReference::ReadField(field) | ForeignReference::WriteField(field) => {
                    self.check_field(field)
                }
                ForeignReference::ReadLocal(local) | ForeignReference::WriteLocal(local) => {
                    self.check_local(local)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{index::Index, middle::ir::builder::ProgramBuilder as B};

    fn program_with_run() -> (Program, MethodId) {
        let mut builder = B::new();
        let main = builder.class("Main", None);
        builder.set_source_file(main, "Main.src");
        let run = builder.static_method(main, "run", Type::VOID);
        builder.entry(run);
        (builder.finish(), run)
    }

    #[test]
    fn built_programs_are_valid() {
        let (program, _) = program_with_run();
        assert!(program.validate().is_ok());
    }

    #[test]
    fn dangling_field_in_a_body_is_reported_with_its_location() {
        let (mut program, run) = program_with_run();
        let missing = FieldId::new(program.fields.len() + 3);
        let mut target = B::field_ref(None, missing);
        target.span = Span::new(7, 9);
        let assignment = B::assign(target, B::int(1));

        program.methods[run]
            .body
            .get_or_insert_with(Default::default)
            .block
            .statements
            .push(Statement::expression(assignment));

        let error = program.validate().unwrap_err();

        assert_eq!(error.message, "dangling field id");
        assert_eq!(error.node, format!("field {missing}"));
        assert_eq!(error.location, "Main.src:7:9");
        assert_eq!(error.context, ["while validating Main.run"]);
    }

    #[test]
    fn dangling_superclass_is_reported() {
        let (mut program, _) = program_with_run();
        let main = program.find_type("Main").unwrap();
        program.types[main].superclass = Some(TypeId::new(program.types.len()));

        let error = program.validate().unwrap_err();

        assert_eq!(error.message, "dangling type id");
        assert_eq!(error.context, ["while validating type Main"]);
    }

    #[test]
    fn superclass_cycles_are_reported() {
        let mut builder = B::new();
        let a = builder.class("A", None);
        let b = builder.class("B", Some(a));
        let mut program = builder.finish();
        program.types[a].superclass = Some(b);

        let error = program.validate().unwrap_err();

        assert_eq!(error.message, "cyclic superclass chain");
    }
}
