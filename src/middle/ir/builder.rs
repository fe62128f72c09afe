//! Programmatic construction of a [`Program`].
//!
//! The front end normally produces the program; this builder is what tests and
//! embedders use instead. It takes care of the structural invariants the
//! optimizer relies on: slot 0 of every type is its static initializer, slot 1
//! of every class is its instance initializer, and `overrides` /
//! `overridden_by` are filled in consistently when the program is finished.

use hashbrown::HashSet;

use super::{
    BinaryOperator, Block, Body, CatchClause, DeclaredType, DeclaredTypeKind, Dispatch,
    Expression, ExpressionKind, Field, FieldId, ForeignCode, ForeignReference, Literal, Local,
    LocalId, LocalKind, Method, MethodId, MethodKind, Program, SpecialCategory, Span, Statement,
    StatementKind, Type, TypeId, UnaryOperator, WellKnownTypes,
};
use crate::index::{Index, IndexVec};

pub const STATIC_INITIALIZER_NAME: &str = "$clinit";
pub const INSTANCE_INITIALIZER_NAME: &str = "$init";
pub const CONSTRUCTOR_NAME: &str = "new";

pub struct ProgramBuilder {
    program: Program,
    next_line: u32,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    /// Starts a program containing only the root `Object` class
    pub fn new() -> Self {
        let mut builder = Self {
            program: Program {
                types: IndexVec::new(),
                methods: IndexVec::new(),
                fields: IndexVec::new(),
                locals: IndexVec::new(),
                type_order: Vec::new(),
                entry_methods: Vec::new(),
                well_known: WellKnownTypes {
                    object: TypeId::new(0),
                    string: None,
                    class: None,
                    foreign_object: None,
                },
            },
            next_line: 1,
        };

        let object = builder.declare("Object", DeclaredTypeKind::Class, None);
        builder.program.well_known.object = object;
        builder
    }

    fn span(&mut self) -> Span {
        let span = Span::new(self.next_line, 1);
        self.next_line += 1;
        span
    }

    fn declare(
        &mut self,
        name: &str,
        kind: DeclaredTypeKind,
        superclass: Option<TypeId>,
    ) -> TypeId {
        let span = self.span();
        let ty = self.program.types.push(DeclaredType {
            name: name.to_string(),
            kind,
            superclass,
            interfaces: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            is_abstract: kind == DeclaredTypeKind::Interface,
            is_final: false,
            category: SpecialCategory::Ordinary,
            source_file: format!("{name}.java"),
            span,
            pruned: false,
        });
        self.program.type_order.push(ty);

        self.add_method(
            ty,
            STATIC_INITIALIZER_NAME,
            MethodKind::StaticInitializer,
            Type::VOID,
            Some(Body::default()),
        );

        if kind != DeclaredTypeKind::Interface {
            self.add_method(
                ty,
                INSTANCE_INITIALIZER_NAME,
                MethodKind::InstanceInitializer,
                Type::VOID,
                Some(Body::default()),
            );
        }

        ty
    }

    /// Declares a class. Without an explicit superclass it extends `Object`.
    pub fn class(&mut self, name: &str, superclass: Option<TypeId>) -> TypeId {
        let superclass = superclass.unwrap_or(self.program.well_known.object);
        self.declare(name, DeclaredTypeKind::Class, Some(superclass))
    }

    pub fn enumeration(&mut self, name: &str) -> TypeId {
        let object = self.program.well_known.object;
        let ty = self.declare(name, DeclaredTypeKind::Enum, Some(object));
        self.program.types[ty].is_final = true;
        ty
    }

    pub fn interface(&mut self, name: &str, extends: &[TypeId]) -> TypeId {
        let ty = self.declare(name, DeclaredTypeKind::Interface, None);
        self.program.types[ty].interfaces = extends.to_vec();
        ty
    }

    /// Declares the final class string literals are instances of
    pub fn string_class(&mut self) -> TypeId {
        let ty = self.class("String", None);
        self.program.types[ty].is_final = true;
        self.program.well_known.string = Some(ty);
        ty
    }

    /// Declares the class class literals are instances of
    pub fn class_literal_class(&mut self) -> TypeId {
        let ty = self.class("Class", None);
        self.program.types[ty].is_final = true;
        self.program.well_known.class = Some(ty);
        ty
    }

    /// Declares the root of the foreign-bridge types
    pub fn foreign_root(&mut self, name: &str) -> TypeId {
        let ty = self.class(name, None);
        self.program.types[ty].category = SpecialCategory::ForeignBridge;
        self.program.well_known.foreign_object = Some(ty);
        ty
    }

    pub fn implement(&mut self, class: TypeId, interface: TypeId) {
        self.program.types[class].interfaces.push(interface);
    }

    pub fn set_abstract(&mut self, ty: TypeId) {
        self.program.types[ty].is_abstract = true;
    }

    pub fn set_final(&mut self, ty: TypeId) {
        self.program.types[ty].is_final = true;
    }

    pub fn set_category(&mut self, ty: TypeId, category: SpecialCategory) {
        self.program.types[ty].category = category;
    }

    pub fn set_source_file(&mut self, ty: TypeId, file: &str) {
        self.program.types[ty].source_file = file.to_string();
    }

    fn add_method(
        &mut self,
        ty: TypeId,
        name: &str,
        kind: MethodKind,
        return_type: Type,
        body: Option<Body>,
    ) -> MethodId {
        let span = self.span();
        let method = self.program.methods.push(Method {
            name: name.to_string(),
            enclosing_type: ty,
            kind,
            return_type,
            params: Vec::new(),
            is_abstract: body.is_none(),
            body,
            is_foreign: false,
            is_exported: false,
            overrides: Vec::new(),
            overridden_by: Vec::new(),
            span,
            pruned: false,
        });

        self.program.types[ty].methods.push(method);
        method
    }

    /// Declares an instance method with an empty body
    pub fn method(&mut self, ty: TypeId, name: &str, return_type: Type) -> MethodId {
        self.add_method(
            ty,
            name,
            MethodKind::Instance,
            return_type,
            Some(Body::default()),
        )
    }

    pub fn static_method(&mut self, ty: TypeId, name: &str, return_type: Type) -> MethodId {
        self.add_method(
            ty,
            name,
            MethodKind::Static,
            return_type,
            Some(Body::default()),
        )
    }

    pub fn abstract_method(&mut self, ty: TypeId, name: &str, return_type: Type) -> MethodId {
        self.add_method(ty, name, MethodKind::Instance, return_type, None)
    }

    /// Declares an instance method implemented in foreign code
    pub fn foreign_method(&mut self, ty: TypeId, name: &str, return_type: Type) -> MethodId {
        let method = self.add_method(ty, name, MethodKind::Instance, return_type, None);
        self.program.methods[method].is_abstract = false;
        self.program.methods[method].is_foreign = true;
        method
    }

    pub fn constructor(&mut self, class: TypeId) -> MethodId {
        self.add_method(
            class,
            CONSTRUCTOR_NAME,
            MethodKind::Constructor,
            Type::VOID,
            Some(Body::default()),
        )
    }

    /// Marks a method as callable by name from foreign code
    pub fn export(&mut self, method: MethodId) {
        self.program.methods[method].is_exported = true;
    }

    pub fn static_initializer(&self, ty: TypeId) -> MethodId {
        self.program.types[ty].methods[0]
    }

    pub fn field(&mut self, ty: TypeId, name: &str, field_type: Type, is_static: bool) -> FieldId {
        let span = self.span();
        let field = self.program.fields.push(Field {
            name: name.to_string(),
            enclosing_type: ty,
            ty: field_type,
            is_static,
            is_volatile: false,
            initializer: None,
            span,
            pruned: false,
        });

        self.program.types[ty].fields.push(field);
        field
    }

    pub fn set_volatile(&mut self, field: FieldId) {
        self.program.fields[field].is_volatile = true;
    }

    pub fn set_initializer(&mut self, field: FieldId, literal: Literal) {
        self.program.fields[field].initializer = Some(literal);
    }

    fn add_local(&mut self, method: MethodId, name: &str, ty: Type, kind: LocalKind) -> LocalId {
        let span = self.span();
        self.program.locals.push(Local {
            name: name.to_string(),
            ty,
            kind,
            enclosing_method: method,
            span,
            pruned: false,
        })
    }

    pub fn param(&mut self, method: MethodId, name: &str, ty: Type) -> LocalId {
        let local = self.add_local(method, name, ty, LocalKind::Parameter);
        self.program.methods[method].params.push(local);
        local
    }

    /// Declares a local variable of a method's body. The caller still has to
    /// push a declaration statement for it.
    pub fn local(&mut self, method: MethodId, name: &str, ty: Type) -> LocalId {
        self.body_local(method, name, ty, LocalKind::Variable)
    }

    pub fn catch_binding(&mut self, method: MethodId, name: &str, ty: Type) -> LocalId {
        self.body_local(method, name, ty, LocalKind::CatchBinding)
    }

    fn body_local(&mut self, method: MethodId, name: &str, ty: Type, kind: LocalKind) -> LocalId {
        let local = self.add_local(method, name, ty, kind);
        self.program.methods[method]
            .body
            .get_or_insert_with(Body::default)
            .locals
            .push(local);
        local
    }

    pub fn push_statement(&mut self, method: MethodId, statement: Statement) {
        self.program.methods[method]
            .body
            .get_or_insert_with(Body::default)
            .block
            .statements
            .push(statement);
    }

    pub fn entry(&mut self, method: MethodId) {
        self.program.entry_methods.push(method);
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Links overriding methods and hands out the finished program
    pub fn finish(mut self) -> Program {
        link_overrides(&mut self.program);
        self.program
    }
}

/// Fills in `overrides` / `overridden_by` by matching instance methods on name
/// and arity against every supertype.
pub fn link_overrides(program: &mut Program) {
    for method in program.methods.iter_mut() {
        method.overrides.clear();
        method.overridden_by.clear();
    }

    let mut links = Vec::new();

    for &ty in program.type_order.iter() {
        let supertypes = strict_supertypes(program, ty);

        for &method in program.types[ty].methods.iter() {
            let candidate = &program.methods[method];
            if candidate.kind != MethodKind::Instance {
                continue;
            }

            for &supertype in supertypes.iter() {
                for &overridden in program.types[supertype].methods.iter() {
                    let other = &program.methods[overridden];

                    if other.kind == MethodKind::Instance
                        && other.name == candidate.name
                        && other.params.len() == candidate.params.len()
                    {
                        links.push((method, overridden));
                    }
                }
            }
        }
    }

    for (method, overridden) in links {
        program.methods[method].overrides.push(overridden);
        program.methods[overridden].overridden_by.push(method);
    }
}

fn strict_supertypes(program: &Program, ty: TypeId) -> Vec<TypeId> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    let mut worklist = vec![ty];

    while let Some(current) = worklist.pop() {
        let declared = &program.types[current];
        let direct = declared.superclass.iter().chain(declared.interfaces.iter());

        for &supertype in direct {
            if seen.insert(supertype) {
                ordered.push(supertype);
                worklist.push(supertype);
            }
        }
    }

    ordered
}

/// Expression and statement shorthands. Everything gets a default span.
impl ProgramBuilder {
    fn expression(kind: ExpressionKind) -> Expression {
        Expression::new(kind, Span::default())
    }

    pub fn int(value: i64) -> Expression {
        Self::expression(ExpressionKind::Literal(Literal::Int(value)))
    }

    pub fn bool(value: bool) -> Expression {
        Self::expression(ExpressionKind::Literal(Literal::Bool(value)))
    }

    pub fn null() -> Expression {
        Self::expression(ExpressionKind::Literal(Literal::Null))
    }

    pub fn string(value: &str) -> Expression {
        Self::expression(ExpressionKind::Literal(Literal::String(value.to_string())))
    }

    pub fn this() -> Expression {
        Self::expression(ExpressionKind::This)
    }

    pub fn local_ref(local: LocalId) -> Expression {
        Self::expression(ExpressionKind::Local(local))
    }

    pub fn field_ref(instance: Option<Expression>, field: FieldId) -> Expression {
        Self::expression(ExpressionKind::Field {
            instance: instance.map(Box::new),
            field,
        })
    }

    pub fn call(instance: Expression, method: MethodId, arguments: Vec<Expression>) -> Expression {
        Self::expression(ExpressionKind::Call {
            instance: Some(Box::new(instance)),
            method,
            arguments,
            dispatch: Dispatch::Virtual,
        })
    }

    pub fn static_call(method: MethodId, arguments: Vec<Expression>) -> Expression {
        Self::expression(ExpressionKind::Call {
            instance: None,
            method,
            arguments,
            dispatch: Dispatch::Static,
        })
    }

    pub fn new_object(class: TypeId, constructor: MethodId, arguments: Vec<Expression>) -> Expression {
        Self::expression(ExpressionKind::New {
            class,
            constructor,
            arguments,
        })
    }

    pub fn assign(target: Expression, value: Expression) -> Expression {
        Self::expression(ExpressionKind::Assign {
            operator: None,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    pub fn compound_assign(
        operator: BinaryOperator,
        target: Expression,
        value: Expression,
    ) -> Expression {
        Self::expression(ExpressionKind::Assign {
            operator: Some(operator),
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    pub fn binary(operator: BinaryOperator, lhs: Expression, rhs: Expression) -> Expression {
        Self::expression(ExpressionKind::Binary {
            operator,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn not(operand: Expression) -> Expression {
        Self::expression(ExpressionKind::Unary {
            operator: UnaryOperator::Not,
            operand: Box::new(operand),
        })
    }

    pub fn conditional(condition: Expression, then_value: Expression, else_value: Expression) -> Expression {
        Self::expression(ExpressionKind::Conditional {
            condition: Box::new(condition),
            then_value: Box::new(then_value),
            else_value: Box::new(else_value),
        })
    }

    pub fn cast(target: TypeId, operand: Expression) -> Expression {
        Self::expression(ExpressionKind::Cast {
            target,
            checked: true,
            operand: Box::new(operand),
        })
    }

    pub fn instance_of(test: TypeId, operand: Expression) -> Expression {
        Self::expression(ExpressionKind::InstanceOf {
            test,
            operand: Box::new(operand),
        })
    }

    pub fn class_literal(ty: TypeId) -> Expression {
        Self::expression(ExpressionKind::ClassLiteral(ty))
    }

    pub fn sequence(expressions: Vec<Expression>) -> Expression {
        Self::expression(ExpressionKind::Sequence(expressions))
    }

    pub fn foreign(code: &str, result_type: Type, references: Vec<ForeignReference>) -> Expression {
        Self::expression(ExpressionKind::Foreign(ForeignCode {
            code: code.to_string(),
            result_type,
            references,
        }))
    }

    pub fn declare_local(local: LocalId, initializer: Option<Expression>) -> Statement {
        Statement::new(
            StatementKind::Declaration { local, initializer },
            Span::default(),
        )
    }

    pub fn return_value(value: Option<Expression>) -> Statement {
        Statement::new(StatementKind::Return(value), Span::default())
    }

    pub fn if_statement(
        condition: Expression,
        then_block: Vec<Statement>,
        else_block: Option<Vec<Statement>>,
    ) -> Statement {
        Statement::new(
            StatementKind::If {
                condition,
                then_block: Block::new(then_block),
                else_block: else_block.map(Block::new),
            },
            Span::default(),
        )
    }

    pub fn while_statement(condition: Expression, body: Vec<Statement>) -> Statement {
        Statement::new(
            StatementKind::While {
                condition,
                body: Block::new(body),
            },
            Span::default(),
        )
    }

    pub fn throw(value: Expression) -> Statement {
        Statement::new(StatementKind::Throw(value), Span::default())
    }

    pub fn try_catch(body: Vec<Statement>, catches: Vec<(Vec<TypeId>, LocalId, Vec<Statement>)>) -> Statement {
        let catches = catches
            .into_iter()
            .map(|(exception_types, binding, body)| CatchClause {
                exception_types,
                binding,
                body: Block::new(body),
            })
            .collect();

        Statement::new(
            StatementKind::Try {
                body: Block::new(body),
                catches,
            },
            Span::default(),
        )
    }
}
