//! The whole-program intermediate representation the optimizer works on.
//!
//! All nodes live in arenas owned by [`Program`] and refer to each other by
//! id. Supertypes, members, parameters and override edges are id lists, so the
//! naturally cyclic shape of a class hierarchy never turns into an ownership
//! cycle. Nodes are never physically removed: the dead code eliminator detaches
//! them from their owner and sets `pruned`, which keeps every id stable for the
//! lifetime of the program.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::index::IndexVec;

pub mod builder;
pub mod id;
pub mod pretty_print;
pub mod rewrite;
pub mod ty;
pub mod validate;
pub mod visit;

pub use id::*;
pub use ty::{PrimitiveKind, Type};

/// Position of a node in the original source. The file name is stored once
/// per declared type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub types: IndexVec<TypeId, DeclaredType>,
    pub methods: IndexVec<MethodId, Method>,
    pub fields: IndexVec<FieldId, Field>,
    pub locals: IndexVec<LocalId, Local>,
    /// The declared types still part of the program, in declaration order
    pub type_order: Vec<TypeId>,
    /// Methods treated as always reachable
    pub entry_methods: Vec<MethodId>,
    pub well_known: WellKnownTypes,
}

/// Types the optimizer needs to find without a name lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WellKnownTypes {
    /// Root of the class hierarchy. Never pruned.
    pub object: TypeId,
    /// Type of string literals
    pub string: Option<TypeId>,
    /// Type of class literal expressions
    pub class: Option<TypeId>,
    /// Root of the foreign-bridge types (host objects seen from managed code)
    pub foreign_object: Option<TypeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum DeclaredTypeKind {
    Class,
    Interface,
    Enum,
}

/// Classification precomputed by the type oracle's producer
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SpecialCategory {
    #[default]
    Ordinary,
    /// Instances alias host objects handed in from foreign code
    ForeignBridge,
    /// A subclass of a foreign-bridge type
    ForeignBridgeSubclass,
    /// An interface implementable by both managed and foreign-bridge objects
    DualDispatchInterface,
}

impl SpecialCategory {
    pub fn is_foreign_bridge(self) -> bool {
        matches!(
            self,
            SpecialCategory::ForeignBridge | SpecialCategory::ForeignBridgeSubclass
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredType {
    pub name: String,
    pub kind: DeclaredTypeKind,
    pub superclass: Option<TypeId>,
    pub interfaces: Vec<TypeId>,
    /// Slot 0 is always the static initializer. For classes, slot 1 is always
    /// the instance initializer.
    pub methods: Vec<MethodId>,
    pub fields: Vec<FieldId>,
    pub is_abstract: bool,
    pub is_final: bool,
    pub category: SpecialCategory,
    pub source_file: String,
    pub span: Span,
    pub pruned: bool,
}

impl DeclaredType {
    pub fn is_interface(&self) -> bool {
        self.kind == DeclaredTypeKind::Interface
    }

    /// Whether `new` can produce an instance of exactly this type
    pub fn is_concrete_class(&self) -> bool {
        !self.is_interface() && !self.is_abstract
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
pub enum MethodKind {
    StaticInitializer,
    InstanceInitializer,
    Constructor,
    Static,
    Instance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub enclosing_type: TypeId,
    pub kind: MethodKind,
    pub return_type: Type,
    pub params: Vec<LocalId>,
    /// Missing for abstract methods and for foreign methods whose code is
    /// opaque
    pub body: Option<Body>,
    pub is_abstract: bool,
    /// The implementation is foreign code; its result crosses into the
    /// managed program
    pub is_foreign: bool,
    /// Callable by name from foreign code; its parameters cross into the
    /// managed program
    pub is_exported: bool,
    /// Methods in supertypes this method overrides
    pub overrides: Vec<MethodId>,
    /// Methods in subtypes overriding this method
    pub overridden_by: Vec<MethodId>,
    pub span: Span,
    pub pruned: bool,
}

impl Method {
    pub fn is_static(&self) -> bool {
        matches!(self.kind, MethodKind::StaticInitializer | MethodKind::Static)
    }

    /// Instance methods taking part in dynamic dispatch
    pub fn is_polymorphic(&self) -> bool {
        !self.overrides.is_empty() || !self.overridden_by.is_empty()
    }

    pub fn is_initializer(&self) -> bool {
        matches!(
            self.kind,
            MethodKind::StaticInitializer | MethodKind::InstanceInitializer
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Every local declared in the body, including temporaries and catch
    /// bindings but not the parameters
    pub locals: Vec<LocalId>,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub enclosing_type: TypeId,
    pub ty: Type,
    pub is_static: bool,
    /// Writes are externally observable and must never be dropped
    pub is_volatile: bool,
    pub initializer: Option<Literal>,
    pub span: Span,
    pub pruned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
pub enum LocalKind {
    Parameter,
    Variable,
    CatchBinding,
    Temporary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Local {
    pub name: String,
    pub ty: Type,
    pub kind: LocalKind,
    pub enclosing_method: MethodId,
    pub span: Span,
    pub pruned: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Statement>,
}

impl Block {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatementKind {
    Expression(Expression),
    Declaration {
        local: LocalId,
        initializer: Option<Expression>,
    },
    Return(Option<Expression>),
    If {
        condition: Expression,
        then_block: Block,
        else_block: Option<Block>,
    },
    While {
        condition: Expression,
        body: Block,
    },
    Block(Block),
    Throw(Expression),
    Try {
        body: Block,
        catches: Vec<CatchClause>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    pub exception_types: Vec<TypeId>,
    /// Written by the runtime when the exception is caught
    pub binding: LocalId,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpressionKind {
    Literal(Literal),
    This,
    Local(LocalId),
    Field {
        instance: Option<Box<Expression>>,
        field: FieldId,
    },
    Call {
        instance: Option<Box<Expression>>,
        method: MethodId,
        arguments: Vec<Expression>,
        dispatch: Dispatch,
    },
    New {
        class: TypeId,
        constructor: MethodId,
        arguments: Vec<Expression>,
    },
    /// `target = value`, or `target op= value` when `operator` is set. The
    /// target is always a local or a field access.
    Assign {
        operator: Option<BinaryOperator>,
        target: Box<Expression>,
        value: Box<Expression>,
    },
    Binary {
        operator: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    Conditional {
        condition: Box<Expression>,
        then_value: Box<Expression>,
        else_value: Box<Expression>,
    },
    Cast {
        target: TypeId,
        /// Unchecked casts are never turned into runtime checks downstream
        checked: bool,
        operand: Box<Expression>,
    },
    InstanceOf {
        test: TypeId,
        operand: Box<Expression>,
    },
    ClassLiteral(TypeId),
    /// Evaluates every expression in order and yields the value of the last
    Sequence(Vec<Expression>),
    Foreign(ForeignCode),
    /// A cast proven to never succeed. Lowered to a runtime failure unless the
    /// operand is null, in which case it yields null.
    CastFailure {
        operand: Box<Expression>,
    },
    /// A member access through a receiver that is always null. Evaluates the
    /// receiver and arguments, then fails.
    NullReceiver {
        instance: Box<Expression>,
        arguments: Vec<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Dispatch {
    Virtual,
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    LogicalAnd,
    LogicalOr,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulus => "%",
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::LogicalAnd => "&&",
            Self::LogicalOr => "||",
        }
    }

    /// Integer division by zero throws
    pub fn can_throw(self) -> bool {
        matches!(self, Self::Divide | Self::Modulus)
    }

    pub fn yields_boolean(self) -> bool {
        matches!(
            self,
            Self::Equals
                | Self::NotEquals
                | Self::LessThan
                | Self::GreaterThan
                | Self::LogicalAnd
                | Self::LogicalOr
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    Negate,
}

/// An inline fragment of foreign code. The optimizer cannot see what the code
/// does, only which managed members it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignCode {
    pub code: String,
    pub result_type: Type,
    pub references: Vec<ForeignReference>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForeignReference {
    /// The method is invoked by name; its arguments come from foreign code
    Invoke(MethodId),
    ReadField(FieldId),
    WriteField(FieldId),
    ReadLocal(LocalId),
    WriteLocal(LocalId),
}

impl Expression {
    pub fn new(kind: ExpressionKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Whether evaluating the expression can have an effect beyond producing
    /// its value. Null dereferences through field reads are not counted.
    pub fn has_side_effects(&self) -> bool {
        match &self.kind {
            ExpressionKind::Literal(_)
            | ExpressionKind::This
            | ExpressionKind::Local(_)
            | ExpressionKind::ClassLiteral(_) => false,
            ExpressionKind::Field { instance, .. } => {
                instance.as_ref().is_some_and(|i| i.has_side_effects())
            }
            ExpressionKind::Call { .. }
            | ExpressionKind::New { .. }
            | ExpressionKind::Assign { .. }
            | ExpressionKind::Foreign(_)
            | ExpressionKind::CastFailure { .. }
            | ExpressionKind::NullReceiver { .. } => true,
            ExpressionKind::Binary { operator, lhs, rhs } => {
                operator.can_throw() || lhs.has_side_effects() || rhs.has_side_effects()
            }
            ExpressionKind::Unary { operand, .. } => operand.has_side_effects(),
            ExpressionKind::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                condition.has_side_effects()
                    || then_value.has_side_effects()
                    || else_value.has_side_effects()
            }
            ExpressionKind::Cast {
                checked, operand, ..
            } => *checked || operand.has_side_effects(),
            ExpressionKind::InstanceOf { operand, .. } => operand.has_side_effects(),
            ExpressionKind::Sequence(expressions) => {
                expressions.iter().any(Expression::has_side_effects)
            }
        }
    }

    /// Collects the parts of this expression that must still be evaluated if
    /// its value is discarded, in evaluation order.
    pub fn into_residual_effects(self, out: &mut Vec<Expression>) {
        if !self.has_side_effects() {
            return;
        }

        match self.kind {
            ExpressionKind::Sequence(expressions) => {
                for expression in expressions {
                    expression.into_residual_effects(out);
                }
            }
            ExpressionKind::Field {
                instance: Some(instance),
                ..
            } => instance.into_residual_effects(out),
            ExpressionKind::Unary { operand, .. }
            | ExpressionKind::InstanceOf { operand, .. }
            | ExpressionKind::Cast {
                checked: false,
                operand,
                ..
            } => operand.into_residual_effects(out),
            ExpressionKind::Binary { operator, lhs, rhs } if !operator.can_throw() => {
                lhs.into_residual_effects(out);
                rhs.into_residual_effects(out);
            }
            kind => out.push(Expression::new(kind, self.span)),
        }
    }

    /// Builds an expression evaluated only for `effects`. With no effects at
    /// all this is an empty sequence, which is pure.
    pub fn effects_only(mut effects: Vec<Expression>, span: Span) -> Expression {
        if effects.len() == 1 {
            if let Some(single) = effects.pop() {
                return single;
            }
        }

        Expression::new(ExpressionKind::Sequence(effects), span)
    }

    /// Builds an expression evaluating `effects` in order and then yielding
    /// `value`. Collapses to `value` when there is nothing to evaluate first.
    pub fn sequence_then(effects: Vec<Expression>, value: Expression) -> Expression {
        if effects.is_empty() {
            return value;
        }

        let span = value.span;
        let mut expressions = effects;
        expressions.push(value);

        Expression::new(ExpressionKind::Sequence(expressions), span)
    }
}

impl Statement {
    pub fn new(kind: StatementKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn expression(expression: Expression) -> Self {
        let span = expression.span;
        Self::new(StatementKind::Expression(expression), span)
    }
}

/// A variable-like position with a declared type that type narrowing may
/// tighten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Local(LocalId),
    Field(FieldId),
    Return(MethodId),
}

impl Program {
    pub fn declared_types(&self) -> impl Iterator<Item = (TypeId, &DeclaredType)> + '_ {
        self.type_order.iter().map(|&id| (id, &self.types[id]))
    }

    /// Every method still attached to a live declared type, in declaration
    /// order
    pub fn attached_methods(&self) -> impl Iterator<Item = MethodId> + '_ {
        self.type_order
            .iter()
            .flat_map(|&ty| self.types[ty].methods.iter().copied())
    }

    pub fn attached_fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.type_order
            .iter()
            .flat_map(|&ty| self.types[ty].fields.iter().copied())
    }

    /// Parameters and body locals of a method
    pub fn locals_of(&self, method: MethodId) -> impl Iterator<Item = LocalId> + '_ {
        let method = &self.methods[method];
        method.params.iter().copied().chain(
            method
                .body
                .iter()
                .flat_map(|body| body.locals.iter().copied()),
        )
    }

    pub fn is_type_attached(&self, id: TypeId) -> bool {
        self.types.contains_index(id) && !self.types[id].pruned
    }

    pub fn is_method_attached(&self, id: MethodId) -> bool {
        self.methods.contains_index(id)
            && !self.methods[id].pruned
            && self.is_type_attached(self.methods[id].enclosing_type)
    }

    pub fn is_field_attached(&self, id: FieldId) -> bool {
        self.fields.contains_index(id)
            && !self.fields[id].pruned
            && self.is_type_attached(self.fields[id].enclosing_type)
    }

    pub fn is_local_attached(&self, id: LocalId) -> bool {
        self.locals.contains_index(id)
            && !self.locals[id].pruned
            && self.is_method_attached(self.locals[id].enclosing_method)
    }

    /// The static initializer in slot 0, if the type has one
    pub fn static_initializer(&self, ty: TypeId) -> Option<MethodId> {
        self.types[ty]
            .methods
            .first()
            .copied()
            .filter(|&m| self.methods[m].kind == MethodKind::StaticInitializer)
    }

    /// The instance initializer in slot 1 of a class
    pub fn instance_initializer(&self, ty: TypeId) -> Option<MethodId> {
        self.types[ty]
            .methods
            .get(1)
            .copied()
            .filter(|&m| self.methods[m].kind == MethodKind::InstanceInitializer)
    }

    /// The superclass chain starting at `ty` itself
    pub fn superclass_chain(&self, ty: TypeId) -> impl Iterator<Item = TypeId> + '_ {
        std::iter::successors(Some(ty), |&t| self.types[t].superclass)
    }

    pub fn slot_type(&self, slot: Slot) -> Type {
        match slot {
            Slot::Local(id) => self.locals[id].ty,
            Slot::Field(id) => self.fields[id].ty,
            Slot::Return(id) => self.methods[id].return_type,
        }
    }

    pub fn set_slot_type(&mut self, slot: Slot, ty: Type) {
        match slot {
            Slot::Local(id) => self.locals[id].ty = ty,
            Slot::Field(id) => self.fields[id].ty = ty,
            Slot::Return(id) => self.methods[id].return_type = ty,
        }
    }

    pub fn find_type(&self, name: &str) -> Option<TypeId> {
        self.type_order
            .iter()
            .copied()
            .find(|&id| self.types[id].name == name)
    }

    /// Looks up a method by its qualified `Type.method` name
    pub fn find_method(&self, qualified_name: &str) -> Option<MethodId> {
        let (type_name, method_name) = qualified_name.rsplit_once('.')?;
        let ty = self.find_type(type_name)?;

        self.types[ty]
            .methods
            .iter()
            .copied()
            .find(|&m| self.methods[m].name == method_name)
    }

    pub fn qualified_method_name(&self, id: MethodId) -> String {
        let method = &self.methods[id];
        format!("{}.{}", self.types[method.enclosing_type].name, method.name)
    }

    pub fn qualified_field_name(&self, id: FieldId) -> String {
        let field = &self.fields[id];
        format!("{}.{}", self.types[field.enclosing_type].name, field.name)
    }

    /// `file:line:column` of a node inside the given type
    pub fn location(&self, ty: TypeId, span: Span) -> String {
        format!(
            "{}:{}:{}",
            self.types[ty].source_file, span.line, span.column
        )
    }

    pub fn method_location(&self, id: MethodId) -> String {
        let method = &self.methods[id];
        self.location(method.enclosing_type, method.span)
    }

    pub fn type_name(&self, ty: Type) -> String {
        match ty {
            Type::Primitive(kind) => kind.to_string(),
            Type::Null => "null".to_string(),
            Type::Reference(id) => self.types[id].name.clone(),
        }
    }
}
