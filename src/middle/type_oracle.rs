//! Answers subtyping and instantiation questions about a [`Program`].
//!
//! The oracle is built from the type graph once and refreshed whenever the
//! dead code eliminator learns which types are actually instantiated. Until
//! then every concrete class is assumed to be instantiable.

use hashbrown::HashSet;
use itertools::Itertools;

use super::ir::{
    Expression, ExpressionKind, Literal, MethodId, Program, SpecialCategory,
    Type, TypeId, UnaryOperator, WellKnownTypes,
};
use crate::index::IndexVec;

#[derive(Debug, Clone)]
pub struct TypeOracle {
    /// Reflexive and transitive
    supertypes: IndexVec<TypeId, HashSet<TypeId>>,
    /// Reflexive and transitive
    subtypes: IndexVec<TypeId, HashSet<TypeId>>,
    /// Length of the superclass chain above each type
    depth: IndexVec<TypeId, usize>,
    categories: IndexVec<TypeId, SpecialCategory>,
    interfaces: HashSet<TypeId>,
    /// Types whose objects can exist at runtime: instantiated concrete classes
    /// and instantiated foreign-bridge types
    runtime: HashSet<TypeId>,
    well_known: WellKnownTypes,
}

impl TypeOracle {
    /// `program` must have passed [`Program::validate`]
    pub fn new(program: &Program) -> Self {
        let mut oracle = Self {
            supertypes: IndexVec::new(),
            subtypes: IndexVec::new(),
            depth: IndexVec::new(),
            categories: IndexVec::new(),
            interfaces: HashSet::new(),
            runtime: HashSet::new(),
            well_known: program.well_known.clone(),
        };

        oracle.rebuild(program);

        let concrete = program
            .declared_types()
            .filter(|(_, ty)| ty.is_concrete_class())
            .map(|(id, _)| id)
            .collect::<Vec<_>>();
        oracle.set_instantiated(program, concrete);

        oracle
    }

    fn rebuild(&mut self, program: &Program) {
        let object = program.well_known.object;

        self.supertypes = program.types.iter().map(|_| HashSet::new()).collect();
        self.subtypes = program.types.iter().map(|_| HashSet::new()).collect();
        self.categories = program.types.iter().map(|ty| ty.category).collect();
        self.depth = program
            .types
            .indices()
            .map(|id| program.superclass_chain(id).count() - 1)
            .collect();
        self.interfaces = program
            .declared_types()
            .filter(|(_, ty)| ty.is_interface())
            .map(|(id, _)| id)
            .collect();
        self.well_known = program.well_known.clone();

        for &ty in program.type_order.iter() {
            let mut worklist = vec![ty];
            let mut seen = HashSet::from([ty]);

            while let Some(current) = worklist.pop() {
                let Some(declared) = program.types.get(current) else {
                    continue;
                };
                let direct = declared.superclass.iter().chain(declared.interfaces.iter());

                for &supertype in direct {
                    if program.is_type_attached(supertype) && seen.insert(supertype) {
                        worklist.push(supertype);
                    }
                }
            }

            // Every reference type converts to the root object type
            seen.insert(object);

            for &supertype in seen.iter() {
                self.subtypes[supertype].insert(ty);
            }
            self.supertypes[ty] = seen;
        }
    }

    /// Installs the set of instantiated types computed by a reachability
    /// analysis. Abstract types and interfaces in the set are ignored unless
    /// they are foreign-bridge types.
    pub fn set_instantiated(&mut self, program: &Program, types: impl IntoIterator<Item = TypeId>) {
        self.runtime = types
            .into_iter()
            .filter(|&id| {
                let ty = &program.types[id];
                ty.is_concrete_class() || ty.category.is_foreign_bridge()
            })
            .collect();
    }

    /// Recomputes the subtype index for a pruned program and installs its
    /// instantiated set
    pub fn refresh(&mut self, program: &Program, instantiated: impl IntoIterator<Item = TypeId>) {
        self.rebuild(program);
        self.set_instantiated(program, instantiated);
    }

    pub fn object(&self) -> TypeId {
        self.well_known.object
    }

    pub fn category(&self, ty: TypeId) -> SpecialCategory {
        self.categories[ty]
    }

    pub fn is_interface(&self, ty: TypeId) -> bool {
        self.interfaces.contains(&ty)
    }

    pub fn is_instantiated(&self, ty: TypeId) -> bool {
        self.runtime.contains(&ty)
    }

    pub fn supertypes(&self, ty: TypeId) -> &HashSet<TypeId> {
        &self.supertypes[ty]
    }

    pub fn subtypes(&self, ty: TypeId) -> &HashSet<TypeId> {
        &self.subtypes[ty]
    }

    pub fn is_subtype_of(&self, ty: TypeId, of: TypeId) -> bool {
        self.supertypes[ty].contains(&of)
    }

    /// `a <= b`. Null is below every reference type, primitives are only
    /// related to themselves.
    pub fn is_subtype(&self, a: Type, b: Type) -> bool {
        match (a, b) {
            _ if a == b => true,
            (Type::Null, Type::Reference(_)) => true,
            (Type::Reference(a), Type::Reference(b)) => self.is_subtype_of(a, b),
            _ => false,
        }
    }

    /// The tighter of two types. `a` if it is a subtype of `b`, otherwise `b`.
    pub fn stronger_of(&self, a: Type, b: Type) -> Type {
        if self.is_subtype(a, b) { a } else { b }
    }

    /// Least common supertype of `a` and `b`. When the common supertypes have
    /// several minimal elements the deepest common superclass is chosen.
    pub fn generalize(&self, a: Type, b: Type) -> Type {
        if self.is_subtype(a, b) {
            return b;
        }

        if self.is_subtype(b, a) {
            return a;
        }

        let (Type::Reference(a), Type::Reference(b)) = (a, b) else {
            return a;
        };

        let common = self.supertypes[a]
            .intersection(&self.supertypes[b])
            .copied()
            .collect::<Vec<_>>();

        let minimal = common
            .iter()
            .copied()
            .filter(|&candidate| {
                !common
                    .iter()
                    .any(|&other| other != candidate && self.is_subtype_of(other, candidate))
            })
            .collect::<Vec<_>>();

        if let [single] = minimal[..] {
            return Type::Reference(single);
        }

        common
            .into_iter()
            .filter(|ty| !self.is_interface(*ty))
            .max_by_key(|&ty| (self.depth[ty], std::cmp::Reverse(ty)))
            .map_or(Type::Reference(self.object()), Type::Reference)
    }

    /// Joins any number of types. An empty join is the bottom type.
    pub fn join(&self, types: impl IntoIterator<Item = Type>) -> Type {
        types
            .into_iter()
            .reduce(|a, b| self.generalize(a, b))
            .unwrap_or(Type::Null)
    }

    /// Runtime types at or below `ty`, in id order
    pub fn instantiated_subtypes(&self, ty: TypeId) -> Vec<TypeId> {
        self.subtypes[ty]
            .iter()
            .copied()
            .filter(|id| self.runtime.contains(id))
            .sorted()
            .collect()
    }

    /// Whether a value of type `ty` could be a foreign object
    pub fn may_be_foreign(&self, ty: TypeId) -> bool {
        if self.categories[ty] == SpecialCategory::DualDispatchInterface {
            return self
                .well_known
                .foreign_object
                .is_some_and(|root| self.runtime.contains(&root));
        }

        self.subtypes[ty]
            .iter()
            .any(|id| self.runtime.contains(id) && self.categories[*id].is_foreign_bridge())
    }

    /// Whether any object at all can have type `ty` at runtime
    pub fn has_instantiated_subtype(&self, ty: TypeId) -> bool {
        self.may_be_foreign(ty)
            || self.subtypes[ty]
                .iter()
                .any(|id| self.runtime.contains(id))
    }

    /// The only runtime class at or below `ty`, if there is exactly one and the
    /// substitution is safe. Foreign-bridge types and dual-dispatch interfaces
    /// never qualify, nor does anything that may hold a foreign object.
    pub fn single_concrete_implementor(&self, ty: TypeId) -> Option<TypeId> {
        if self.categories[ty] != SpecialCategory::Ordinary || self.may_be_foreign(ty) {
            return None;
        }

        match self.instantiated_subtypes(ty)[..] {
            [single] if self.categories[single] == SpecialCategory::Ordinary => Some(single),
            _ => None,
        }
    }

    /// Narrows a reference type using instantiation facts alone: a type no
    /// object can have becomes the bottom type, and a type with exactly one
    /// possible runtime class becomes that class.
    pub fn tighten_reference(&self, ty: Type) -> Type {
        let Type::Reference(id) = ty else {
            return ty;
        };

        if !self.has_instantiated_subtype(id) {
            return Type::Null;
        }

        self.single_concrete_implementor(id)
            .map_or(ty, Type::Reference)
    }

    /// A cast from `from` to `to` can never fail
    pub fn can_trivially_cast(&self, from: Type, to: TypeId) -> bool {
        self.is_subtype(from, Type::Reference(to))
    }

    /// Some runtime value of type `from` could pass a cast to `to`. Null
    /// always passes.
    pub fn can_theoretically_cast(&self, from: Type, to: TypeId) -> bool {
        let from = match from {
            Type::Null => return true,
            Type::Primitive(_) => return false,
            Type::Reference(from) => from,
        };

        let shared_runtime_type = self.subtypes[from]
            .iter()
            .any(|id| self.runtime.contains(id) && self.is_subtype_of(*id, to));

        // Foreign objects satisfy dual-dispatch interfaces structurally
        let foreign_crossing = (self.categories[to] == SpecialCategory::DualDispatchInterface
            && self.may_be_foreign(from))
            || (self.categories[from] == SpecialCategory::DualDispatchInterface
                && self.may_be_foreign(to));

        shared_runtime_type || foreign_crossing
    }

    /// No runtime value other than null can have both types
    pub fn is_disjoint(&self, from: Type, to: TypeId) -> bool {
        !self.can_theoretically_cast(from, to)
    }

    /// Static type of an expression inside `method`
    pub fn type_of(&self, program: &Program, expression: &Expression, method: MethodId) -> Type {
        match &expression.kind {
            ExpressionKind::Literal(literal) => self.literal_type(literal),
            ExpressionKind::This => Type::Reference(program.methods[method].enclosing_type),
            ExpressionKind::Local(local) => program.locals[*local].ty,
            ExpressionKind::Field { field, .. } => program.fields[*field].ty,
            ExpressionKind::Call { method, .. } => program.methods[*method].return_type,
            ExpressionKind::New { class, .. } => Type::Reference(*class),
            ExpressionKind::Assign { target, .. } => self.type_of(program, target, method),
            ExpressionKind::Binary { operator, .. } if operator.yields_boolean() => Type::BOOLEAN,
            ExpressionKind::Binary { .. } => Type::INT,
            ExpressionKind::Unary { operator, .. } => match operator {
                UnaryOperator::Not => Type::BOOLEAN,
                UnaryOperator::Negate => Type::INT,
            },
            ExpressionKind::Conditional {
                then_value,
                else_value,
                ..
            } => self.generalize(
                self.type_of(program, then_value, method),
                self.type_of(program, else_value, method),
            ),
            ExpressionKind::Cast { target, .. } => Type::Reference(*target),
            ExpressionKind::InstanceOf { .. } => Type::BOOLEAN,
            ExpressionKind::ClassLiteral(_) => {
                Type::Reference(self.well_known.class.unwrap_or(self.object()))
            }
            ExpressionKind::Sequence(expressions) => expressions
                .last()
                .map_or(Type::VOID, |last| self.type_of(program, last, method)),
            ExpressionKind::Foreign(code) => code.result_type,
            ExpressionKind::CastFailure { .. } | ExpressionKind::NullReceiver { .. } => Type::Null,
        }
    }

    pub fn literal_type(&self, literal: &Literal) -> Type {
        match literal {
            Literal::Null => Type::Null,
            Literal::Bool(_) => Type::BOOLEAN,
            Literal::Int(_) => Type::INT,
            Literal::String(_) => Type::Reference(self.well_known.string.unwrap_or(self.object())),
        }
    }
}
