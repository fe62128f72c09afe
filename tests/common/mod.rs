#![allow(dead_code)]

use globopt::middle::ir::{
    BinaryOperator, MethodId, Program, Statement, Type, TypeId, builder::ProgramBuilder as B,
};
use proptest::prelude::*;

/// What one statement of a generated static function does
#[derive(Debug, Clone)]
pub enum Action {
    /// `new C{i}()`
    New(usize),
    /// `Main.f{i}()`
    Call(usize),
    /// `new C{i}().m()`, calling the `m` of the topmost ancestor
    Virtual(usize),
    /// `C{i}.count += 1`
    Bump(usize),
}

/// Shape of a randomly generated program: a forest of classes, each with an
/// overridable `m` calling one of the static functions of `Main`. Root classes
/// implement the marker interfaces `Tagged` and `Named`.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    /// Parent of each class. Only parents declared earlier count.
    pub parents: Vec<Option<usize>>,
    /// Static function each class's `m` calls
    pub callees: Vec<usize>,
    pub bodies: Vec<Vec<Action>>,
}

pub struct Generated {
    pub program: Program,
    pub functions: Vec<MethodId>,
    pub classes: Vec<TypeId>,
}

pub fn hierarchy() -> impl Strategy<Value = Hierarchy> {
    (1usize..6, 1usize..5).prop_flat_map(|(classes, functions)| {
        let action = prop_oneof![
            (0..classes).prop_map(Action::New),
            (0..functions).prop_map(Action::Call),
            (0..classes).prop_map(Action::Virtual),
            (0..classes).prop_map(Action::Bump),
        ];

        (
            prop::collection::vec(prop::option::of(0..classes), classes),
            prop::collection::vec(0..functions, classes),
            prop::collection::vec(prop::collection::vec(action, 0..4), functions),
        )
            .prop_map(|(parents, callees, bodies)| Hierarchy {
                parents,
                callees,
                bodies,
            })
    })
}

/// A generated hierarchy with a subset of its functions as entries
pub fn hierarchy_with_entries() -> impl Strategy<Value = (Hierarchy, Vec<bool>)> {
    hierarchy().prop_flat_map(|hierarchy| {
        let functions = hierarchy.bodies.len();
        (
            Just(hierarchy),
            prop::collection::vec(any::<bool>(), functions),
        )
    })
}

impl Hierarchy {
    fn parent(&self, class: usize) -> Option<usize> {
        self.parents[class].filter(|&parent| parent < class)
    }

    fn root(&self, mut class: usize) -> usize {
        while let Some(parent) = self.parent(class) {
            class = parent;
        }
        class
    }

    pub fn build(&self) -> Generated {
        let mut builder = B::new();
        let main = builder.class("Main", None);

        let functions = (0..self.bodies.len())
            .map(|i| builder.static_method(main, &format!("f{i}"), Type::VOID))
            .collect::<Vec<_>>();

        let mut classes = Vec::new();
        let mut constructors = Vec::new();
        let mut methods = Vec::new();
        let mut counters = Vec::new();
        let markers = [builder.interface("Tagged", &[]), builder.interface("Named", &[])];

        for class in 0..self.parents.len() {
            let superclass = self.parent(class).map(|parent| classes[parent]);
            let ty = builder.class(&format!("C{class}"), superclass);
            if superclass.is_none() {
                for marker in markers {
                    builder.implement(ty, marker);
                }
            }

            constructors.push(builder.constructor(ty));
            counters.push(builder.field(ty, "count", Type::INT, true));
            builder.field(ty, "limit", Type::INT, true);

            let m = builder.method(ty, "m", Type::VOID);
            builder.push_statement(
                m,
                Statement::expression(B::static_call(functions[self.callees[class]], vec![])),
            );
            methods.push(m);
            classes.push(ty);
        }

        for (function, body) in self.bodies.iter().enumerate() {
            for action in body {
                let expression = match *action {
                    Action::New(class) => B::new_object(classes[class], constructors[class], vec![]),
                    Action::Call(callee) => B::static_call(functions[callee], vec![]),
                    Action::Virtual(class) => B::call(
                        B::new_object(classes[class], constructors[class], vec![]),
                        methods[self.root(class)],
                        vec![],
                    ),
                    Action::Bump(class) => B::compound_assign(
                        BinaryOperator::Add,
                        B::field_ref(None, counters[class]),
                        B::int(1),
                    ),
                };

                builder.push_statement(functions[function], Statement::expression(expression));
            }
        }

        Generated {
            program: builder.finish(),
            functions,
            classes,
        }
    }
}

pub fn select(functions: &[MethodId], mask: &[bool]) -> Vec<MethodId> {
    functions
        .iter()
        .zip(mask)
        .filter(|(_, selected)| **selected)
        .map(|(&function, _)| function)
        .collect()
}
