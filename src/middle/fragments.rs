//! Splits a program into lazily loaded fragments.
//!
//! Fragment 0 is loaded up front and holds everything the initial entry
//! methods need, plus anything more than one deferred entry needs. Fragment
//! `i` holds what only deferred entry `i` needs: the atoms that are live when
//! every entry is considered but disappear when entry `i` alone is left out.

use std::collections::BTreeMap;

use log::{debug, trace};
use rayon::prelude::*;
use serde::Serialize;

use super::{
    ir::{FieldId, Literal, MethodId, Program, TypeId},
    optimization::reachability::{LiveSet, ReachabilityAnalyzer},
    type_oracle::TypeOracle,
};
use crate::error::{OptimizerResult, ResultExt};

pub type FragmentId = usize;

/// The initially loaded fragment
pub const INITIAL_FRAGMENT: FragmentId = 0;

/// A unit of code or data that is loaded as a whole
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Atom {
    Type(TypeId),
    Method(MethodId),
    Field(FieldId),
    String(String),
}

impl Atom {
    fn is_live(&self, live: &LiveSet) -> bool {
        match self {
            Atom::Type(ty) => live.is_referenced(*ty),
            Atom::Method(method) => live.is_method_live(*method),
            Atom::Field(field) => live.is_field_live(*field),
            Atom::String(string) => live.is_string_live(string),
        }
    }

    /// Atoms that must already be loaded when this one is
    fn load_dependencies(&self, program: &Program) -> Vec<Atom> {
        match self {
            Atom::Type(ty) => {
                let declared = &program.types[*ty];

                declared
                    .superclass
                    .iter()
                    .chain(declared.interfaces.iter())
                    .map(|&supertype| Atom::Type(supertype))
                    .chain([Atom::String(declared.name.clone())])
                    .collect()
            }
            Atom::Method(method) => vec![Atom::Type(program.methods[*method].enclosing_type)],
            Atom::Field(field) => {
                let declared = &program.fields[*field];
                let mut dependencies = vec![Atom::Type(declared.enclosing_type)];

                if let Some(Literal::String(value)) = &declared.initializer {
                    dependencies.push(Atom::String(value.clone()));
                }

                dependencies
            }
            Atom::String(_) => Vec::new(),
        }
    }

    pub fn describe(&self, program: &Program) -> String {
        match self {
            Atom::Type(ty) => format!("type {}", program.types[*ty].name),
            Atom::Method(method) => format!("method {}", program.qualified_method_name(*method)),
            Atom::Field(field) => format!("field {}", program.qualified_field_name(*field)),
            Atom::String(string) => format!("string {string:?}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentAssignment {
    fragments: BTreeMap<Atom, FragmentId>,
    fragment_count: usize,
}

impl FragmentAssignment {
    pub fn fragment_of(&self, atom: &Atom) -> Option<FragmentId> {
        self.fragments.get(atom).copied()
    }

    pub fn atoms_in(&self, fragment: FragmentId) -> impl Iterator<Item = &Atom> + '_ {
        self.fragments
            .iter()
            .filter(move |&(_, &assigned)| assigned == fragment)
            .map(|(atom, _)| atom)
    }

    /// The initial fragment plus one per deferred entry
    pub fn fragment_count(&self) -> usize {
        self.fragment_count
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Atom, FragmentId)> + '_ {
        self.fragments.iter().map(|(atom, &fragment)| (atom, fragment))
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

pub struct FragmentPartitioner<'p> {
    program: &'p Program,
    oracle: &'p TypeOracle,
}

impl<'p> FragmentPartitioner<'p> {
    pub fn new(program: &'p Program, oracle: &'p TypeOracle) -> Self {
        Self { program, oracle }
    }

    /// Assigns every atom live from the program's entry methods or from
    /// `deferred` to a fragment. Deferred entry `i` (0-based) owns fragment
    /// `i + 1`.
    pub fn partition(&self, deferred: &[MethodId]) -> OptimizerResult<FragmentAssignment> {
        let program = self.program;

        let mut initial = ReachabilityAnalyzer::new(program, self.oracle);
        initial
            .rescue_entry_methods(&program.entry_methods)
            .context_with(|| "while analyzing the initial fragment".to_string())?;

        let mut complete = initial.clone();
        complete
            .rescue_entry_methods(deferred)
            .context_with(|| "while analyzing all fragments".to_string())?;
        let complete = complete.into_live_set();

        let without = (0..deferred.len())
            .into_par_iter()
            .map(|left_out| {
                let others = deferred
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| i != left_out)
                    .map(|(_, &method)| method)
                    .collect::<Vec<_>>();

                let mut analyzer = initial.clone();
                analyzer.rescue_entry_methods(&others).context_with(|| {
                    format!(
                        "while analyzing everything but {}",
                        program.qualified_method_name(deferred[left_out])
                    )
                })?;

                Ok(analyzer.into_live_set())
            })
            .collect::<OptimizerResult<Vec<_>>>()?;

        let mut fragments = BTreeMap::new();

        for atom in live_atoms(program, &complete) {
            let mut missing_from = without
                .iter()
                .enumerate()
                .filter(|(_, live)| !atom.is_live(live))
                .map(|(i, _)| i);

            let fragment = match (missing_from.next(), missing_from.next()) {
                (Some(only), None) => only + 1,
                _ => INITIAL_FRAGMENT,
            };

            fragments.insert(atom, fragment);
        }

        let mut assignment = FragmentAssignment {
            fragments,
            fragment_count: deferred.len() + 1,
        };

        let moved = self.pull_dependencies_into_initial(&mut assignment);

        debug!(
            "partitioned {} atoms into {} fragments, {} moved to the initial fragment",
            assignment.len(),
            assignment.fragment_count(),
            moved
        );

        Ok(assignment)
    }

    /// Moves every atom an initial atom needs at load time into the initial
    /// fragment, transitively. Atoms only ever move toward fragment 0.
    fn pull_dependencies_into_initial(&self, assignment: &mut FragmentAssignment) -> usize {
        let program = self.program;
        let mut moved = 0;

        let mut worklist = assignment
            .atoms_in(INITIAL_FRAGMENT)
            .cloned()
            .collect::<Vec<_>>();

        while let Some(atom) = worklist.pop() {
            for dependency in atom.load_dependencies(program) {
                let Some(fragment) = assignment.fragments.get_mut(&dependency) else {
                    continue;
                };

                if *fragment != INITIAL_FRAGMENT {
                    trace!(
                        "{} is needed by {}, moving it out of fragment {}",
                        dependency.describe(program),
                        atom.describe(program),
                        fragment
                    );
                    *fragment = INITIAL_FRAGMENT;
                    moved += 1;
                    worklist.push(dependency);
                }
            }
        }

        moved
    }
}

fn live_atoms(program: &Program, live: &LiveSet) -> Vec<Atom> {
    let types = live.referenced_types.iter().map(|&ty| Atom::Type(ty));
    let methods = live
        .live_methods()
        .filter(|&method| program.is_method_attached(method))
        .map(Atom::Method);
    let fields = live.live_fields().map(Atom::Field);
    let strings = live.live_strings.iter().cloned().map(Atom::String);

    types.chain(methods).chain(fields).chain(strings).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ir::{Statement, Type, builder::ProgramBuilder as B};

    struct App {
        program: Program,
        shared: TypeId,
        widget: TypeId,
        gadget: TypeId,
        help: MethodId,
        open_widget: MethodId,
        open_gadget: MethodId,
    }

    /// `Main.run` calls into `Shared`. Each feature instantiates its own class,
    /// both call `Util.help`, and only the widget feature takes the class
    /// literal of `Shared`.
    fn app() -> App {
        let mut builder = B::new();
        builder.string_class();
        builder.class_literal_class();
        let main = builder.class("Main", None);
        let util = builder.class("Util", None);
        let help = builder.static_method(util, "help", Type::VOID);
        let shared = builder.class("Shared", None);
        let touch = builder.static_method(shared, "touch", Type::VOID);
        let widget = builder.class("Widget", None);
        let widget_new = builder.constructor(widget);
        let gadget = builder.class("Gadget", None);
        let gadget_new = builder.constructor(gadget);

        let run = builder.static_method(main, "run", Type::VOID);
        builder.entry(run);
        builder.push_statement(run, Statement::expression(B::static_call(touch, vec![])));

        let open_widget = builder.static_method(main, "openWidget", Type::VOID);
        builder.push_statement(
            open_widget,
            Statement::expression(B::new_object(widget, widget_new, vec![])),
        );
        builder.push_statement(open_widget, Statement::expression(B::static_call(help, vec![])));
        let object = builder.program().well_known.object;
        let shared_name = builder.local(open_widget, "name", Type::Reference(object));
        builder.push_statement(
            open_widget,
            B::declare_local(shared_name, Some(B::class_literal(shared))),
        );

        let open_gadget = builder.static_method(main, "openGadget", Type::VOID);
        builder.push_statement(
            open_gadget,
            Statement::expression(B::new_object(gadget, gadget_new, vec![])),
        );
        builder.push_statement(open_gadget, Statement::expression(B::static_call(help, vec![])));

        App {
            program: builder.finish(),
            shared,
            widget,
            gadget,
            help,
            open_widget,
            open_gadget,
        }
    }

    #[test]
    fn exclusive_atoms_go_to_their_entry_fragment() {
        let app = app();
        let oracle = TypeOracle::new(&app.program);
        let assignment = FragmentPartitioner::new(&app.program, &oracle)
            .partition(&[app.open_widget, app.open_gadget])
            .unwrap();

        assert_eq!(assignment.fragment_count(), 3);
        assert_eq!(assignment.fragment_of(&Atom::Type(app.widget)), Some(1));
        assert_eq!(assignment.fragment_of(&Atom::Type(app.gadget)), Some(2));
        assert_eq!(assignment.fragment_of(&Atom::Method(app.open_widget)), Some(1));
        assert_eq!(assignment.fragment_of(&Atom::Method(app.help)), Some(0));
        assert_eq!(assignment.fragment_of(&Atom::Type(app.shared)), Some(0));
    }

    #[test]
    fn load_dependencies_of_initial_atoms_move_to_the_initial_fragment() {
        let app = app();
        let oracle = TypeOracle::new(&app.program);
        let assignment = FragmentPartitioner::new(&app.program, &oracle)
            .partition(&[app.open_widget, app.open_gadget])
            .unwrap();

        // Only the widget feature needs the name of `Shared`, but the type
        // itself is initial and carries its name
        assert_eq!(
            assignment.fragment_of(&Atom::String("Shared".to_string())),
            Some(0)
        );
        assert_eq!(
            assignment.fragment_of(&Atom::String("Widget".to_string())),
            None
        );
    }

    #[test]
    fn every_atom_lands_in_exactly_one_fragment() {
        let app = app();
        let oracle = TypeOracle::new(&app.program);
        let assignment = FragmentPartitioner::new(&app.program, &oracle)
            .partition(&[app.open_widget, app.open_gadget])
            .unwrap();

        let total = (0..assignment.fragment_count())
            .map(|fragment| assignment.atoms_in(fragment).count())
            .sum::<usize>();

        assert_eq!(total, assignment.len());
    }
}
