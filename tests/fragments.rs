mod common;

use globopt::{
    Atom, FragmentPartitioner,
    middle::{
        fragments::INITIAL_FRAGMENT,
        ir::{Statement, Type, builder::ProgramBuilder as B},
        optimization::reachability::{LiveSet, ReachabilityAnalyzer},
        type_oracle::TypeOracle,
    },
};
use proptest::prelude::*;

use common::{hierarchy_with_entries, select};

fn is_live(atom: &Atom, live: &LiveSet) -> bool {
    match atom {
        Atom::Type(ty) => live.is_referenced(*ty),
        Atom::Method(method) => live.is_method_live(*method),
        Atom::Field(field) => live.is_field_live(*field),
        Atom::String(string) => live.is_string_live(string),
    }
}

#[test]
fn code_only_one_entry_reaches_is_deferred_with_it() {
    let mut builder = B::new();
    let app = builder.class("Main", None);
    let init = builder.static_method(app, "init", Type::VOID);
    builder.entry(init);

    let editor = builder.class("Editor", None);
    let editor_new = builder.constructor(editor);
    let viewer = builder.class("Viewer", None);
    let viewer_new = builder.constructor(viewer);

    let open_editor = builder.static_method(app, "openEditor", Type::VOID);
    builder.push_statement(
        open_editor,
        Statement::expression(B::new_object(editor, editor_new, vec![])),
    );
    let open_viewer = builder.static_method(app, "openViewer", Type::VOID);
    builder.push_statement(
        open_viewer,
        Statement::expression(B::new_object(viewer, viewer_new, vec![])),
    );
    let program = builder.finish();

    let oracle = TypeOracle::new(&program);
    let assignment = FragmentPartitioner::new(&program, &oracle)
        .partition(&[open_editor, open_viewer])
        .unwrap();

    assert_eq!(assignment.fragment_of(&Atom::Type(editor)), Some(1));
    assert_eq!(assignment.fragment_of(&Atom::Method(editor_new)), Some(1));
    assert_eq!(assignment.fragment_of(&Atom::Type(viewer)), Some(2));
    assert_eq!(assignment.fragment_of(&Atom::Method(init)), Some(INITIAL_FRAGMENT));
    assert_eq!(assignment.fragment_of(&Atom::Type(app)), Some(INITIAL_FRAGMENT));
}

proptest! {
    #[test]
    fn fix_up_only_moves_atoms_into_the_initial_fragment(
        (hierarchy, mask) in hierarchy_with_entries(),
    ) {
        let generated = hierarchy.build();
        let mut program = generated.program;

        let initial = select(&generated.functions, &mask);
        let deferred = generated
            .functions
            .iter()
            .copied()
            .filter(|function| !initial.contains(function))
            .collect::<Vec<_>>();
        program.entry_methods = initial.clone();

        let oracle = TypeOracle::new(&program);
        let assignment = FragmentPartitioner::new(&program, &oracle)
            .partition(&deferred)
            .unwrap();

        let complete = ReachabilityAnalyzer::analyze(
            &program,
            &oracle,
            &initial.iter().chain(deferred.iter()).copied().collect::<Vec<_>>(),
        )
        .unwrap();
        let without = (0..deferred.len())
            .map(|left_out| {
                let entries = initial
                    .iter()
                    .chain(
                        deferred
                            .iter()
                            .enumerate()
                            .filter(|&(i, _)| i != left_out)
                            .map(|(_, function)| function),
                    )
                    .copied()
                    .collect::<Vec<_>>();
                ReachabilityAnalyzer::analyze(&program, &oracle, &entries).unwrap()
            })
            .collect::<Vec<_>>();

        for (atom, fragment) in assignment.iter() {
            prop_assert!(is_live(atom, &complete));

            let missing_from = without
                .iter()
                .enumerate()
                .filter(|(_, live)| !is_live(atom, live))
                .map(|(i, _)| i + 1)
                .collect::<Vec<_>>();
            let before_fix_up = match missing_from[..] {
                [only] => only,
                _ => INITIAL_FRAGMENT,
            };

            prop_assert!(fragment == before_fix_up || fragment == INITIAL_FRAGMENT);
        }

        let total = (0..assignment.fragment_count())
            .map(|fragment| assignment.atoms_in(fragment).count())
            .sum::<usize>();
        prop_assert_eq!(total, assignment.len());
    }
}
