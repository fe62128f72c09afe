use hashbrown::HashSet;

use super::ir::{MethodId, Program};
use crate::index::IndexVec;

/// Transitive closure of the override relation of a program.
///
/// Built once per analysis: the reachability up-ref fixpoint asks which live
/// methods a candidate overrides, and type narrowing links parameters and
/// return slots along these edges.
#[derive(Debug, Clone, Default)]
pub struct OverrideGraph {
    overrides: IndexVec<MethodId, Vec<MethodId>>,
    overridden_by: IndexVec<MethodId, Vec<MethodId>>,
}

impl OverrideGraph {
    pub fn new(program: &Program) -> Self {
        let overrides = program
            .methods
            .indices()
            .map(|method| close(program, method, |m| &program.methods[m].overrides))
            .collect();
        let overridden_by = program
            .methods
            .indices()
            .map(|method| close(program, method, |m| &program.methods[m].overridden_by))
            .collect();

        Self {
            overrides,
            overridden_by,
        }
    }

    /// Every method `method` overrides, directly or not, in id order
    pub fn overrides(&self, method: MethodId) -> &[MethodId] {
        self.overrides.get(method).map_or(&[], Vec::as_slice)
    }

    /// Every method overriding `method`, directly or not, in id order
    pub fn overridden_by(&self, method: MethodId) -> &[MethodId] {
        self.overridden_by.get(method).map_or(&[], Vec::as_slice)
    }
}

fn close<'p>(
    program: &'p Program,
    method: MethodId,
    edges: impl Fn(MethodId) -> &'p Vec<MethodId>,
) -> Vec<MethodId> {
    let mut seen = HashSet::new();
    let mut worklist = vec![method];

    while let Some(current) = worklist.pop() {
        for &next in edges(current).iter() {
            if next != method && program.is_method_attached(next) && seen.insert(next) {
                worklist.push(next);
            }
        }
    }

    let mut closed = seen.into_iter().collect::<Vec<_>>();
    closed.sort();
    closed
}
