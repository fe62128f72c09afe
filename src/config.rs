use serde::{Deserialize, Serialize};

/// Types the generated code's runtime support calls into by name. They are
/// rescued unconditionally when [`OptimizerOptions::preserve_scaffolding_types`]
/// is set, so that test harnesses and hand-written runtime glue can still
/// reach them after pruning.
pub const SCAFFOLDING_TYPES: &[&str] = &[
    "Object",
    "String",
    "Class",
    "Throwable",
    "Exception",
    "RuntimeException",
    "ClassCastException",
    "NullPointerException",
    "ArithmeticException",
    "ArrayStoreException",
    "Enum",
    "Cast",
    "Array",
    "Util",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerOptions {
    /// Casts are trusted: they are still narrowed and trivially true casts are
    /// still removed, but the rest are never checked at runtime
    pub disable_cast_checking: bool,
    /// Rescue [`SCAFFOLDING_TYPES`] even when nothing references them
    pub preserve_scaffolding_types: bool,
    /// Upper bound on eliminate/tighten rounds
    pub max_rounds: usize,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            disable_cast_checking: false,
            preserve_scaffolding_types: false,
            max_rounds: 16,
        }
    }
}
