//! Whole-program optimizer for a class-based language being cross-compiled to
//! a prototype-based target: reachability-driven dead code elimination, type
//! narrowing with devirtualization, and fragment partitioning for lazy
//! loading.

pub mod config;
pub mod error;
pub mod index;
pub mod middle;

pub use config::OptimizerOptions;
pub use error::{InternalCompilerError, OptimizerResult};
pub use middle::{
    fragments::{Atom, FragmentAssignment, FragmentPartitioner},
    ir::Program,
    optimization::{OptimizationStats, Optimizer},
};
