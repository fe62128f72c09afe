//! The optimizer proper. The program model lives in [`ir`]; everything else
//! here reads or rewrites it.

pub mod fragments;
pub mod ir;
pub mod optimization;
pub mod override_graph;
pub mod type_oracle;
