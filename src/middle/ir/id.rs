use crate::index::simple_index;

simple_index! {
    /// Identifies a declared type (class, interface or enum) in the program.
    /// Ids stay valid after the type is pruned; the node is only detached.
    pub struct TypeId = "T";
}

simple_index! {
    /// Identifies a method of some declared type
    pub struct MethodId = "M";
}

simple_index! {
    /// Identifies a static or instance field of some declared type
    pub struct FieldId = "F";
}

simple_index! {
    /// Identifies a local variable, parameter, catch binding or compiler
    /// temporary. All of these live in the same arena so the passes can treat
    /// them uniformly.
    pub struct LocalId = "L";
}
