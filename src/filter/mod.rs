// src/filter/mod.rs
// Filter subsystem: tree types (C4/C5 shared vocabulary), the validator
// (C4), and the compiler (C5).

pub mod compiler;
pub mod tree;
pub mod validator;

pub use compiler::{CompiledFilter, FieldTypeLookup};
pub use tree::{FilterNode, GroupOperator, Operator, Predicate};
pub use validator::{ValidationOutcome, ValidationWarning, WarningCollector};
