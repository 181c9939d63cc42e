pub mod engine;
pub mod inverse;
pub mod repair;

pub use engine::ConsistencyEngine;
pub use inverse::{inverse_of, InverseResolver};
pub use repair::{ConsistencyRepairWarning, InvariantViolation, RepairReport, ViolationKind};
