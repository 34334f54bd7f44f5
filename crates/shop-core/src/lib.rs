#![deny(warnings)]

//! Core domain models and invariants for the make-to-order shop simulation.
//!
//! This crate defines the serializable types shared by routing and the
//! runtime engine, the deterministic random stream, session settings, and
//! validation helpers that guard the basic invariants.

mod model;
mod settings;
mod stream;

pub use model::*;
pub use settings::*;
pub use stream::*;

use thiserror::Error;

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Efficiency must stay within [0.8, 1.2].
    #[error("department {0}: efficiency {1} outside [0.8, 1.2]")]
    EfficiencyOutOfRange(DepartmentId, f64),
    /// Equipment condition must stay within [0.95, 1.0].
    #[error("department {0}: equipment condition {1} outside [0.95, 1.0]")]
    ConditionOutOfRange(DepartmentId, f64),
    /// Capacity must be at least one.
    #[error("department {0} has zero capacity")]
    ZeroCapacity(DepartmentId),
    /// Step index must point into the route.
    #[error("order {order}: step {step} out of range for route of {len}")]
    StepOutOfRange { order: OrderId, step: usize, len: usize },
    /// Order sits at a department that is not its current route step.
    #[error("order {order} is held by {held_by} but its current step is {expected:?}")]
    Misplaced {
        order: OrderId,
        held_by: DepartmentId,
        expected: Option<DepartmentId>,
    },
    /// The same order appears in more than one place.
    #[error("order {0} appears more than once")]
    DuplicateOrder(OrderId),
    /// Orders were created or lost.
    #[error("order count {found} does not match {expected} generated")]
    ConservationBroken { expected: u64, found: u64 },
}

/// Validate department tunables.
pub fn validate_department(d: &Department) -> Result<(), ValidationError> {
    if !d.efficiency.is_finite() || !(0.8..=1.2).contains(&d.efficiency) {
        return Err(ValidationError::EfficiencyOutOfRange(d.id, d.efficiency));
    }
    if !d.equipment_condition.is_finite() || !(0.95..=1.0).contains(&d.equipment_condition) {
        return Err(ValidationError::ConditionOutOfRange(d.id, d.equipment_condition));
    }
    if d.capacity == 0 {
        return Err(ValidationError::ZeroCapacity(d.id));
    }
    Ok(())
}

/// Validate that an order's step index points into its route.
pub fn validate_order(o: &Order) -> Result<(), ValidationError> {
    if let Some(step) = o.current_step {
        if step >= o.route.len() {
            return Err(ValidationError::StepOutOfRange {
                order: o.id,
                step,
                len: o.route.len(),
            });
        }
    }
    Ok(())
}

/// Validate that an order held by `department` is at that route step.
pub fn validate_placement(o: &Order, department: DepartmentId) -> Result<(), ValidationError> {
    validate_order(o)?;
    let expected = o.current_department();
    if expected != Some(department) {
        return Err(ValidationError::Misplaced {
            order: o.id,
            held_by: department,
            expected,
        });
    }
    Ok(())
}
