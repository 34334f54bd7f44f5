//! The order-holding part of the game state.
//!
//! Everything an order can belong to lives here, so the floor is also the
//! unit that decisions snapshot and undo restores.

use serde::{Deserialize, Serialize};
use shop_core::{
    validate_department, validate_order, validate_placement, Department, DepartmentId, Operation,
    Order, OrderId, Stream, ValidationError,
};
use std::collections::BTreeSet;

/// Departments plus every order collection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Floor {
    pub departments: Vec<Department>,
    /// Generated but not yet released.
    pub pending: Vec<Order>,
    pub completed: Vec<Order>,
    pub rejected: Vec<Order>,
    pub total_orders_generated: u64,
}

impl Floor {
    pub fn new(departments: Vec<Department>) -> Self {
        Self {
            departments,
            ..Self::default()
        }
    }

    pub fn department(&self, id: DepartmentId) -> Option<&Department> {
        self.departments.iter().find(|d| d.id == id)
    }

    pub fn department_mut(&mut self, id: DepartmentId) -> Option<&mut Department> {
        self.departments.iter_mut().find(|d| d.id == id)
    }

    pub fn department_ids(&self) -> Vec<DepartmentId> {
        self.departments.iter().map(|d| d.id).collect()
    }

    pub fn pending_order(&self, id: OrderId) -> Option<&Order> {
        self.pending.iter().find(|o| o.id == id)
    }

    /// Remove an order from the pending list.
    pub fn take_pending(&mut self, id: OrderId) -> Option<Order> {
        let idx = self.pending.iter().position(|o| o.id == id)?;
        Some(self.pending.remove(idx))
    }

    /// Orders queued or in process at any department.
    pub fn wip(&self) -> usize {
        self.departments.iter().map(Department::wip).sum()
    }

    /// Every order regardless of where it sits.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.pending
            .iter()
            .chain(self.departments.iter().flat_map(|d| d.queue.iter().chain(d.in_process.iter())))
            .chain(self.completed.iter())
            .chain(self.rejected.iter())
    }

    /// Orders not yet completed or rejected.
    pub fn active_orders_mut(&mut self) -> impl Iterator<Item = &mut Order> {
        self.pending.iter_mut().chain(
            self.departments
                .iter_mut()
                .flat_map(|d| d.queue.iter_mut().chain(d.in_process.iter_mut())),
        )
    }
}

/// Check that the order count is conserved across all collections.
pub fn check_conservation(floor: &Floor) -> Result<(), ValidationError> {
    let found = floor.orders().count() as u64;
    if found != floor.total_orders_generated {
        return Err(ValidationError::ConservationBroken {
            expected: floor.total_orders_generated,
            found,
        });
    }
    Ok(())
}

/// Full structural check: tunables, conservation, uniqueness, placement.
pub fn check_floor(floor: &Floor) -> Result<(), ValidationError> {
    check_conservation(floor)?;
    let mut seen = BTreeSet::new();
    for order in floor.orders() {
        validate_order(order)?;
        if !seen.insert(order.id) {
            return Err(ValidationError::DuplicateOrder(order.id));
        }
    }
    for d in &floor.departments {
        validate_department(d)?;
        for order in d.queue.iter().chain(d.in_process.iter()) {
            validate_placement(order, d.id)?;
        }
    }
    Ok(())
}

/// The standard eight-department shop. Efficiency and equipment condition
/// are drawn from the stream so a seed reproduces the floor.
pub fn default_departments(stream: &mut Stream) -> Vec<Department> {
    let layout: [(&str, Vec<Operation>); 8] = [
        (
            "Cutting",
            vec![Operation::new(1, "Measure", 3), Operation::new(2, "Cut", 7)],
        ),
        (
            "Welding",
            vec![Operation::new(1, "Fit-up", 5), Operation::new(2, "Weld", 10)],
        ),
        (
            "Assembly",
            vec![Operation::new(1, "Assemble", 8), Operation::new(2, "Fasten", 4)],
        ),
        (
            "Quality Control",
            vec![Operation::new(1, "Inspect", 5), Operation::new(2, "Test", 3)],
        ),
        (
            "Packaging",
            vec![Operation::new(1, "Wrap", 2), Operation::new(2, "Box", 3)],
        ),
        (
            "Machining",
            vec![
                Operation::new(1, "Cut", 4),
                Operation::new(2, "Drill", 4),
                Operation::new(3, "Mill", 6),
            ],
        ),
        (
            "Painting",
            vec![Operation::new(1, "Prep", 4), Operation::new(2, "Paint", 8)],
        ),
        (
            "Finishing",
            vec![
                Operation::new(1, "Grind", 3),
                Operation::new(2, "Polish", 4),
                Operation::new(3, "Inspect", 2),
            ],
        ),
    ];

    layout
        .into_iter()
        .zip(1u32..)
        .map(|((name, ops), id)| {
            let mut d = Department::new(id, name, ops);
            d.efficiency = stream.between(0.8, 1.2);
            d.equipment_condition = stream.between(0.95, 1.0);
            d
        })
        .collect()
}
