//! Substitution passes over a route.
//!
//! Each pass walks the route step by step and may swap a department for an
//! alternative that shares at least one operation with it. A step with no
//! improving alternative keeps its original department, so every pass is
//! idempotent on an already-optimal route.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use shop_core::{Department, DepartmentId};

/// Utilization above which the bottleneck pass looks for a detour.
pub const BOTTLENECK_TRIGGER: f64 = 80.0;
/// Alternatives must be below this utilization to absorb a detour.
pub const BOTTLENECK_RELIEF: f64 = 70.0;
/// Relative score margin the priority pass requires before switching.
pub const PRIORITY_MARGIN: f64 = 0.10;

/// Cost of a department visit: standard processing minutes × 2.5.
///
/// Cost is charged for the whole visit, so it sums every operation. The
/// speed pass instead compares the average operation time, so a department
/// with more but shorter operations can be faster without being cheaper.
pub fn department_cost(d: &Department) -> Decimal {
    Decimal::from(d.standard_processing_minutes) * Decimal::new(25, 1)
}

/// Weighted suitability for priority work:
/// `0.4·reliability + 0.4·(100 − utilization) + 0.2·(100 / cost)`.
pub fn priority_score(d: &Department) -> f64 {
    let reliability = d.equipment_condition * 100.0;
    let cost = department_cost(d).to_f64().unwrap_or(0.0);
    let cost_term = if cost > 0.0 { 100.0 / cost } else { 0.0 };
    0.4 * reliability + 0.4 * (100.0 - d.utilization) + 0.2 * cost_term
}

fn find(departments: &[Department], id: DepartmentId) -> Option<&Department> {
    departments.iter().find(|d| d.id == id)
}

fn alternatives<'a>(
    current: &'a Department,
    departments: &'a [Department],
) -> impl Iterator<Item = &'a Department> + 'a {
    departments
        .iter()
        .filter(move |d| d.id != current.id && d.shares_operation_with(current))
}

/// Apply `pick` to every step whose department is known.
fn map_steps<F>(route: &[DepartmentId], departments: &[Department], pick: F) -> Vec<DepartmentId>
where
    F: Fn(&Department) -> Option<DepartmentId>,
{
    route
        .iter()
        .map(|&id| match find(departments, id) {
            Some(current) => pick(current).unwrap_or(id),
            None => id,
        })
        .collect()
}

/// Pick the alternative minimizing `key`, if it beats the current department.
fn best_lower<F>(current: &Department, departments: &[Department], key: F) -> Option<DepartmentId>
where
    F: Fn(&Department) -> f64,
{
    let here = key(current);
    alternatives(current, departments)
        .filter(|d| key(*d) < here)
        .min_by(|a, b| key(*a).total_cmp(&key(*b)))
        .map(|d| d.id)
}

/// Substitute the fastest alternative by average operation time.
pub fn speed_pass(route: &[DepartmentId], departments: &[Department]) -> Vec<DepartmentId> {
    map_steps(route, departments, |current| {
        best_lower(current, departments, Department::average_operation_minutes)
    })
}

/// Substitute the cheapest alternative.
pub fn cost_pass(route: &[DepartmentId], departments: &[Department]) -> Vec<DepartmentId> {
    map_steps(route, departments, |current| {
        let here = department_cost(current);
        alternatives(current, departments)
            .filter(|d| department_cost(d) < here)
            .min_by_key(|d| department_cost(d))
            .map(|d| d.id)
    })
}

/// Substitute the alternative with the best equipment condition.
pub fn reliability_pass(route: &[DepartmentId], departments: &[Department]) -> Vec<DepartmentId> {
    map_steps(route, departments, |current| {
        best_lower(current, departments, |d| -d.equipment_condition)
    })
}

/// Detour around steps above 80% utilization to the least-loaded
/// alternative under 70%.
pub fn bottleneck_pass(route: &[DepartmentId], departments: &[Department]) -> Vec<DepartmentId> {
    map_steps(route, departments, |current| {
        if current.utilization <= BOTTLENECK_TRIGGER {
            return None;
        }
        alternatives(current, departments)
            .filter(|d| d.utilization < BOTTLENECK_RELIEF)
            .min_by(|a, b| a.utilization.total_cmp(&b.utilization))
            .map(|d| d.id)
    })
}

/// Switch to the highest-scoring alternative when it beats the current step
/// by more than 10%.
pub fn priority_pass(route: &[DepartmentId], departments: &[Department]) -> Vec<DepartmentId> {
    map_steps(route, departments, |current| {
        let here = priority_score(current);
        let best = alternatives(current, departments)
            .max_by(|a, b| priority_score(a).total_cmp(&priority_score(b)))?;
        if priority_score(best) > here * (1.0 + PRIORITY_MARGIN) {
            Some(best.id)
        } else {
            None
        }
    })
}
