//! Aggregate figures for a candidate route.

use crate::optimize::department_cost;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shop_core::{Department, DepartmentId};
use std::collections::BTreeSet;

/// Summary of a route against the current floor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteMetrics {
    /// Sum of standard processing minutes.
    pub total_time_minutes: f64,
    /// Sum of per-step cost.
    pub total_cost: Decimal,
    /// Product of per-step equipment condition.
    pub reliability: f64,
    /// +2 per step above 80% utilization, +1 per step above 60%.
    pub bottleneck_risk: u32,
    /// Distinct departments / route length.
    pub flexibility: f64,
}

/// Compute [`RouteMetrics`]. Steps naming unknown departments contribute
/// nothing except to the flexibility denominator.
pub fn calculate_route_metrics(route: &[DepartmentId], departments: &[Department]) -> RouteMetrics {
    let mut total_time_minutes = 0.0;
    let mut total_cost = Decimal::ZERO;
    let mut reliability = 1.0;
    let mut bottleneck_risk = 0;

    for id in route {
        let Some(d) = departments.iter().find(|d| d.id == *id) else {
            continue;
        };
        total_time_minutes += f64::from(d.standard_processing_minutes);
        total_cost += department_cost(d);
        reliability *= d.equipment_condition;
        if d.utilization > 80.0 {
            bottleneck_risk += 2;
        } else if d.utilization > 60.0 {
            bottleneck_risk += 1;
        }
    }

    let distinct: BTreeSet<&DepartmentId> = route.iter().collect();
    let flexibility = if route.is_empty() {
        0.0
    } else {
        distinct.len() as f64 / route.len() as f64
    };

    RouteMetrics {
        total_time_minutes,
        total_cost,
        reliability,
        bottleneck_risk,
        flexibility,
    }
}
