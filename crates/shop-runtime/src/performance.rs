//! Derived performance figures, recomputed after every tick and command.

use crate::floor::Floor;
use serde::{Deserialize, Serialize};
use shop_core::{DepartmentId, KpiSnapshot, OrderStatus, SimTime};
use std::collections::BTreeMap;

/// Performance snapshot of the floor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    /// Completed on time / all completed, in [0, 1]; 0 when nothing completed.
    pub on_time_rate: f64,
    /// Mean actual lead time of completed orders, minutes.
    pub average_lead_time_minutes: f64,
    /// Completed orders per simulated hour.
    pub throughput_per_hour: f64,
    pub completed_on_time: usize,
    pub completed_late: usize,
    pub pending: usize,
    pub wip: usize,
    pub utilization: BTreeMap<DepartmentId, f64>,
    /// Department with the highest utilization; `None` while the floor is empty.
    pub bottleneck: Option<DepartmentId>,
}

impl Performance {
    pub fn completed(&self) -> usize {
        self.completed_on_time + self.completed_late
    }

    pub fn kpi(&self) -> KpiSnapshot {
        KpiSnapshot {
            on_time_rate: self.on_time_rate,
            average_lead_time_minutes: self.average_lead_time_minutes,
            completed: self.completed(),
            wip: self.wip,
        }
    }
}

/// Aggregate a performance snapshot at simulated time `elapsed`.
pub fn aggregate(floor: &Floor, elapsed: SimTime) -> Performance {
    let completed_on_time = floor
        .completed
        .iter()
        .filter(|o| o.status == OrderStatus::CompletedOnTime)
        .count();
    let completed_late = floor
        .completed
        .iter()
        .filter(|o| o.status == OrderStatus::CompletedLate)
        .count();
    let completed = completed_on_time + completed_late;

    let on_time_rate = if completed == 0 {
        0.0
    } else {
        completed_on_time as f64 / completed as f64
    };

    let lead_times: Vec<f64> = floor
        .completed
        .iter()
        .filter_map(|o| o.actual_lead_time_minutes)
        .collect();
    let average_lead_time_minutes = if lead_times.is_empty() {
        0.0
    } else {
        lead_times.iter().sum::<f64>() / lead_times.len() as f64
    };

    let hours = elapsed.as_minutes_f64() / 60.0;
    let throughput_per_hour = if hours > 0.0 {
        completed as f64 / hours
    } else {
        0.0
    };

    let utilization: BTreeMap<DepartmentId, f64> = floor
        .departments
        .iter()
        .map(|d| (d.id, d.utilization))
        .collect();

    // First department wins ties.
    let bottleneck = floor
        .departments
        .iter()
        .filter(|d| d.utilization > 0.0)
        .fold(None, |best: Option<(DepartmentId, f64)>, d| match best {
            Some((_, u)) if u >= d.utilization => best,
            _ => Some((d.id, d.utilization)),
        })
        .map(|(id, _)| id);

    Performance {
        on_time_rate,
        average_lead_time_minutes,
        throughput_per_hour,
        completed_on_time,
        completed_late,
        pending: floor.pending.len(),
        wip: floor.wip(),
        utilization,
        bottleneck,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shop_core::{CustomerTier, Department, Operation, Order, OrderId, Priority};

    fn finished(id: u64, status: OrderStatus, lead: f64) -> Order {
        let mut o = Order::new(
            OrderId(id),
            vec![DepartmentId(1)],
            SimTime::ZERO,
            SimTime::from_minutes(100),
            Priority::Normal,
            CustomerTier::Standard,
        );
        o.status = status;
        o.actual_lead_time_minutes = Some(lead);
        o
    }

    #[test]
    fn rates_and_lead_time() {
        let mut floor = Floor::new(Vec::new());
        floor.completed.push(finished(1, OrderStatus::CompletedOnTime, 30.0));
        floor.completed.push(finished(2, OrderStatus::CompletedOnTime, 50.0));
        floor.completed.push(finished(3, OrderStatus::CompletedLate, 130.0));
        floor.completed.push(finished(4, OrderStatus::CompletedOnTime, 70.0));

        let p = aggregate(&floor, SimTime::from_minutes(120));
        assert_eq!(p.completed(), 4);
        assert!((p.on_time_rate - 0.75).abs() < 1e-12);
        assert!((p.average_lead_time_minutes - 70.0).abs() < 1e-12);
        assert!((p.throughput_per_hour - 2.0).abs() < 1e-12);
        assert_eq!(p.kpi().completed, 4);
    }

    #[test]
    fn empty_floor_has_no_bottleneck() {
        let p = aggregate(&Floor::new(Vec::new()), SimTime::ZERO);
        assert_eq!(p.on_time_rate, 0.0);
        assert_eq!(p.throughput_per_hour, 0.0);
        assert_eq!(p.bottleneck, None);
    }

    #[test]
    fn bottleneck_is_max_utilization_first_on_ties() {
        let mut depts: Vec<Department> = (1..=3)
            .map(|i| Department::new(i, "Cell", vec![Operation::new(1, "Work", 5)]))
            .collect();
        depts[0].utilization = 50.0;
        depts[1].utilization = 75.0;
        depts[2].utilization = 75.0;
        let p = aggregate(&Floor::new(depts), SimTime::from_minutes(1));
        assert_eq!(p.bottleneck, Some(DepartmentId(2)));
        assert_eq!(p.utilization.get(&DepartmentId(1)), Some(&50.0));
    }
}
