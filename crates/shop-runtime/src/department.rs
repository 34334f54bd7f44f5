//! Per-department operation state machine.
//!
//! A department is idle (nothing in process) or processing operation `i` of
//! its current order. Each tick it pulls the head of its queue when idle,
//! burns down the remaining time of the current operation, moves to the next
//! operation, and releases the order once its last operation completes.

use shop_core::{
    Department, DepartmentStatus, Operation, OperationId, OperationProgress, Order, OrderStatus,
    SimTime, StepSpan,
};

/// Each queued or in-process order adds this much utilization.
pub const UTILIZATION_PER_ORDER: f64 = 25.0;
/// Utilization above which a department is overloaded.
pub const OVERLOADED_ABOVE: f64 = 85.0;
/// Utilization above which a department is busy.
pub const BUSY_ABOVE: f64 = 50.0;

/// Time window covered by one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickWindow {
    pub start: SimTime,
    pub end: SimTime,
}

impl TickWindow {
    pub fn millis(&self) -> u64 {
        self.end.since(self.start)
    }
}

/// What happened at one department during a tick.
#[derive(Debug, Default)]
pub struct DepartmentTick {
    /// Orders that finished their last operation here.
    pub departed: Vec<Order>,
    pub maintenance_ended: bool,
}

/// `min(100, wip × 25)`.
pub fn utilization(queue_len: usize, in_process: bool) -> f64 {
    let wip = queue_len + usize::from(in_process);
    (wip as f64 * UTILIZATION_PER_ORDER).min(100.0)
}

/// Status from load thresholds, unless the department is in maintenance.
pub fn derive_status(utilization: f64, in_maintenance: bool) -> DepartmentStatus {
    if in_maintenance {
        DepartmentStatus::Maintenance
    } else if utilization > OVERLOADED_ABOVE {
        DepartmentStatus::Overloaded
    } else if utilization > BUSY_ABOVE {
        DepartmentStatus::Busy
    } else {
        DepartmentStatus::Available
    }
}

/// Duration multiplier by route length: long routes are more complex.
pub fn complexity_factor(route_len: usize) -> f64 {
    if route_len > 5 {
        1.2
    } else if route_len < 3 {
        0.8
    } else {
        1.0
    }
}

fn scale(d: &Department, minutes: u32, route_len: usize) -> u64 {
    let ms = f64::from(minutes)
        * 60_000.0
        * d.efficiency
        * d.equipment_condition
        * complexity_factor(route_len);
    ms.round().max(0.0) as u64
}

/// Operations run at this department; a department without operations runs
/// its standard time as one implicit operation.
fn operation_at(d: &Department, index: usize) -> Option<Operation> {
    if d.operations.is_empty() {
        return (index == 0).then(|| Operation {
            id: OperationId(0),
            name: d.name.clone(),
            duration_minutes: d.standard_processing_minutes,
        });
    }
    d.operations.get(index).cloned()
}

/// Expected time at `d` for an order with the given route length, ms.
pub fn visit_millis(d: &Department, route_len: usize) -> u64 {
    if d.operations.is_empty() {
        return scale(d, d.standard_processing_minutes, route_len);
    }
    d.operations
        .iter()
        .map(|op| scale(d, op.duration_minutes, route_len))
        .sum()
}

/// Point an order at route step `step` (department `d`): reset operation
/// tracking, set its expected processing time and open a timestamp span.
pub fn assign(order: &mut Order, step: usize, d: &Department, now: SimTime) {
    order.current_step = Some(step);
    order.status = OrderStatus::Queued;
    order.current_operation = None;
    order.operation_progress.clear();
    let expected = visit_millis(d, order.route.len());
    order.processing_time_ms = Some(expected);
    order.processing_remaining_ms = Some(expected);
    order.timestamps.push(StepSpan {
        department: d.id,
        start: now,
        end: None,
    });
}

/// Begin operation `index` at full (scaled) duration.
fn begin_operation(order: &mut Order, d: &Department, index: usize, now: SimTime) -> bool {
    let Some(op) = operation_at(d, index) else {
        return false;
    };
    order.status = OrderStatus::Processing;
    order.current_operation = Some(index);
    let duration = scale(d, op.duration_minutes, order.route.len());
    order.processing_time_ms = Some(duration);
    order.processing_remaining_ms = Some(duration);
    order.operation_progress.push(OperationProgress {
        operation: op.id,
        start: now,
        end: None,
        completed: false,
    });
    true
}

/// Dequeue the head order and start its first operation, if idle.
pub fn start_next(d: &mut Department, now: SimTime) {
    if d.in_process.is_some() {
        return;
    }
    if let Some(mut order) = d.queue.pop_front() {
        begin_operation(&mut order, d, 0, now);
        d.in_process = Some(order);
    }
}

/// Recompute utilization and status.
pub fn refresh_load(d: &mut Department) {
    d.utilization = utilization(d.queue.len(), d.in_process.is_some());
    d.status = derive_status(d.utilization, d.in_maintenance());
}

/// Advance one department through one tick window.
pub fn advance(d: &mut Department, window: TickWindow) -> DepartmentTick {
    let mut out = DepartmentTick::default();

    if d.maintenance_until.is_some_and(|until| until <= window.start) {
        d.maintenance_until = None;
        out.maintenance_ended = true;
    }

    start_next(d, window.start);

    let rate = if d.in_maintenance() {
        window.millis() / 2
    } else {
        window.millis()
    };

    if let Some(mut order) = d.in_process.take() {
        let remaining = order.processing_remaining_ms.unwrap_or(0).saturating_sub(rate);
        order.processing_remaining_ms = Some(remaining);

        if remaining > 0 {
            d.in_process = Some(order);
        } else {
            if let Some(progress) = order.operation_progress.last_mut() {
                progress.end = Some(window.end);
                progress.completed = true;
            }
            let next_op = order.current_operation.map_or(0, |i| i + 1);
            if begin_operation(&mut order, d, next_op, window.end) {
                d.in_process = Some(order);
            } else {
                order.close_open_span(window.end);
                order.current_operation = None;
                d.total_processed += 1;
                out.departed.push(order);
            }
        }
    }

    start_next(d, window.end);
    refresh_load(d);
    out
}
