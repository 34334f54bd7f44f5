//! Orders, departments and events.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Identifies a department (work center) on the shop floor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepartmentId(pub u32);

impl fmt::Display for DepartmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D{}", self.0)
    }
}

/// Identifies a customer order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ORD-{:04}", self.0)
    }
}

/// Identifies an operation within its department.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u32);

/// Identifies an entry in the event log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

/// Simulated time in milliseconds since the session started.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub fn from_secs(secs: u64) -> Self {
        SimTime(secs * 1_000)
    }

    pub fn from_minutes(minutes: u64) -> Self {
        SimTime(minutes * 60_000)
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }

    pub fn as_minutes_f64(self) -> f64 {
        self.0 as f64 / 60_000.0
    }

    pub fn plus_millis(self, ms: u64) -> Self {
        SimTime(self.0.saturating_add(ms))
    }

    /// Milliseconds from `earlier` to `self`, zero if `earlier` is later.
    pub fn since(self, earlier: SimTime) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Order lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    Queued,
    Processing,
    CompletedOnTime,
    CompletedLate,
    Error,
}

/// Delivery-risk classification, recomputed every tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlaStatus {
    OnTrack,
    AtRisk,
    Overdue,
}

/// Commercial priority of an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

/// Customer class; VIP orders get priority routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerTier {
    Standard,
    Vip,
}

/// Time an order spent at one department, open until it departs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepSpan {
    pub department: DepartmentId,
    pub start: SimTime,
    pub end: Option<SimTime>,
}

/// Progress of one operation attempt in the current department.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationProgress {
    pub operation: OperationId,
    pub start: SimTime,
    pub end: Option<SimTime>,
    pub completed: bool,
}

/// A deferred release into a specific route step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledRelease {
    pub department: DepartmentId,
    pub step: usize,
    pub at: SimTime,
}

/// A customer order travelling through its route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Departments to visit, in order.
    pub route: Vec<DepartmentId>,
    /// Index into `route`; `None` until released.
    pub current_step: Option<usize>,
    pub status: OrderStatus,
    pub priority: Priority,
    pub customer: CustomerTier,
    pub created_at: SimTime,
    pub due_at: SimTime,
    pub timestamps: Vec<StepSpan>,
    /// Immediate repeats in the route (rework loops).
    pub rework_count: u32,
    pub current_operation: Option<usize>,
    pub operation_progress: Vec<OperationProgress>,
    /// Full time of the operation in progress, ms. While queued it holds the
    /// expected time of the whole visit.
    pub processing_time_ms: Option<u64>,
    /// Remaining time of the operation in progress, ms.
    pub processing_remaining_ms: Option<u64>,
    pub sla: SlaStatus,
    pub completed_at: Option<SimTime>,
    pub actual_lead_time_minutes: Option<f64>,
    pub scheduled_release: Option<ScheduledRelease>,
}

impl Order {
    /// A fresh, unreleased order.
    pub fn new(
        id: OrderId,
        route: Vec<DepartmentId>,
        created_at: SimTime,
        due_at: SimTime,
        priority: Priority,
        customer: CustomerTier,
    ) -> Self {
        let rework_count = count_repeats(&route);
        Self {
            id,
            route,
            current_step: None,
            status: OrderStatus::Queued,
            priority,
            customer,
            created_at,
            due_at,
            timestamps: Vec::new(),
            rework_count,
            current_operation: None,
            operation_progress: Vec::new(),
            processing_time_ms: None,
            processing_remaining_ms: None,
            sla: SlaStatus::OnTrack,
            completed_at: None,
            actual_lead_time_minutes: None,
            scheduled_release: None,
        }
    }

    /// Replace the route, recounting rework loops.
    pub fn set_route(&mut self, route: Vec<DepartmentId>) {
        self.rework_count = count_repeats(&route);
        self.route = route;
    }

    /// Department the order is currently assigned to.
    pub fn current_department(&self) -> Option<DepartmentId> {
        self.current_step.and_then(|i| self.route.get(i).copied())
    }

    pub fn is_completed(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::CompletedOnTime | OrderStatus::CompletedLate
        )
    }

    /// Classify delivery risk at `now`.
    ///
    /// Overdue once the due date has passed; at risk when more than 80% of
    /// the created→due window has elapsed; otherwise on track.
    pub fn classify_sla(&self, now: SimTime) -> SlaStatus {
        if self.due_at < now {
            return SlaStatus::Overdue;
        }
        let window = u128::from(self.due_at.since(self.created_at));
        let elapsed = u128::from(now.since(self.created_at));
        // progress > 0.8  <=>  elapsed * 5 > window * 4
        if elapsed * 5 > window * 4 {
            SlaStatus::AtRisk
        } else {
            SlaStatus::OnTrack
        }
    }

    /// Close the span opened at the current department.
    pub fn close_open_span(&mut self, at: SimTime) {
        if let Some(span) = self.timestamps.iter_mut().rev().find(|s| s.end.is_none()) {
            span.end = Some(at);
        }
    }
}

fn count_repeats(route: &[DepartmentId]) -> u32 {
    route.windows(2).filter(|w| w[0] == w[1]).count() as u32
}

/// One unit of work inside a department.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub name: String,
    pub duration_minutes: u32,
}

impl Operation {
    pub fn new(id: u32, name: &str, duration_minutes: u32) -> Self {
        Self {
            id: OperationId(id),
            name: name.to_string(),
            duration_minutes,
        }
    }
}

/// Derived department load state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepartmentStatus {
    Available,
    Busy,
    Overloaded,
    Maintenance,
}

/// A work center with a FIFO queue and at most one order in process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub operations: Vec<Operation>,
    pub standard_processing_minutes: u32,
    /// Duration multiplier, 0.8–1.2.
    pub efficiency: f64,
    /// Duration multiplier and reliability figure, 0.95–1.0.
    pub equipment_condition: f64,
    pub capacity: u32,
    pub queue: VecDeque<Order>,
    pub in_process: Option<Order>,
    /// Derived load, 0–100.
    pub utilization: f64,
    pub status: DepartmentStatus,
    pub total_processed: u64,
    /// Processing runs at half rate until this time.
    pub maintenance_until: Option<SimTime>,
}

impl Department {
    /// A department with neutral tunables; standard time is the sum of its
    /// operation durations.
    pub fn new(id: u32, name: &str, operations: Vec<Operation>) -> Self {
        let standard_processing_minutes = operations.iter().map(|o| o.duration_minutes).sum();
        Self {
            id: DepartmentId(id),
            name: name.to_string(),
            operations,
            standard_processing_minutes,
            efficiency: 1.0,
            equipment_condition: 1.0,
            capacity: 1,
            queue: VecDeque::new(),
            in_process: None,
            utilization: 0.0,
            status: DepartmentStatus::Available,
            total_processed: 0,
            maintenance_until: None,
        }
    }

    /// Mean operation duration in minutes (standard time when no operations).
    pub fn average_operation_minutes(&self) -> f64 {
        if self.operations.is_empty() {
            return f64::from(self.standard_processing_minutes);
        }
        let total: u32 = self.operations.iter().map(|o| o.duration_minutes).sum();
        f64::from(total) / self.operations.len() as f64
    }

    /// Orders queued or in process here.
    pub fn wip(&self) -> usize {
        self.queue.len() + usize::from(self.in_process.is_some())
    }

    pub fn is_idle(&self) -> bool {
        self.in_process.is_none()
    }

    pub fn in_maintenance(&self) -> bool {
        self.maintenance_until.is_some()
    }

    /// Whether the two departments can perform at least one common operation.
    pub fn shares_operation_with(&self, other: &Department) -> bool {
        self.operations.iter().any(|a| {
            other
                .operations
                .iter()
                .any(|b| a.name.eq_ignore_ascii_case(&b.name))
        })
    }

    /// Whether this department can serve an abstract process stage such as
    /// "cutting" or "quality", by substring match on operation or name.
    pub fn handles_stage(&self, stage: &str) -> bool {
        let stage = stage.to_ascii_lowercase();
        let matches = |name: &str| {
            let name = name.to_ascii_lowercase();
            name.contains(&stage) || stage.contains(&name)
        };
        matches(&self.name) || self.operations.iter().any(|o| matches(&o.name))
    }

    /// Whether an order sits in this department's queue or station.
    pub fn holds(&self, order: OrderId) -> bool {
        self.in_process.as_ref().is_some_and(|o| o.id == order)
            || self.queue.iter().any(|o| o.id == order)
    }
}

/// Event category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    OrderGenerated,
    OrderReleased,
    OrderCompleted,
    OrderRejected,
    EquipmentFailure,
    EquipmentRestored,
    RushOrder,
    DeliveryDelay,
    EfficiencyBoost,
    SessionCompleted,
}

/// Event severity for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Success,
}

/// Headline KPIs captured alongside an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KpiSnapshot {
    pub on_time_rate: f64,
    pub average_lead_time_minutes: f64,
    pub completed: usize,
    pub wip: usize,
}

/// An entry in the session's event log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    pub id: EventId,
    pub kind: EventKind,
    pub at: SimTime,
    pub message: String,
    pub severity: Severity,
    pub department: Option<DepartmentId>,
    pub order: Option<OrderId>,
    pub kpi: Option<KpiSnapshot>,
}
