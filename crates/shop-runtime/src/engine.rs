//! The tick loop.
//!
//! [`step`] is a pure transition: it reads the previous [`GameState`] and the
//! stream, and returns the next state plus the events emitted during the
//! tick. [`Engine`] owns the state, the stream and the full event archive and
//! is the only thing that drives `step`.

use crate::decisions::DecisionLog;
use crate::department::{self, TickWindow};
use crate::events::EventRing;
use crate::floor::{default_departments, Floor};
use crate::performance::{aggregate, Performance};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shop_core::{
    CustomerTier, Department, DepartmentId, EventId, EventKind, GameEvent, Order, OrderId,
    OrderStatus, Priority, Settings, Severity, SimTime, SlaStatus, Stream,
};
use shop_routing::{generate_optimized_route, generate_route, RouteOptions};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-tick probability of an equipment failure.
pub const EQUIPMENT_FAILURE_PROBABILITY: f64 = 0.001;
/// Per-tick probability of a rush order.
pub const RUSH_ORDER_PROBABILITY: f64 = 0.0005;
/// Per-tick probability of a delivery delay.
pub const DELIVERY_DELAY_PROBABILITY: f64 = 0.0002;
/// Per-tick probability of an efficiency boost.
pub const EFFICIENCY_BOOST_PROBABILITY: f64 = 0.0003;
/// Probability that a generated order belongs to a VIP customer.
pub const VIP_PROBABILITY: f64 = 0.15;

const MAINTENANCE_MS: u64 = 10 * 60_000;
const DELAY_MS: u64 = 5 * 60_000;
const RUSH_DUE_MINUTES: (f64, f64) = (30.0, 60.0);

/// Session lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Setup,
    Running,
    Paused,
    Completed,
}

/// Session header: lifecycle, clock and the settings it was created with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: String,
    pub status: SessionStatus,
    pub duration: SimTime,
    pub elapsed: SimTime,
    /// Current speed multiplier; starts at `settings.speed`.
    pub speed: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub settings: Settings,
}

/// Everything the engine knows about a session.
#[derive(Clone, Debug)]
pub struct GameState {
    pub session: GameSession,
    /// Current floor version; shared with the decision log.
    pub floor: Arc<Floor>,
    pub events: EventRing,
    pub performance: Performance,
    pub decisions: DecisionLog,
    pub(crate) next_order_id: u64,
    pub(crate) next_event_id: u64,
}

impl GameState {
    /// Fresh state in `Setup`. With no explicit layout the default
    /// eight-department floor is drawn from the stream.
    pub fn new(settings: Settings, stream: &mut Stream, layout: Option<Vec<Department>>) -> Self {
        let id = format!("session-{:06}", stream.state());
        let departments = match layout {
            Some(departments) => departments,
            None => default_departments(stream),
        };
        let floor = Floor::new(departments);
        let performance = aggregate(&floor, SimTime::ZERO);
        Self {
            session: GameSession {
                id,
                status: SessionStatus::Setup,
                duration: settings.session_duration(),
                elapsed: SimTime::ZERO,
                speed: settings.speed,
                started_at: None,
                settings,
            },
            floor: Arc::new(floor),
            events: EventRing::default(),
            performance,
            decisions: DecisionLog::default(),
            next_order_id: 0,
            next_event_id: 0,
        }
    }

    pub fn departments(&self) -> &[Department] {
        &self.floor.departments
    }

    pub fn pending(&self) -> &[Order] {
        &self.floor.pending
    }

    pub fn completed(&self) -> &[Order] {
        &self.floor.completed
    }

    pub fn rejected(&self) -> &[Order] {
        &self.floor.rejected
    }

    pub fn pending_order_ids(&self) -> Vec<OrderId> {
        self.floor.pending.iter().map(|o| o.id).collect()
    }

    pub fn total_orders_generated(&self) -> u64 {
        self.floor.total_orders_generated
    }

    pub fn is_running(&self) -> bool {
        self.session.status == SessionStatus::Running
    }

    pub fn is_completed(&self) -> bool {
        self.session.status == SessionStatus::Completed
    }
}

/// Collects the events of one tick and hands out their ids.
struct EventSink {
    next_id: u64,
    events: Vec<GameEvent>,
}

impl EventSink {
    fn new(next_id: u64) -> Self {
        Self {
            next_id,
            events: Vec::new(),
        }
    }

    fn emit(
        &mut self,
        at: SimTime,
        kind: EventKind,
        severity: Severity,
        message: String,
    ) -> &mut GameEvent {
        self.next_id += 1;
        self.events.push(GameEvent {
            id: EventId(self.next_id),
            kind,
            at,
            message,
            severity,
            department: None,
            order: None,
            kpi: None,
        });
        let last = self.events.len() - 1;
        &mut self.events[last]
    }
}

/// Advance `prev` by `dt_ms` simulated milliseconds.
///
/// Returns `prev` unchanged unless the session is running. A running session
/// whose clock has reached its duration completes instead of advancing.
pub fn step(prev: &GameState, stream: &mut Stream, dt_ms: u64) -> (GameState, Vec<GameEvent>) {
    let mut next = prev.clone();
    if next.session.status != SessionStatus::Running {
        return (next, Vec::new());
    }
    let mut sink = EventSink::new(next.next_event_id);
    let start = next.session.elapsed;

    if start >= next.session.duration {
        next.session.status = SessionStatus::Completed;
        info!(session = %next.session.id, elapsed_ms = start.as_millis(), "session completed");
        sink.emit(
            start,
            EventKind::SessionCompleted,
            Severity::Success,
            format!(
                "Session complete: {} orders finished",
                next.performance.completed()
            ),
        )
        .kpi = Some(next.performance.kpi());
        return finish(next, sink);
    }

    let now = start.plus_millis(dt_ms);
    next.session.elapsed = now;
    let window = TickWindow { start, end: now };
    let settings = next.session.settings.clone();
    let floor = Arc::make_mut(&mut next.floor);

    release_scheduled(floor, start, &mut sink);
    if stream.chance(settings.arrival_rate.per_tick_probability()) {
        let order = synthesize_order(floor, stream, &settings, &mut next.next_order_id, now, false);
        debug!(order = %order.id, steps = order.route.len(), "order generated");
        let event = sink.emit(
            now,
            EventKind::OrderGenerated,
            Severity::Info,
            format!("New order {} with {} steps", order.id, order.route.len()),
        );
        event.order = Some(order.id);
        floor.pending.push(order);
        floor.total_orders_generated += 1;
    }
    for order in floor.active_orders_mut() {
        order.sla = order.classify_sla(now);
    }
    run_departments(floor, window, &mut sink);
    if settings.events_enabled {
        random_events(floor, stream, &settings, &mut next.next_order_id, now, &mut sink);
    }

    next.performance = aggregate(&next.floor, now);
    let kpi = next.performance.kpi();
    for event in sink
        .events
        .iter_mut()
        .filter(|e| e.kind == EventKind::OrderCompleted)
    {
        event.kpi = Some(kpi.clone());
    }
    finish(next, sink)
}

fn finish(mut next: GameState, sink: EventSink) -> (GameState, Vec<GameEvent>) {
    next.next_event_id = sink.next_id;
    next.events.extend(sink.events.iter().cloned());
    (next, sink.events)
}

/// Put a pending order into the queue of the department at route `step`.
/// Hands the order back if the step or department does not exist.
pub(crate) fn release_into(
    floor: &mut Floor,
    mut order: Order,
    step: usize,
    at: SimTime,
) -> Result<(), Order> {
    let Some(&target) = order.route.get(step) else {
        return Err(order);
    };
    let Some(d) = floor.department_mut(target) else {
        return Err(order);
    };
    order.scheduled_release = None;
    department::assign(&mut order, step, d, at);
    d.queue.push_back(order);
    department::refresh_load(d);
    Ok(())
}

fn release_scheduled(floor: &mut Floor, at: SimTime, sink: &mut EventSink) {
    let due: Vec<OrderId> = floor
        .pending
        .iter()
        .filter(|o| o.scheduled_release.as_ref().is_some_and(|s| s.at <= at))
        .map(|o| o.id)
        .collect();
    for id in due {
        let Some(mut order) = floor.take_pending(id) else {
            continue;
        };
        let Some(plan) = order.scheduled_release.take() else {
            floor.pending.push(order);
            continue;
        };
        match release_into(floor, order, plan.step, at) {
            Ok(()) => {
                let event = sink.emit(
                    at,
                    EventKind::OrderReleased,
                    Severity::Info,
                    format!("Scheduled order {id} released to {}", plan.department),
                );
                event.order = Some(id);
                event.department = Some(plan.department);
            }
            Err(order) => floor.pending.push(order),
        }
    }
}

fn draw_priority(stream: &mut Stream) -> Priority {
    let v = stream.next_f64();
    if v < 0.1 {
        Priority::Urgent
    } else if v < 0.3 {
        Priority::High
    } else if v < 0.85 {
        Priority::Normal
    } else {
        Priority::Low
    }
}

/// Draw a new order. Stream draws happen in a fixed order: priority, customer,
/// route, due date.
fn synthesize_order(
    floor: &Floor,
    stream: &mut Stream,
    settings: &Settings,
    next_order_id: &mut u64,
    now: SimTime,
    rush: bool,
) -> Order {
    let priority = if rush {
        Priority::Urgent
    } else {
        draw_priority(stream)
    };
    let customer = if stream.chance(VIP_PROBABILITY) {
        CustomerTier::Vip
    } else {
        CustomerTier::Standard
    };
    let route = if settings.advanced_routing {
        let mut options = RouteOptions::new(settings.complexity);
        options.optimize_speed = priority >= Priority::High;
        options.optimize_cost = priority == Priority::Low;
        options.optimize_reliability = customer == CustomerTier::Vip;
        options.avoid_bottlenecks = true;
        options.priority = priority;
        options.customer = customer;
        generate_optimized_route(stream, &floor.departments, &options)
    } else {
        generate_route(stream, &floor.department_ids(), settings.complexity)
    };
    let (lo, hi) = if rush {
        RUSH_DUE_MINUTES
    } else {
        settings.complexity.due_window_minutes()
    };
    let due_minutes = stream.between(lo, hi);
    let due_at = now.plus_millis((due_minutes * 60_000.0).round() as u64);

    *next_order_id += 1;
    Order::new(OrderId(*next_order_id), route, now, due_at, priority, customer)
}

fn run_departments(floor: &mut Floor, window: TickWindow, sink: &mut EventSink) {
    let mut departed = Vec::new();
    for d in floor.departments.iter_mut() {
        let tick = department::advance(d, window);
        if tick.maintenance_ended {
            let event = sink.emit(
                window.start,
                EventKind::EquipmentRestored,
                Severity::Info,
                format!("{} is back at full rate", d.name),
            );
            event.department = Some(d.id);
        }
        departed.extend(tick.departed);
    }

    for order in departed {
        route_onward(floor, order, window.end, sink);
    }

    for d in floor.departments.iter_mut() {
        department::start_next(d, window.end);
        department::refresh_load(d);
    }
}

/// Hand a departed order to its next department, or finish it.
fn route_onward(floor: &mut Floor, mut order: Order, now: SimTime, sink: &mut EventSink) {
    let next_step = order.current_step.map_or(0, |s| s + 1);
    let Some(&next_id) = order.route.get(next_step) else {
        complete(floor, order, now, sink);
        return;
    };
    if let Some(d) = floor.department_mut(next_id) {
        department::assign(&mut order, next_step, d, now);
        d.queue.push_back(order);
        return;
    }

    order.status = OrderStatus::Error;
    debug!(order = %order.id, department = %next_id, "order rejected");
    let event = sink.emit(
        now,
        EventKind::OrderRejected,
        Severity::Error,
        format!("Order {} routed to unknown department {next_id}", order.id),
    );
    event.order = Some(order.id);
    event.department = Some(next_id);
    floor.rejected.push(order);
}

fn complete(floor: &mut Floor, mut order: Order, now: SimTime, sink: &mut EventSink) {
    order.sla = order.classify_sla(now);
    let on_time = order.sla != SlaStatus::Overdue;
    order.status = if on_time {
        OrderStatus::CompletedOnTime
    } else {
        OrderStatus::CompletedLate
    };
    order.completed_at = Some(now);
    let lead = SimTime(now.since(order.created_at)).as_minutes_f64();
    order.actual_lead_time_minutes = Some(lead);
    order.processing_remaining_ms = Some(0);
    debug!(order = %order.id, lead_minutes = lead, on_time, "order completed");

    let (severity, verdict) = if on_time {
        (Severity::Success, "on time")
    } else {
        (Severity::Warning, "late")
    };
    let event = sink.emit(
        now,
        EventKind::OrderCompleted,
        severity,
        format!("Order {} completed {verdict} in {lead:.1} min", order.id),
    );
    event.order = Some(order.id);
    floor.completed.push(order);
}

/// Draw all four event chances up front, then apply the effects that hit.
fn random_events(
    floor: &mut Floor,
    stream: &mut Stream,
    settings: &Settings,
    next_order_id: &mut u64,
    now: SimTime,
    sink: &mut EventSink,
) {
    let failure = stream.chance(EQUIPMENT_FAILURE_PROBABILITY);
    let rush = stream.chance(RUSH_ORDER_PROBABILITY);
    let delay = stream.chance(DELIVERY_DELAY_PROBABILITY);
    let boost = stream.chance(EFFICIENCY_BOOST_PROBABILITY);

    if failure {
        fail_equipment(floor, stream, now, sink);
    }
    if rush {
        rush_order(floor, stream, settings, next_order_id, now, sink);
    }
    if delay {
        delay_delivery(floor, stream, now, sink);
    }
    if boost {
        boost_efficiency(floor, stream, now, sink);
    }
}

/// Send a random department that is not already down into maintenance.
fn fail_equipment(floor: &mut Floor, stream: &mut Stream, now: SimTime, sink: &mut EventSink) {
    let candidates: Vec<DepartmentId> = floor
        .departments
        .iter()
        .filter(|d| !d.in_maintenance())
        .map(|d| d.id)
        .collect();
    let Some(&id) = stream.choose(&candidates) else {
        return;
    };
    let Some(d) = floor.department_mut(id) else {
        return;
    };
    d.maintenance_until = Some(now.plus_millis(MAINTENANCE_MS));
    department::refresh_load(d);
    debug!(department = %id, "equipment failure");
    let event = sink.emit(
        now,
        EventKind::EquipmentFailure,
        Severity::Warning,
        format!("Equipment failure in {}: running at half rate", d.name),
    );
    event.department = Some(id);
}

fn rush_order(
    floor: &mut Floor,
    stream: &mut Stream,
    settings: &Settings,
    next_order_id: &mut u64,
    now: SimTime,
    sink: &mut EventSink,
) {
    let order = synthesize_order(floor, stream, settings, next_order_id, now, true);
    debug!(order = %order.id, "rush order");
    let event = sink.emit(
        now,
        EventKind::RushOrder,
        Severity::Warning,
        format!(
            "Rush order {} due in {:.0} min",
            order.id,
            SimTime(order.due_at.since(now)).as_minutes_f64()
        ),
    );
    event.order = Some(order.id);
    floor.pending.push(order);
    floor.total_orders_generated += 1;
}

/// Add five minutes to a random in-process order.
fn delay_delivery(floor: &mut Floor, stream: &mut Stream, now: SimTime, sink: &mut EventSink) {
    let Some((department, name, order)) = pick_in_process(floor, stream) else {
        return;
    };
    order.processing_remaining_ms = order.processing_remaining_ms.map(|ms| ms + DELAY_MS);
    order.processing_time_ms = order.processing_time_ms.map(|ms| ms + DELAY_MS);
    let id = order.id;
    let message = format!("Material delivery delayed at {name}: +5 min on {id}");
    let event = sink.emit(now, EventKind::DeliveryDelay, Severity::Warning, message);
    event.department = Some(department);
    event.order = Some(id);
}

/// Cut a random in-process order's remaining time by a fifth.
fn boost_efficiency(floor: &mut Floor, stream: &mut Stream, now: SimTime, sink: &mut EventSink) {
    let Some((department, name, order)) = pick_in_process(floor, stream) else {
        return;
    };
    order.processing_remaining_ms = order.processing_remaining_ms.map(|ms| ms * 4 / 5);
    let id = order.id;
    let message = format!("Efficiency boost at {name}: {id} runs 20% faster");
    let event = sink.emit(now, EventKind::EfficiencyBoost, Severity::Success, message);
    event.department = Some(department);
    event.order = Some(id);
}

/// A random busy department (id and name) and its in-process order.
fn pick_in_process<'a>(
    floor: &'a mut Floor,
    stream: &mut Stream,
) -> Option<(DepartmentId, String, &'a mut Order)> {
    let busy: Vec<DepartmentId> = floor
        .departments
        .iter()
        .filter(|d| d.in_process.is_some())
        .map(|d| d.id)
        .collect();
    let id = *stream.choose(&busy)?;
    let d = floor.department_mut(id)?;
    let name = d.name.clone();
    let order = d.in_process.as_mut()?;
    Some((id, name, order))
}

/// Owns a session: state, stream, and the archive of every event emitted.
#[derive(Clone, Debug)]
pub struct Engine {
    pub(crate) state: GameState,
    pub(crate) stream: Stream,
    pub(crate) archive: Vec<GameEvent>,
    /// Custom layout to rebuild on reset; `None` means the default floor.
    pub(crate) layout: Option<Vec<Department>>,
}

impl Engine {
    /// New engine on the default floor, seeded from `settings.seed`.
    pub fn new(settings: Settings) -> Self {
        Self::build(settings, None)
    }

    /// New engine on a caller-supplied floor.
    pub fn with_departments(settings: Settings, departments: Vec<Department>) -> Self {
        Self::build(settings, Some(departments))
    }

    fn build(settings: Settings, layout: Option<Vec<Department>>) -> Self {
        let mut stream = Stream::from_seed(settings.seed.as_deref());
        let state = GameState::new(settings, &mut stream, layout.clone());
        info!(session = %state.session.id, "session created");
        Self {
            state,
            stream,
            archive: Vec::new(),
            layout,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.state.session.settings
    }

    /// Current stream state, for replay.
    pub fn stream(&self) -> Stream {
        self.stream
    }

    /// Every event emitted this session, oldest first.
    pub fn event_archive(&self) -> &[GameEvent] {
        &self.archive
    }

    /// One nominal tick: one simulated second per speed step.
    pub fn tick(&mut self) -> &GameState {
        let dt = u64::from(self.state.session.speed) * 1_000;
        self.tick_by(dt)
    }

    /// Advance by an explicit interval, e.g. the wall-clock time since the
    /// previous tick.
    pub fn tick_by(&mut self, dt_ms: u64) -> &GameState {
        let mut stream = self.stream;
        let (next, emitted) = step(&self.state, &mut stream, dt_ms);
        self.state = next;
        self.stream = stream;
        self.archive.extend(emitted);
        &self.state
    }
}
