//! Commands applied between ticks.
//!
//! Every command either succeeds or returns [`CommandRejected`] with the
//! state untouched. Floor-changing commands work on a copy of the current
//! floor and, on success, swap it in and log the before/after pair.

use crate::decisions::DecisionKind;
use crate::department::refresh_load;
use crate::engine::{release_into, Engine, GameState, SessionStatus};
use crate::floor::Floor;
use crate::performance::aggregate;
use chrono::{DateTime, Utc};
use shop_core::{
    CustomerTier, DepartmentId, Order, OrderId, Priority, ScheduledRelease, SimTime, Stream,
    ALLOWED_SPEEDS,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Why a command left the state unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRejected {
    /// The order is not in the pending list.
    #[error("order {0} is not pending")]
    OrderNotPending(OrderId),
    /// The order (or replacement route) has no steps.
    #[error("route for order {0} is empty")]
    EmptyRoute(OrderId),
    #[error("unknown department {0}")]
    UnknownDepartment(DepartmentId),
    /// Scheduling targets a department the order never visits.
    #[error("department {department} is not on the route of {order}")]
    NotOnRoute {
        order: OrderId,
        department: DepartmentId,
    },
    #[error("rebalance needs at least one source and one target department")]
    EmptyRebalance,
    /// None of the listed orders were queued at a source department.
    #[error("no listed order is queued at a source department")]
    NothingToRebalance,
    #[error("speed multiplier {0} is not one of 1, 2, 4, 8")]
    InvalidSpeed(u8),
    #[error("cannot {action} a {status:?} session")]
    InvalidTransition {
        action: &'static str,
        status: SessionStatus,
    },
    #[error("session has completed")]
    SessionCompleted,
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
}

impl Engine {
    /// Setup → running (stamping the start time) or paused → running.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), CommandRejected> {
        match self.state.session.status {
            SessionStatus::Setup => {
                self.state.session.status = SessionStatus::Running;
                self.state.session.started_at = Some(now);
                info!(session = %self.state.session.id, "session started");
                Ok(())
            }
            SessionStatus::Paused => {
                self.state.session.status = SessionStatus::Running;
                info!(session = %self.state.session.id, "session resumed");
                self.mark(DecisionKind::Resume, "Resumed session".to_string());
                Ok(())
            }
            status => Err(self.reject(CommandRejected::InvalidTransition {
                action: "start",
                status,
            })),
        }
    }

    /// Running → paused.
    pub fn pause(&mut self) -> Result<(), CommandRejected> {
        let status = self.state.session.status;
        if status != SessionStatus::Running {
            return Err(self.reject(CommandRejected::InvalidTransition {
                action: "pause",
                status,
            }));
        }
        self.state.session.status = SessionStatus::Paused;
        info!(session = %self.state.session.id, "session paused");
        self.mark(DecisionKind::Pause, "Paused session".to_string());
        Ok(())
    }

    /// Discard everything and start over from the configured seed.
    pub fn reset(&mut self) {
        let settings = self.state.session.settings.clone();
        let mut stream = Stream::from_seed(settings.seed.as_deref());
        self.state = GameState::new(settings, &mut stream, self.layout.clone());
        self.stream = stream;
        self.archive.clear();
        info!(session = %self.state.session.id, "session reset");
    }

    /// Add a customer order to the pending list, due `due_in` from now.
    pub fn inject_order(
        &mut self,
        route: Vec<DepartmentId>,
        due_in: SimTime,
        priority: Priority,
        customer: CustomerTier,
    ) -> Result<OrderId, CommandRejected> {
        if self.state.is_completed() {
            return Err(self.reject(CommandRejected::SessionCompleted));
        }
        let now = self.state.session.elapsed;
        self.state.next_order_id += 1;
        let id = OrderId(self.state.next_order_id);
        let due_at = now.plus_millis(due_in.as_millis());
        let floor = Arc::make_mut(&mut self.state.floor);
        floor
            .pending
            .push(Order::new(id, route, now, due_at, priority, customer));
        floor.total_orders_generated += 1;
        self.state.performance = aggregate(&self.state.floor, now);
        debug!(order = %id, "order injected");
        Ok(id)
    }

    /// Move a pending order into the queue of its first department.
    pub fn release(&mut self, id: OrderId) -> Result<(), CommandRejected> {
        self.apply(DecisionKind::OrderRelease, Some(id), |floor, now| {
            let order = floor
                .pending_order(id)
                .ok_or(CommandRejected::OrderNotPending(id))?;
            let first = *order.route.first().ok_or(CommandRejected::EmptyRoute(id))?;
            let name = department_name(floor, first)?;
            let order = floor
                .take_pending(id)
                .ok_or(CommandRejected::OrderNotPending(id))?;
            release_into(floor, order, 0, now)
                .map_err(|_| CommandRejected::UnknownDepartment(first))?;
            Ok(format!("Released {id} to {name}"))
        })
    }

    /// Release a pending order into `department` at simulated time `at`,
    /// entering its route at the first step that visits that department.
    /// A time at or before now releases immediately.
    pub fn schedule(
        &mut self,
        id: OrderId,
        department: DepartmentId,
        at: SimTime,
    ) -> Result<(), CommandRejected> {
        self.apply(DecisionKind::Schedule, Some(id), |floor, now| {
            let name = department_name(floor, department)?;
            let order = floor
                .pending
                .iter_mut()
                .find(|o| o.id == id)
                .ok_or(CommandRejected::OrderNotPending(id))?;
            let step = order
                .route
                .iter()
                .position(|d| *d == department)
                .ok_or(CommandRejected::NotOnRoute {
                    order: id,
                    department,
                })?;

            if at <= now {
                let order = floor
                    .take_pending(id)
                    .ok_or(CommandRejected::OrderNotPending(id))?;
                release_into(floor, order, step, now)
                    .map_err(|_| CommandRejected::UnknownDepartment(department))?;
                return Ok(format!("Released {id} into {name} at step {}", step + 1));
            }
            order.scheduled_release = Some(ScheduledRelease {
                department,
                step,
                at,
            });
            Ok(format!(
                "Scheduled {id} into {name} at {:.1} min",
                at.as_minutes_f64()
            ))
        })
    }

    /// Move the listed orders that are queued (not in process) at any source
    /// department to the least-loaded target, rewriting that route step.
    pub fn rebalance(
        &mut self,
        sources: &[DepartmentId],
        targets: &[DepartmentId],
        orders: &[OrderId],
    ) -> Result<(), CommandRejected> {
        let subject = match orders {
            [only] => Some(*only),
            _ => None,
        };
        self.apply(DecisionKind::Rebalance, subject, |floor, now| {
            if sources.is_empty() || targets.is_empty() {
                return Err(CommandRejected::EmptyRebalance);
            }
            if let Some(&unknown) = sources
                .iter()
                .chain(targets)
                .find(|id| floor.department(**id).is_none())
            {
                return Err(CommandRejected::UnknownDepartment(unknown));
            }

            let mut moved = 0usize;
            for &order_id in orders {
                let Some(mut order) = take_queued(floor, sources, order_id) else {
                    continue;
                };
                let target = least_loaded(floor, targets)
                    .ok_or(CommandRejected::EmptyRebalance)?;
                let step = order.current_step.unwrap_or(0);
                // The order never started at the source; drop its open span.
                if let Some(pos) = order.timestamps.iter().rposition(|s| s.end.is_none()) {
                    order.timestamps.remove(pos);
                }
                let mut route = order.route.clone();
                if let Some(slot) = route.get_mut(step) {
                    *slot = target;
                }
                order.set_route(route);
                release_into(floor, order, step, now)
                    .map_err(|_| CommandRejected::UnknownDepartment(target))?;
                moved += 1;
            }
            if moved == 0 {
                return Err(CommandRejected::NothingToRebalance);
            }
            Ok(format!(
                "Moved {moved} order(s) from {} to {}",
                list(sources),
                list(targets)
            ))
        })
    }

    /// Replace the route of a pending order. Clears any scheduled release,
    /// since its step may no longer exist.
    pub fn optimize_route(
        &mut self,
        id: OrderId,
        new_route: Vec<DepartmentId>,
    ) -> Result<(), CommandRejected> {
        self.apply(DecisionKind::RouteChange, Some(id), move |floor, _now| {
            if floor.pending_order(id).is_none() {
                return Err(CommandRejected::OrderNotPending(id));
            }
            if new_route.is_empty() {
                return Err(CommandRejected::EmptyRoute(id));
            }
            if let Some(&unknown) = new_route.iter().find(|d| floor.department(**d).is_none()) {
                return Err(CommandRejected::UnknownDepartment(unknown));
            }
            let order = floor
                .pending
                .iter_mut()
                .find(|o| o.id == id)
                .ok_or(CommandRejected::OrderNotPending(id))?;
            let old_len = order.route.len();
            order.set_route(new_route);
            order.scheduled_release = None;
            Ok(format!(
                "Rerouted {id}: {old_len} -> {} steps",
                order.route.len()
            ))
        })
    }

    /// Change the speed multiplier. Logged, but not undoable.
    pub fn set_speed(&mut self, speed: u8) -> Result<(), CommandRejected> {
        if !ALLOWED_SPEEDS.contains(&speed) {
            return Err(self.reject(CommandRejected::InvalidSpeed(speed)));
        }
        if self.state.is_completed() {
            return Err(self.reject(CommandRejected::SessionCompleted));
        }
        self.state.session.speed = speed;
        self.mark(DecisionKind::SettingsChange, format!("Speed set to {speed}x"));
        Ok(())
    }

    /// Restore the floor from before the latest undoable decision.
    pub fn undo(&mut self) -> Result<(), CommandRejected> {
        if self.state.is_completed() {
            return Err(self.reject(CommandRejected::SessionCompleted));
        }
        let floor = self
            .state
            .decisions
            .undo()
            .ok_or(CommandRejected::NothingToUndo)?;
        self.restore(floor);
        Ok(())
    }

    /// Reapply the next undone decision.
    pub fn redo(&mut self) -> Result<(), CommandRejected> {
        if self.state.is_completed() {
            return Err(self.reject(CommandRejected::SessionCompleted));
        }
        let floor = self
            .state
            .decisions
            .redo()
            .ok_or(CommandRejected::NothingToRedo)?;
        self.restore(floor);
        Ok(())
    }

    /// Forget all decisions; nothing else changes.
    pub fn clear_history(&mut self) {
        self.state.decisions.clear();
    }

    fn restore(&mut self, floor: Arc<Floor>) {
        self.state.performance = aggregate(&floor, self.state.session.elapsed);
        self.state.floor = floor;
    }

    fn reject(&self, error: CommandRejected) -> CommandRejected {
        debug!(error = %error, "command rejected");
        error
    }

    /// Log a decision that does not touch the floor.
    fn mark(&mut self, kind: DecisionKind, description: String) {
        let now = self.state.session.elapsed;
        let floor = Arc::clone(&self.state.floor);
        self.state
            .decisions
            .record(kind, now, description, None, Arc::clone(&floor), floor);
    }

    /// Run `change` against a copy of the floor; on success swap it in and
    /// log the decision.
    fn apply<F>(
        &mut self,
        kind: DecisionKind,
        order: Option<OrderId>,
        change: F,
    ) -> Result<(), CommandRejected>
    where
        F: FnOnce(&mut Floor, SimTime) -> Result<String, CommandRejected>,
    {
        if self.state.is_completed() {
            return Err(self.reject(CommandRejected::SessionCompleted));
        }
        let now = self.state.session.elapsed;
        let before = Arc::clone(&self.state.floor);
        let mut floor = Floor::clone(&before);
        let description = change(&mut floor, now).map_err(|e| self.reject(e))?;

        let after = Arc::new(floor);
        self.state.floor = Arc::clone(&after);
        self.state.performance = aggregate(&after, now);
        debug!(?kind, %description, "decision applied");
        self.state
            .decisions
            .record(kind, now, description, order, before, after);
        Ok(())
    }
}

fn department_name(floor: &Floor, id: DepartmentId) -> Result<String, CommandRejected> {
    floor
        .department(id)
        .map(|d| d.name.clone())
        .ok_or(CommandRejected::UnknownDepartment(id))
}

/// Remove an order waiting in the queue of one of `sources`.
fn take_queued(floor: &mut Floor, sources: &[DepartmentId], id: OrderId) -> Option<Order> {
    for d in floor
        .departments
        .iter_mut()
        .filter(|d| sources.contains(&d.id))
    {
        if let Some(pos) = d.queue.iter().position(|o| o.id == id) {
            let order = d.queue.remove(pos);
            refresh_load(d);
            return order;
        }
    }
    None
}

/// First target with the smallest work in progress.
fn least_loaded(floor: &Floor, targets: &[DepartmentId]) -> Option<DepartmentId> {
    targets
        .iter()
        .filter_map(|id| floor.department(*id))
        .min_by_key(|d| d.wip())
        .map(|d| d.id)
}

fn list(ids: &[DepartmentId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use shop_core::{Department, Operation, OrderStatus, Settings};

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn departments() -> Vec<Department> {
        vec![
            Department::new(1, "Cutting", vec![Operation::new(1, "Cut", 10)]),
            Department::new(2, "Welding", vec![Operation::new(1, "Weld", 10)]),
            Department::new(3, "Machining", vec![Operation::new(1, "Cut", 10)]),
        ]
    }

    fn quiet() -> Settings {
        Settings {
            seed: Some("commands".into()),
            events_enabled: false,
            ..Settings::default()
        }
    }

    fn engine_with_pending(routes: &[&[u32]]) -> Engine {
        let mut engine = Engine::with_departments(quiet(), departments());
        let floor = Arc::make_mut(&mut engine.state.floor);
        for (i, route) in routes.iter().enumerate() {
            floor.pending.push(Order::new(
                OrderId(100 + i as u64),
                route.iter().map(|&d| DepartmentId(d)).collect(),
                SimTime::ZERO,
                SimTime::from_minutes(120),
                Priority::Normal,
                CustomerTier::Standard,
            ));
            floor.total_orders_generated += 1;
        }
        engine
    }

    #[test]
    fn start_pause_resume() {
        let mut engine = engine_with_pending(&[]);
        assert!(engine.pause().is_err());
        engine.start(t0()).unwrap();
        assert_eq!(engine.state().session.started_at, Some(t0()));
        assert_eq!(
            engine.start(t0()),
            Err(CommandRejected::InvalidTransition {
                action: "start",
                status: SessionStatus::Running
            })
        );
        engine.pause().unwrap();
        engine.start(t0()).unwrap();
        assert!(engine.state().is_running());

        let kinds: Vec<DecisionKind> = engine.state().decisions.decisions().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DecisionKind::Pause, DecisionKind::Resume]);
        assert!(engine.state().decisions.decisions().all(|d| !d.can_undo));
    }

    #[test]
    fn release_enqueues_at_first_department() {
        let mut engine = engine_with_pending(&[&[2, 1]]);
        engine.release(OrderId(100)).unwrap();
        let state = engine.state();
        assert!(state.pending().is_empty());
        let welding = &state.departments()[1];
        assert_eq!(welding.queue.len(), 1);
        let order = &welding.queue[0];
        assert_eq!(order.current_step, Some(0));
        assert_eq!(order.timestamps.len(), 1);
        assert_eq!(order.timestamps[0].department, DepartmentId(2));
        assert_eq!(welding.utilization, 25.0);
        assert_eq!(state.performance.wip, 1);
    }

    #[test]
    fn release_rejections_leave_state_untouched() {
        let mut engine = engine_with_pending(&[&[]]);
        let before = Arc::clone(&engine.state().floor);
        assert_eq!(
            engine.release(OrderId(100)),
            Err(CommandRejected::EmptyRoute(OrderId(100)))
        );
        assert_eq!(
            engine.release(OrderId(7)),
            Err(CommandRejected::OrderNotPending(OrderId(7)))
        );
        assert!(Arc::ptr_eq(&before, &engine.state().floor));
        assert!(engine.state().decisions.is_empty());
    }

    #[test]
    fn undo_and_redo_release() {
        let mut engine = engine_with_pending(&[&[1, 2]]);
        let before = Floor::clone(&engine.state().floor);
        engine.release(OrderId(100)).unwrap();
        let after = Floor::clone(&engine.state().floor);

        engine.undo().unwrap();
        assert_eq!(*engine.state().floor, before);
        assert_eq!(engine.undo(), Err(CommandRejected::NothingToUndo));

        engine.redo().unwrap();
        assert_eq!(*engine.state().floor, after);
        assert_eq!(engine.redo(), Err(CommandRejected::NothingToRedo));
    }

    #[test]
    fn schedule_defers_until_due() {
        let mut engine = engine_with_pending(&[&[1, 2]]);
        engine.start(t0()).unwrap();
        assert_eq!(
            engine.schedule(OrderId(100), DepartmentId(3), SimTime::from_secs(5)),
            Err(CommandRejected::NotOnRoute {
                order: OrderId(100),
                department: DepartmentId(3)
            })
        );
        engine
            .schedule(OrderId(100), DepartmentId(2), SimTime::from_secs(5))
            .unwrap();
        for _ in 0..5 {
            engine.tick();
        }
        assert!(engine.state().pending().iter().any(|o| o.id == OrderId(100)));
        engine.tick();
        let state = engine.state();
        assert!(state.pending().iter().all(|o| o.id != OrderId(100)));
        assert!(state.departments()[1].holds(OrderId(100)));
    }

    #[test]
    fn schedule_in_the_past_releases_now() {
        let mut engine = engine_with_pending(&[&[1, 2]]);
        engine
            .schedule(OrderId(100), DepartmentId(2), SimTime::ZERO)
            .unwrap();
        let welding = &engine.state().departments()[1];
        assert_eq!(welding.queue[0].current_step, Some(1));
    }

    #[test]
    fn rebalance_moves_queued_orders_only() {
        let mut engine = engine_with_pending(&[&[1, 2], &[1, 2], &[1, 2]]);
        for id in 100..103 {
            engine.release(OrderId(id)).unwrap();
        }
        engine.start(t0()).unwrap();
        engine.tick();
        // 100 is in process at Cutting, 101 and 102 are queued.
        let cutting = &engine.state().departments()[0];
        assert_eq!(cutting.in_process.as_ref().map(|o| o.id), Some(OrderId(100)));

        engine
            .rebalance(
                &[DepartmentId(1)],
                &[DepartmentId(3)],
                &[OrderId(100), OrderId(101)],
            )
            .unwrap();
        let state = engine.state();
        let machining = &state.departments()[2];
        assert_eq!(machining.queue.len(), 1);
        let moved = &machining.queue[0];
        assert_eq!(moved.id, OrderId(101));
        assert_eq!(moved.route, vec![DepartmentId(3), DepartmentId(2)]);
        assert_eq!(moved.timestamps.len(), 1);
        assert!(state.departments()[0].holds(OrderId(100)));
        crate::floor::check_floor(&state.floor).unwrap();
    }

    #[test]
    fn rebalance_noops() {
        let mut engine = engine_with_pending(&[&[1, 2]]);
        engine.release(OrderId(100)).unwrap();
        let before = Arc::clone(&engine.state().floor);
        assert_eq!(
            engine.rebalance(&[], &[DepartmentId(2)], &[OrderId(100)]),
            Err(CommandRejected::EmptyRebalance)
        );
        assert_eq!(
            engine.rebalance(&[DepartmentId(1)], &[DepartmentId(9)], &[OrderId(100)]),
            Err(CommandRejected::UnknownDepartment(DepartmentId(9)))
        );
        assert_eq!(
            engine.rebalance(&[DepartmentId(2)], &[DepartmentId(3)], &[OrderId(100)]),
            Err(CommandRejected::NothingToRebalance)
        );
        assert!(Arc::ptr_eq(&before, &engine.state().floor));
    }

    #[test]
    fn optimize_route_replaces_pending_route() {
        let mut engine = engine_with_pending(&[&[1, 2]]);
        assert_eq!(
            engine.optimize_route(OrderId(100), Vec::new()),
            Err(CommandRejected::EmptyRoute(OrderId(100)))
        );
        assert_eq!(
            engine.optimize_route(OrderId(100), vec![DepartmentId(4)]),
            Err(CommandRejected::UnknownDepartment(DepartmentId(4)))
        );
        engine
            .optimize_route(
                OrderId(100),
                vec![DepartmentId(3), DepartmentId(3), DepartmentId(2)],
            )
            .unwrap();
        let order = &engine.state().pending()[0];
        assert_eq!(order.route.len(), 3);
        assert_eq!(order.rework_count, 1);
        assert_eq!(order.status, OrderStatus::Queued);
    }

    #[test]
    fn speed_changes_are_logged_but_not_undoable() {
        let mut engine = engine_with_pending(&[]);
        assert_eq!(engine.set_speed(3), Err(CommandRejected::InvalidSpeed(3)));
        engine.set_speed(8).unwrap();
        assert_eq!(engine.state().session.speed, 8);
        assert!(!engine.state().decisions.can_undo());
        assert_eq!(engine.undo(), Err(CommandRejected::NothingToUndo));
    }

    #[test]
    fn clear_history_keeps_floor() {
        let mut engine = engine_with_pending(&[&[1]]);
        engine.release(OrderId(100)).unwrap();
        let floor = Arc::clone(&engine.state().floor);
        engine.clear_history();
        assert!(engine.state().decisions.is_empty());
        assert!(Arc::ptr_eq(&floor, &engine.state().floor));
    }

    #[test]
    fn injected_orders_are_pending_and_counted() {
        let mut engine = engine_with_pending(&[]);
        let id = engine
            .inject_order(
                vec![DepartmentId(1)],
                SimTime::from_minutes(30),
                Priority::High,
                CustomerTier::Vip,
            )
            .unwrap();
        let state = engine.state();
        assert_eq!(state.pending_order_ids(), vec![id]);
        assert_eq!(state.pending()[0].due_at, SimTime::from_minutes(30));
        assert_eq!(state.total_orders_generated(), 1);
        crate::floor::check_floor(&state.floor).unwrap();
    }

    #[test]
    fn reset_reproduces_initial_state() {
        let mut engine = Engine::new(quiet());
        let initial = Floor::clone(&engine.state().floor);
        let stream = engine.stream();
        engine.start(t0()).unwrap();
        for _ in 0..500 {
            engine.tick();
        }
        engine.reset();
        assert_eq!(*engine.state().floor, initial);
        assert_eq!(engine.stream(), stream);
        assert_eq!(engine.state().session.status, SessionStatus::Setup);
        assert!(engine.event_archive().is_empty());
    }

    #[test]
    fn pause_after_undo_keeps_redo() {
        let mut engine = engine_with_pending(&[&[1, 2]]);
        engine.start(t0()).unwrap();
        engine.release(OrderId(100)).unwrap();
        let released = Floor::clone(&engine.state().floor);
        engine.undo().unwrap();

        engine.pause().unwrap();
        engine.redo().unwrap();
        assert_eq!(*engine.state().floor, released);

        let kinds: Vec<DecisionKind> = engine.state().decisions.decisions().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DecisionKind::OrderRelease, DecisionKind::Pause]);
    }

    #[test]
    fn history_is_frozen_once_completed() {
        let mut engine = engine_with_pending(&[&[1, 2]]);
        engine.state.session.duration = SimTime::from_minutes(1);
        engine.start(t0()).unwrap();
        engine.release(OrderId(100)).unwrap();
        for _ in 0..61 {
            engine.tick();
        }
        assert!(engine.state().is_completed());

        let floor = Arc::clone(&engine.state().floor);
        let wip = engine.state().performance.wip;
        assert_eq!(engine.undo(), Err(CommandRejected::SessionCompleted));
        assert_eq!(engine.redo(), Err(CommandRejected::SessionCompleted));
        assert!(Arc::ptr_eq(&floor, &engine.state().floor));
        assert_eq!(engine.state().performance.wip, wip);
        assert_eq!(wip, 1);
    }
}
