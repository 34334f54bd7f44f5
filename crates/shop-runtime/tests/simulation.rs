use chrono::DateTime;
use proptest::prelude::*;
use shop_core::{
    ArrivalRate, Complexity, CustomerTier, Department, DepartmentId, Operation, OrderId,
    OrderStatus, Priority, Settings, SimTime,
};
use shop_runtime::{check_floor, Engine, EventRing, SessionStatus};

fn t0() -> chrono::DateTime<chrono::Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// Release the oldest pending order every `every` ticks.
fn drive(engine: &mut Engine, ticks: u32, every: u32) {
    for i in 0..ticks {
        if i % every == 0 {
            if let Some(&id) = engine.state().pending_order_ids().first() {
                let _ = engine.release(id);
            }
        }
        engine.tick();
    }
}

fn ten_minute_cells() -> Vec<Department> {
    ["Cutting", "Welding", "Assembly", "Quality Control"]
        .iter()
        .zip(1u32..)
        .map(|(name, id)| Department::new(id, name, vec![Operation::new(1, "Work", 10)]))
        .collect()
}

#[test]
fn same_seed_same_run() {
    let settings = Settings {
        seed: Some("replay".into()),
        arrival_rate: ArrivalRate::High,
        advanced_routing: true,
        session_minutes: 120,
        ..Settings::default()
    };
    let run = || {
        let mut engine = Engine::new(settings.clone());
        engine.start(t0()).unwrap();
        drive(&mut engine, 7_200, 50);
        engine
    };
    let a = run();
    let b = run();

    let events_a = serde_json::to_string(a.event_archive()).unwrap();
    let events_b = serde_json::to_string(b.event_archive()).unwrap();
    assert!(!a.event_archive().is_empty());
    assert_eq!(events_a, events_b);
    assert_eq!(
        serde_json::to_string(&a.state().performance).unwrap(),
        serde_json::to_string(&b.state().performance).unwrap()
    );
    assert_eq!(a.stream(), b.stream());
}

#[test]
fn different_seeds_diverge() {
    let run = |seed: &str| {
        let mut engine = Engine::new(Settings {
            seed: Some(seed.into()),
            arrival_rate: ArrivalRate::High,
            ..Settings::default()
        });
        engine.start(t0()).unwrap();
        drive(&mut engine, 3_000, 50);
        serde_json::to_string(engine.event_archive()).unwrap()
    };
    assert_ne!(run("north"), run("south"));
}

#[test]
fn single_order_end_to_end() {
    let mut engine = Engine::with_departments(
        Settings {
            seed: Some("e2e".into()),
            session_minutes: 60,
            arrival_rate: ArrivalRate::Low,
            events_enabled: false,
            ..Settings::default()
        },
        ten_minute_cells(),
    );
    let route = vec![DepartmentId(1), DepartmentId(4), DepartmentId(3), DepartmentId(2)];
    let id = engine
        .inject_order(
            route,
            SimTime::from_minutes(90),
            Priority::Normal,
            CustomerTier::Standard,
        )
        .unwrap();
    engine.release(id).unwrap();
    engine.start(t0()).unwrap();

    for _ in 0..40 * 60 - 1 {
        engine.tick();
    }
    assert!(engine.state().completed().iter().all(|o| o.id != id));
    engine.tick();

    let state = engine.state();
    assert_eq!(state.session.elapsed, SimTime::from_minutes(40));
    let order = state.completed().iter().find(|o| o.id == id).unwrap();
    assert_eq!(order.status, OrderStatus::CompletedOnTime);
    assert_eq!(order.completed_at, Some(SimTime::from_minutes(40)));
    assert!((order.actual_lead_time_minutes.unwrap() - 40.0).abs() < 1e-9);

    let visited: Vec<DepartmentId> = order.timestamps.iter().map(|s| s.department).collect();
    assert_eq!(visited, order.route);
    assert!(order.timestamps.iter().all(|s| s.end.is_some()));
    assert_eq!(state.performance.on_time_rate, 1.0);
    let completion = engine
        .event_archive()
        .iter()
        .find(|e| e.order == Some(id) && e.kpi.is_some())
        .unwrap();
    assert_eq!(completion.kpi.as_ref().map(|k| k.completed), Some(1));
}

#[test]
fn late_order_completes_late() {
    let mut engine = Engine::with_departments(
        Settings {
            seed: Some("late".into()),
            session_minutes: 60,
            arrival_rate: ArrivalRate::Low,
            events_enabled: false,
            ..Settings::default()
        },
        ten_minute_cells(),
    );
    let id = engine
        .inject_order(
            vec![DepartmentId(1), DepartmentId(2), DepartmentId(3)],
            SimTime::from_minutes(20),
            Priority::Normal,
            CustomerTier::Standard,
        )
        .unwrap();
    engine.release(id).unwrap();
    engine.start(t0()).unwrap();
    for _ in 0..30 * 60 {
        engine.tick();
    }
    let order = engine.state().completed().iter().find(|o| o.id == id).unwrap();
    assert_eq!(order.status, OrderStatus::CompletedLate);
    assert_eq!(engine.state().performance.completed_late, 1);
}

#[test]
fn undo_release_restores_queues_mid_session() {
    let mut engine = Engine::new(Settings {
        seed: Some("undo".into()),
        arrival_rate: ArrivalRate::High,
        ..Settings::default()
    });
    engine.start(t0()).unwrap();
    for _ in 0..1_000 {
        engine.tick();
    }
    let target = engine
        .inject_order(
            vec![DepartmentId(2), DepartmentId(5)],
            SimTime::from_minutes(120),
            Priority::Normal,
            CustomerTier::Standard,
        )
        .unwrap();

    let pending_before = engine.state().pending().to_vec();
    let queues_before: Vec<_> = engine
        .state()
        .departments()
        .iter()
        .map(|d| d.queue.clone())
        .collect();

    engine.release(target).unwrap();
    assert!(engine.state().departments()[1].holds(target));
    engine.undo().unwrap();

    assert_eq!(engine.state().pending(), pending_before.as_slice());
    let queues_after: Vec<_> = engine
        .state()
        .departments()
        .iter()
        .map(|d| d.queue.clone())
        .collect();
    assert_eq!(queues_after, queues_before);
    check_floor(&engine.state().floor).unwrap();
}

#[test]
fn commands_on_unknown_things_are_noops() {
    let mut engine = Engine::new(Settings {
        seed: Some("noop".into()),
        ..Settings::default()
    });
    let before = serde_json::to_string(&*engine.state().floor).unwrap();
    assert!(engine.release(OrderId(404)).is_err());
    assert!(engine
        .schedule(OrderId(404), DepartmentId(1), SimTime::ZERO)
        .is_err());
    assert!(engine.rebalance(&[], &[], &[]).is_err());
    assert!(engine.optimize_route(OrderId(404), vec![DepartmentId(1)]).is_err());
    assert!(engine.undo().is_err());
    assert!(engine.redo().is_err());
    assert_eq!(serde_json::to_string(&*engine.state().floor).unwrap(), before);
    assert!(engine.state().decisions.is_empty());
}

#[test]
fn session_runs_to_completion_with_events() {
    let mut engine = Engine::new(Settings {
        seed: Some("full".into()),
        session_minutes: 30,
        arrival_rate: ArrivalRate::High,
        complexity: Complexity::Advanced,
        advanced_routing: true,
        speed: 4,
        ..Settings::default()
    });
    engine.start(t0()).unwrap();
    let mut guard = 0;
    while !engine.state().is_completed() && guard < 10_000 {
        if let Some(&id) = engine.state().pending_order_ids().first() {
            let _ = engine.release(id);
        }
        engine.tick();
        guard += 1;
    }
    let state = engine.state();
    assert_eq!(state.session.status, SessionStatus::Completed);
    assert_eq!(state.session.elapsed, SimTime::from_minutes(30));
    assert!(state.events.len() <= EventRing::default().capacity());
    assert_eq!(
        state.events.total_written(),
        engine.event_archive().len() as u64
    );
    check_floor(&state.floor).unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn orders_are_conserved_every_tick(seed in "[a-z]{1,8}", every in 1u32..200) {
        let mut engine = Engine::new(Settings {
            seed: Some(seed),
            arrival_rate: ArrivalRate::High,
            advanced_routing: every % 2 == 0,
            ..Settings::default()
        });
        engine.start(t0()).unwrap();
        for i in 0..2_000u32 {
            if i % every == 0 {
                if let Some(&id) = engine.state().pending_order_ids().first() {
                    let _ = engine.release(id);
                }
            }
            engine.tick();
            prop_assert!(check_floor(&engine.state().floor).is_ok());
        }
    }
}
