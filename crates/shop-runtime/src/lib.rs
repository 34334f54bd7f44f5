#![deny(warnings)]

//! Simulation runtime: the department state machine, the tick engine, the
//! decision log with undo/redo, performance aggregation and session export.

mod commands;
mod decisions;
pub mod department;
mod engine;
mod events;
mod floor;
mod performance;
mod session_log;

pub use commands::CommandRejected;
pub use decisions::{Decision, DecisionId, DecisionKind, DecisionLog};
pub use engine::{
    step, Engine, GameSession, GameState, SessionStatus, DELIVERY_DELAY_PROBABILITY,
    EFFICIENCY_BOOST_PROBABILITY, EQUIPMENT_FAILURE_PROBABILITY, RUSH_ORDER_PROBABILITY,
    VIP_PROBABILITY,
};
pub use events::{EventRing, EVENT_LOG_CAPACITY};
pub use floor::{check_conservation, check_floor, default_departments, Floor};
pub use performance::{aggregate, Performance};
pub use session_log::SessionLog;
