//! Export shape for a finished (or in-progress) session.

use crate::decisions::Decision;
use crate::engine::{Engine, SessionStatus};
use crate::performance::Performance;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use shop_core::{GameEvent, Settings, SimTime};

/// Everything an external formatter needs to write a session report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub id: String,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    /// Start stamp plus simulated elapsed time, once the session completed.
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed: SimTime,
    pub settings: Settings,
    /// Every event of the session, not only the retained tail.
    pub events: Vec<GameEvent>,
    pub performance: Performance,
    pub decisions: Vec<Decision>,
}

impl SessionLog {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Engine {
    /// Snapshot the session for export.
    pub fn session_log(&self) -> SessionLog {
        let session = &self.state.session;
        let ended_at = match session.status {
            SessionStatus::Completed => session.started_at.and_then(|start| {
                let ms = i64::try_from(session.elapsed.as_millis()).ok()?;
                start.checked_add_signed(TimeDelta::try_milliseconds(ms)?)
            }),
            _ => None,
        };
        SessionLog {
            id: session.id.clone(),
            status: session.status,
            started_at: session.started_at,
            ended_at,
            elapsed: session.elapsed,
            settings: session.settings.clone(),
            events: self.archive.clone(),
            performance: self.state.performance.clone(),
            decisions: self.state.decisions.decisions().cloned().collect(),
        }
    }
}
