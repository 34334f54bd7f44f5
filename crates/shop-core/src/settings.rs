//! Session configuration: raw (on-disk) shape and validated settings.

use crate::SimTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Speed multipliers accepted by the engine.
pub const ALLOWED_SPEEDS: [u8; 4] = [1, 2, 4, 8];

/// Errors raised while parsing configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Arrival rate must be one of low, medium, high.
    #[error("unknown order arrival rate: {0}")]
    UnknownArrivalRate(String),
    /// Complexity must be one of beginner, intermediate, advanced.
    #[error("unknown complexity tier: {0}")]
    UnknownComplexity(String),
    /// Speed must be 1, 2, 4 or 8.
    #[error("speed multiplier {0} is not one of 1, 2, 4, 8")]
    InvalidSpeed(i64),
    /// Session length must be at least one minute.
    #[error("session duration must be > 0 minutes, got {0}")]
    InvalidDuration(i64),
}

/// How often new orders arrive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrivalRate {
    Low,
    Medium,
    High,
}

impl ArrivalRate {
    /// Probability that an order arrives on a single tick.
    pub fn per_tick_probability(self) -> f64 {
        match self {
            ArrivalRate::Low => 0.002,
            ArrivalRate::Medium => 0.003,
            ArrivalRate::High => 0.005,
        }
    }
}

impl FromStr for ArrivalRate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(ArrivalRate::Low),
            "medium" => Ok(ArrivalRate::Medium),
            "high" => Ok(ArrivalRate::High),
            other => Err(ConfigError::UnknownArrivalRate(other.to_string())),
        }
    }
}

/// Complexity tier; drives route length and due-date windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Beginner,
    Intermediate,
    Advanced,
}

impl Complexity {
    /// Half-open range `[min, max)` of generated route lengths.
    pub fn route_len_range(self) -> (usize, usize) {
        match self {
            Complexity::Beginner => (2, 4),
            Complexity::Intermediate => (3, 6),
            Complexity::Advanced => (4, 8),
        }
    }

    /// Due-date window in minutes after creation.
    pub fn due_window_minutes(self) -> (f64, f64) {
        match self {
            Complexity::Beginner => (60.0, 180.0),
            Complexity::Intermediate | Complexity::Advanced => (90.0, 240.0),
        }
    }
}

impl FromStr for Complexity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Complexity::Beginner),
            "intermediate" => Ok(Complexity::Intermediate),
            "advanced" => Ok(Complexity::Advanced),
            other => Err(ConfigError::UnknownComplexity(other.to_string())),
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Complexity::Beginner => "beginner",
            Complexity::Intermediate => "intermediate",
            Complexity::Advanced => "advanced",
        };
        f.write_str(s)
    }
}

/// Parse a speed multiplier.
pub fn parse_speed(v: i64) -> Result<u8, ConfigError> {
    ALLOWED_SPEEDS
        .iter()
        .copied()
        .find(|s| i64::from(*s) == v)
        .ok_or(ConfigError::InvalidSpeed(v))
}

/// Configuration as read from YAML/JSON; every field is optional.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSettings {
    pub session_minutes: Option<i64>,
    pub arrival_rate: Option<String>,
    pub complexity: Option<String>,
    pub seed: Option<String>,
    pub speed: Option<i64>,
    pub events_enabled: Option<bool>,
    pub advanced_routing: Option<bool>,
}

/// Validated, immutable session settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Session length in simulated minutes.
    pub session_minutes: u32,
    pub arrival_rate: ArrivalRate,
    pub complexity: Complexity,
    /// Seed string; `None` means a non-reproducible run.
    pub seed: Option<String>,
    /// Simulated seconds per tick.
    pub speed: u8,
    pub events_enabled: bool,
    pub advanced_routing: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session_minutes: 30,
            arrival_rate: ArrivalRate::Medium,
            complexity: Complexity::Intermediate,
            seed: None,
            speed: 1,
            events_enabled: true,
            advanced_routing: false,
        }
    }
}

impl Settings {
    /// Build settings from raw input. Invalid values fall back to the
    /// defaults with a warning instead of failing.
    pub fn from_raw(raw: &RawSettings) -> Self {
        let defaults = Settings::default();

        let session_minutes = match raw.session_minutes {
            None => defaults.session_minutes,
            Some(m) if m > 0 && m <= i64::from(u32::MAX) => m as u32,
            Some(m) => {
                warn!(error = %ConfigError::InvalidDuration(m), "using default session length");
                defaults.session_minutes
            }
        };
        let arrival_rate = parse_or_default(raw.arrival_rate.as_deref(), defaults.arrival_rate);
        let complexity = parse_or_default(raw.complexity.as_deref(), defaults.complexity);
        let speed = match raw.speed.map(parse_speed) {
            None => defaults.speed,
            Some(Ok(s)) => s,
            Some(Err(e)) => {
                warn!(error = %e, "using default speed");
                defaults.speed
            }
        };

        Self {
            session_minutes,
            arrival_rate,
            complexity,
            seed: raw.seed.clone().filter(|s| !s.trim().is_empty()),
            speed,
            events_enabled: raw.events_enabled.unwrap_or(defaults.events_enabled),
            advanced_routing: raw.advanced_routing.unwrap_or(defaults.advanced_routing),
        }
    }

    /// Configured session length as simulated time.
    pub fn session_duration(&self) -> SimTime {
        SimTime::from_minutes(u64::from(self.session_minutes))
    }
}

fn parse_or_default<T>(value: Option<&str>, default: T) -> T
where
    T: FromStr<Err = ConfigError>,
{
    match value.map(str::parse::<T>) {
        None => default,
        Some(Ok(v)) => v,
        Some(Err(e)) => {
            warn!(error = %e, "falling back to default");
            default
        }
    }
}
