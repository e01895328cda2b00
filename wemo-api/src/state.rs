//! Power state values reported by switches and Insight plugs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reported relay state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryState {
    Off,
    On,
    /// Insight plugs report `8` when switched on with no load drawing power
    Standby,
}

impl BinaryState {
    /// Parse a `BinaryState` value.
    ///
    /// Insight devices send `state|timestamp|...`; only the first field counts.
    pub fn parse(value: &str) -> Option<Self> {
        let first = value.split('|').next().unwrap_or_default().trim();
        match first {
            "0" => Some(Self::Off),
            "1" => Some(Self::On),
            "8" => Some(Self::Standby),
            _ => None,
        }
    }

    /// Standby counts as on: the relay is closed
    pub fn is_on(&self) -> bool {
        !matches!(self, Self::Off)
    }

    /// The state a toggle requests
    pub fn toggled(&self) -> Self {
        if self.is_on() {
            Self::Off
        } else {
            Self::On
        }
    }
}

impl fmt::Display for BinaryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::On => write!(f, "on"),
            Self::Standby => write!(f, "standby"),
        }
    }
}

/// Energy readings from an Insight plug's `GetInsightParams`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InsightParams {
    pub state: BinaryState,
    /// Unix time of the last state change
    pub last_change: u64,
    /// Seconds on since the last change
    pub on_for: u64,
    /// Seconds on today
    pub on_today: u64,
    /// Seconds on over `time_period`
    pub on_total: u64,
    pub time_period: u64,
    /// Instantaneous draw in milliwatts
    pub current_mw: f64,
    pub today_mw: f64,
    pub total_mw: f64,
    pub threshold_mw: f64,
}

impl InsightParams {
    /// Parse the `|`-separated payload.
    ///
    /// Field 6 is not a reading and is skipped; the current draw is field 7.
    pub fn parse(value: &str) -> Option<Self> {
        let fields: Vec<&str> = value.trim().split('|').map(str::trim).collect();
        if fields.len() < 8 {
            return None;
        }

        let int = |i: usize| fields.get(i).and_then(|f| f.parse::<u64>().ok()).unwrap_or(0);
        let float = |i: usize| fields.get(i).and_then(|f| f.parse::<f64>().ok()).unwrap_or(0.0);

        Some(Self {
            state: BinaryState::parse(fields[0])?,
            last_change: int(1),
            on_for: int(2),
            on_today: int(3),
            on_total: int(4),
            time_period: int(5),
            current_mw: fields[7].parse::<f64>().ok()?,
            today_mw: float(8),
            total_mw: float(9),
            threshold_mw: float(10),
        })
    }

    /// Current power draw in milliwatts
    pub fn power(&self) -> f64 {
        self.current_mw
    }
}
