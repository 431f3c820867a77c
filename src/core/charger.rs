//! Charger state as reported by its status sensor, and the commands we may
//! send back.

use std::fmt::{Display, Formatter};

use crate::quantity::current::Amperes;

/// Easee-style charger mode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChargerStatus {
    /// No car connected.
    Standby,

    /// Car plugged in, charging not authorized yet.
    CarConnected,

    /// Authorized and waiting for current to be offered.
    ReadyToCharge,

    Charging,

    Paused,
}

impl ChargerStatus {
    /// Parse the raw sensor state, [`None`] for anything unrecognized.
    pub fn parse(state: &str) -> Option<Self> {
        match state.to_ascii_uppercase().as_str() {
            "STANDBY" => Some(Self::Standby),
            "CAR_CONNECTED" => Some(Self::CarConnected),
            "READY_TO_CHARGE" => Some(Self::ReadyToCharge),
            "CHARGING" => Some(Self::Charging),
            "PAUSED" => Some(Self::Paused),
            _ => None,
        }
    }

    /// The transition that calls for a fresh charge plan: the car just got
    /// connected and ready.
    pub fn triggers_replan(old: Option<Self>, new: Self) -> bool {
        matches!(old, None | Some(Self::Standby))
            && matches!(new, Self::CarConnected | Self::ReadyToCharge)
    }
}

impl Display for ChargerStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standby => write!(f, "standby"),
            Self::CarConnected => write!(f, "car connected"),
            Self::ReadyToCharge => write!(f, "ready to charge"),
            Self::Charging => write!(f, "charging"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Live readings for the charger circuit, read anew on every tick.
#[derive(Copy, Clone, Debug)]
pub struct ChargerSnapshot {
    pub status: ChargerStatus,

    /// What the charger itself is drawing right now.
    pub current_draw: Amperes,

    /// Hard limit of the charger's circuit.
    pub max_circuit_current: Amperes,
}

/// A command for the charger; the service layer maps it onto the configured
/// Home Assistant services.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChargerCommand {
    Start,
    Pause,
    Resume,
    SetCurrentLimit(Amperes),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(ChargerStatus::parse("ready_to_charge"), Some(ChargerStatus::ReadyToCharge));
        assert_eq!(ChargerStatus::parse("CHARGING"), Some(ChargerStatus::Charging));
        assert_eq!(ChargerStatus::parse("unavailable"), None);
    }

    #[test]
    fn replan_trigger_ok() {
        use ChargerStatus::{CarConnected, Charging, ReadyToCharge, Standby};

        assert!(ChargerStatus::triggers_replan(Some(Standby), ReadyToCharge));
        assert!(ChargerStatus::triggers_replan(Some(Standby), CarConnected));
        assert!(ChargerStatus::triggers_replan(None, ReadyToCharge));
        assert!(!ChargerStatus::triggers_replan(Some(CarConnected), ReadyToCharge));
        assert!(!ChargerStatus::triggers_replan(Some(Standby), Charging));
    }
}
