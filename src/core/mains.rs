//! The household mains connection and its amp↔watt arithmetic.

use serde::Deserialize;

use crate::quantity::{current::Amperes, power::Watts, voltage::Volts};

/// Nominal voltage and phase count of the house connection.
///
/// Non-positive values are a configuration error, checked once at startup.
#[derive(Copy, Clone, Debug, Deserialize)]
pub struct Mains {
    pub voltage: Volts,
    pub phases: f64,
}

impl Mains {
    /// Apparent power: `amps × volts × √phases`.
    pub fn amps_to_watts(self, amps: Amperes) -> Watts {
        Watts(amps.0 * self.voltage.0 * self.phases.sqrt())
    }

    pub fn watts_to_amps(self, watts: Watts) -> Amperes {
        Amperes(watts.0 / self.voltage.0 / self.phases.sqrt())
    }

    /// Power the house may draw before the main fuse gives out.
    pub fn fuse_capacity(self, main_fuse: Amperes) -> Watts {
        self.amps_to_watts(main_fuse)
    }
}
