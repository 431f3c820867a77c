use std::ops::{Div, Mul};

use crate::quantity::power::Kilowatts;

quantity!(KilowattHours, "kWh", 2);

impl Mul<f64> for KilowattHours {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<Kilowatts> for KilowattHours {
    type Output = f64;

    /// Hours it takes to transfer the energy at the given power.
    fn div(self, rhs: Kilowatts) -> Self::Output {
        self.0 / rhs.0
    }
}
