use std::ops::Mul;

use crate::quantity::{cost::Cost, energy::KilowattHours};

quantity!(KilowattHourRate, "/kWh", 4);

impl Mul<KilowattHours> for KilowattHourRate {
    type Output = Cost;

    fn mul(self, rhs: KilowattHours) -> Self::Output {
        Cost(self.0 * rhs.0)
    }
}
