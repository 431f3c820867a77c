use std::fmt::{Debug, Formatter};

use derive_more::{From, FromStr};
use serde::{Deserialize, Serialize};

/// State-of-charge percentage as reported by the car's battery sensor.
#[derive(Copy, Clone, From, FromStr, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Percent(pub f64);

impl Percent {
    pub const ZERO: Self = Self(0.0);

    /// Proportion of the battery still to be filled.
    #[must_use]
    pub fn missing_proportion(self) -> f64 {
        1.0 - 0.01 * self.0
    }
}

impl Debug for Percent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}
