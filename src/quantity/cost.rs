use std::fmt::{Debug, Display, Formatter};

use derive_more::{Add, AddAssign, Sum};
use serde::{Deserialize, Serialize};

/// Money amount in the price feed's currency, hence no unit of its own.
#[derive(Add, AddAssign, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize, Sum)]
pub struct Cost(pub f64);

impl Display for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Debug for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
