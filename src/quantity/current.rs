use std::ops::Mul;

quantity!(Amperes, "A", 1);

impl Amperes {
    /// Round down to whole amperes, the safe direction for a current limit.
    #[must_use]
    pub fn floor(self) -> Self {
        Self(self.0.floor())
    }

    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }
}

impl Mul<f64> for Amperes {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self(self.0 * rhs)
    }
}
