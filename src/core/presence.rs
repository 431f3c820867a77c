//! The check that the car is actually at the charger before we touch it.

use serde::Deserialize;

use crate::{core::platform::Platform, prelude::*};

fn default_zone() -> String {
    "home".to_string()
}

/// Verifies that the tracker places the car in the charging zone and that
/// the cable is reported connected. Failing the check is a normal outcome,
/// never an error.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresenceGuard {
    /// `device_tracker` entity of the car.
    pub tracker_entity: String,

    /// `binary_sensor` reporting the cable connection.
    pub connected_entity: String,

    /// Zone name the tracker must report.
    #[serde(default = "default_zone")]
    pub zone: String,
}

impl PresenceGuard {
    #[instrument(skip_all)]
    pub async fn verify(&self, platform: &dyn Platform) -> Result<bool> {
        let location = platform.state(&self.tracker_entity).await?;
        if location.as_deref() != Some(self.zone.as_str()) {
            info!(?location, "the car is not at the charging location");
            return Ok(false);
        }
        if !platform.is_on(&self.connected_entity).await? {
            info!("the car is not connected to the charger");
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::tests::FakePlatform;

    fn guard() -> PresenceGuard {
        PresenceGuard {
            tracker_entity: "device_tracker.car".to_string(),
            connected_entity: "binary_sensor.car_charger".to_string(),
            zone: "home".to_string(),
        }
    }

    #[tokio::test]
    async fn away_car_fails_the_guard() -> Result {
        let platform = FakePlatform::default()
            .with_state("device_tracker.car", "not_home")
            .with_state("binary_sensor.car_charger", "on");
        assert!(!guard().verify(&platform).await?);
        Ok(())
    }

    #[tokio::test]
    async fn disconnected_car_fails_the_guard() -> Result {
        let platform = FakePlatform::default()
            .with_state("device_tracker.car", "home")
            .with_state("binary_sensor.car_charger", "off");
        assert!(!guard().verify(&platform).await?);
        Ok(())
    }

    #[tokio::test]
    async fn connected_car_at_home_passes() -> Result {
        let platform = FakePlatform::default()
            .with_state("device_tracker.car", "home")
            .with_state("binary_sensor.car_charger", "on");
        assert!(guard().verify(&platform).await?);
        Ok(())
    }

    #[tokio::test]
    async fn missing_tracker_fails_softly() -> Result {
        let platform = FakePlatform::default().with_state("binary_sensor.car_charger", "on");
        assert!(!guard().verify(&platform).await?);
        Ok(())
    }
}
