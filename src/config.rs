//! Controller configuration (`corsac.toml`): entity wiring and device
//! constants. Validated once at startup; connection settings live in the
//! command-line arguments instead.

use std::{fmt::Display, fs, path::Path};

use chrono::TimeDelta;
use serde::Deserialize;

use crate::{
    core::{load_balance::BalancingMode, mains::Mains, presence::PresenceGuard},
    prelude::*,
    quantity::{current::Amperes, energy::KilowattHours, power::Kilowatts},
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub mains: MainsSection,
    pub charger: ChargerSection,
    pub car: CarSection,
    pub plan: PlanSection,
    pub load_balance: Option<LoadBalanceSection>,
    pub notify: Option<NotifySection>,
}

impl Config {
    pub fn try_load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse `{}`", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result {
        ensure!(self.mains.mains.voltage.0 > 0.0, "mains voltage must be positive");
        ensure!(self.mains.mains.phases > 0.0, "mains phase count must be positive");
        ensure!(self.mains.main_fuse.0 > 0.0, "main fuse rating must be positive");
        ensure!(self.car.battery_capacity.0 > 0.0, "battery capacity must be positive");
        ensure!(self.car.charge_power.0 > 0.0, "charge power must be positive");
        Ok(())
    }
}

// No `deny_unknown_fields` here: serde does not support it next to `flatten`.
#[derive(Debug, Deserialize)]
pub struct MainsSection {
    #[serde(flatten)]
    pub mains: Mains,

    /// Rating of the house's main fuse.
    pub main_fuse: Amperes,

    /// Sensor with the live household power draw in watts.
    pub power_usage_entity: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChargerSection {
    pub status_entity: String,

    /// Sensor with the charger's own current draw; required for
    /// proportional load balancing.
    pub current_entity: Option<String>,

    /// Sensor with the circuit's rated current…
    pub max_circuit_entity: Option<String>,

    /// …or the rating as a constant when there is no such sensor.
    pub max_circuit_current: Option<Amperes>,

    pub services: ChargerServices,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChargerServices {
    pub start: ServiceName,
    pub pause: ServiceName,
    pub resume: ServiceName,

    /// Service accepting a `current` value; required for proportional load
    /// balancing.
    pub set_current_limit: Option<ServiceName>,

    /// Some charger integrations require the device id in every payload.
    pub charger_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarSection {
    pub battery_capacity: KilowattHours,

    /// Whatever is lower: the charger's or the car's onboard rate.
    #[serde(default = "default_charge_power")]
    pub charge_power: Kilowatts,

    /// State-of-charge sensor; without it the planner assumes an empty
    /// battery.
    pub soc_entity: Option<String>,

    /// `input_datetime` with the "must be ready by" deadline.
    pub ready_at_entity: Option<String>,
}

const fn default_charge_power() -> Kilowatts {
    Kilowatts(11.0)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanSection {
    /// Nordpool-style sensor carrying `raw_today`/`raw_tomorrow`.
    pub price_entity: String,

    /// `input_boolean` gating the whole planner.
    pub smart_charging_entity: Option<String>,

    /// Any state change on this entity forces a replan, e.g. an
    /// `input_button`.
    pub replan_entity: Option<String>,

    /// Start charging unconditionally when no price data is available.
    #[serde(default)]
    pub charge_now_fallback: bool,

    /// When present, every scheduled action re-verifies the car first.
    pub presence: Option<PresenceGuard>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadBalanceSection {
    pub mode: BalancingMode,

    /// `input_boolean` gating the balancer.
    pub toggle_entity: Option<String>,

    /// Fraction of the fuse the proportional policy may fill.
    #[serde(default = "default_safety_fraction")]
    pub safety_fraction: f64,

    /// Minimum dwell before the binary policy resumes charging.
    #[serde(default = "default_resume_cooldown_secs")]
    pub resume_cooldown_secs: u64,
}

impl LoadBalanceSection {
    pub fn resume_cooldown(&self) -> TimeDelta {
        TimeDelta::seconds(i64::try_from(self.resume_cooldown_secs).unwrap_or(i64::MAX))
    }

    /// Entities the selected policy cannot run without.
    pub fn verify_wiring(&self, charger: &ChargerSection) -> Result {
        if self.mode == BalancingMode::Proportional {
            ensure!(
                charger.current_entity.is_some(),
                "proportional load balancing needs `charger.current_entity`",
            );
            ensure!(
                charger.max_circuit_entity.is_some() || charger.max_circuit_current.is_some(),
                "proportional load balancing needs the circuit rating",
            );
            ensure!(
                charger.services.set_current_limit.is_some(),
                "proportional load balancing needs `charger.services.set_current_limit`",
            );
        }
        Ok(())
    }
}

const fn default_safety_fraction() -> f64 {
    0.9
}

const fn default_resume_cooldown_secs() -> u64 {
    600
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifySection {
    /// Notification service, e.g. `notify/mobile_app_phone`.
    pub service: ServiceName,

    #[serde(default = "default_notify_title")]
    pub title: String,
}

fn default_notify_title() -> String {
    "Corsac".to_string()
}

/// A `domain/service` pair the way Home Assistant names them.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "String")]
pub struct ServiceName {
    pub domain: String,
    pub service: String,
}

impl TryFrom<String> for ServiceName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        let (domain, service) = value
            .split_once('/')
            .with_context(|| format!("`{value}` is not a `domain/service` pair"))?;
        ensure!(!domain.is_empty() && !service.is_empty(), "`{value}` is not a `domain/service` pair");
        Ok(Self { domain: domain.to_string(), service: service.to_string() })
    }
}

impl Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.domain, self.service)
    }
}
