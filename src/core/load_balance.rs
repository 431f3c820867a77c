//! Reactive load balancing against the main fuse.
//!
//! Invoked on every power reading. The proportional policy never sends an
//! explicit stop: it drops the dynamic limit to 5 A and relies on the
//! charger refusing to deliver below its 6 A minimum, which is how
//! Easee-class hardware behaves.

use bon::Builder;
use chrono::{DateTime, Local, TimeDelta};
use serde::Deserialize;

use crate::{
    core::{
        charger::{ChargerCommand, ChargerSnapshot, ChargerStatus},
        mains::Mains,
    },
    prelude::*,
    quantity::{current::Amperes, power::Watts},
};

/// Current limit below which the charger effectively stops delivering.
const MIN_DELIVERABLE: Amperes = Amperes(6.0);

/// Limit applied when the headroom no longer fits even the minimum.
const FLOOR_LIMIT: Amperes = Amperes(5.0);

/// How the controller reacts when the house approaches the main fuse.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancingMode {
    /// Pause outright at the fuse limit, resume after a cooldown.
    Binary,

    /// Continuously trade the charger's dynamic current limit against the
    /// rest of the house.
    Proportional,
}

/// The controller's sole memory between power readings. Exposed read-only
/// for operator visibility, never consulted by anything else.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LoadBalanceState {
    pub last_applied_limit: Option<Amperes>,
    pub paused_by_load_balance: bool,
    pub limited_since: Option<DateTime<Local>>,
}

#[derive(Builder)]
pub struct LoadBalancer {
    mode: BalancingMode,
    mains: Mains,
    main_fuse: Amperes,

    /// Fraction of the fuse the proportional policy is allowed to fill.
    #[builder(default = 0.9)]
    safety_fraction: f64,

    /// Minimum dwell before the binary policy starts the charger again.
    #[builder(default = TimeDelta::minutes(10))]
    resume_cooldown: TimeDelta,

    #[builder(default)]
    state: LoadBalanceState,
}

impl LoadBalancer {
    pub const fn state(&self) -> LoadBalanceState {
        self.state
    }

    /// React to a new household power reading.
    ///
    /// Returns the commands to execute; an empty list means the reading
    /// requires no correction.
    #[instrument(skip_all, fields(usage = %usage))]
    pub fn on_power_reading(
        &mut self,
        now: DateTime<Local>,
        usage: Watts,
        snapshot: ChargerSnapshot,
    ) -> Vec<ChargerCommand> {
        match snapshot.status {
            ChargerStatus::Standby => return Vec::new(),
            // Paused for a reason of its own, not ours to touch:
            ChargerStatus::Paused if !self.state.paused_by_load_balance => return Vec::new(),
            _ => {}
        }
        match self.mode {
            BalancingMode::Binary => self.binary(now, usage, snapshot),
            BalancingMode::Proportional => self.proportional(now, usage, snapshot),
        }
    }

    fn binary(
        &mut self,
        now: DateTime<Local>,
        usage: Watts,
        snapshot: ChargerSnapshot,
    ) -> Vec<ChargerCommand> {
        let capacity = self.mains.fuse_capacity(self.main_fuse);
        if usage >= capacity {
            if self.state.paused_by_load_balance {
                return Vec::new();
            }
            if snapshot.status != ChargerStatus::Charging {
                debug!(%capacity, "over the limit, but the charger is not charging");
                return Vec::new();
            }
            warn!(%capacity, "over the fuse limit, pausing the charger");
            self.state.paused_by_load_balance = true;
            self.state.limited_since = Some(now);
            return vec![ChargerCommand::Pause];
        }
        if self.state.paused_by_load_balance {
            let elapsed = self.state.limited_since.map_or(self.resume_cooldown, |since| now - since);
            if elapsed < self.resume_cooldown {
                debug!(?elapsed, "below the limit, waiting out the cooldown");
                return Vec::new();
            }
            info!("usage dropped below the fuse limit, resuming the charger");
            self.state.paused_by_load_balance = false;
            self.state.limited_since = None;
            return vec![ChargerCommand::Resume];
        }
        Vec::new()
    }

    fn proportional(
        &mut self,
        now: DateTime<Local>,
        usage: Watts,
        snapshot: ChargerSnapshot,
    ) -> Vec<ChargerCommand> {
        // The charger's own draw does not count against the house:
        let house_draw = self.mains.watts_to_amps(usage) - snapshot.current_draw;
        let headroom = self.main_fuse * self.safety_fraction - house_draw;

        // Floored, never rounded up, to stay under the fuse:
        let mut target = headroom.floor().min(snapshot.max_circuit_current);
        let throttled_out = target < MIN_DELIVERABLE;
        if throttled_out {
            target = FLOOR_LIMIT;
        }

        if self.state.last_applied_limit == Some(target) {
            return Vec::new();
        }

        if throttled_out {
            info!(%target, "headroom below the deliverable minimum, parking the limit");
            self.state.paused_by_load_balance = true;
            if self.state.limited_since.is_none() {
                self.state.limited_since = Some(now);
            }
        } else {
            if self.state.paused_by_load_balance {
                info!(%target, "headroom recovered");
            }
            self.state.paused_by_load_balance = false;
            self.state.limited_since = None;
        }
        self.state.last_applied_limit = Some(target);
        vec![ChargerCommand::SetCurrentLimit(target)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::voltage::Volts;

    const MAINS: Mains = Mains { voltage: Volts(230.0), phases: 3.0 };

    fn snapshot(status: ChargerStatus, current_draw: f64) -> ChargerSnapshot {
        ChargerSnapshot {
            status,
            current_draw: Amperes(current_draw),
            max_circuit_current: Amperes(32.0),
        }
    }

    fn now() -> DateTime<Local> {
        "2026-08-04T18:00:00+02:00".parse().unwrap()
    }

    fn binary_balancer() -> LoadBalancer {
        LoadBalancer::builder()
            .mode(BalancingMode::Binary)
            .mains(MAINS)
            .main_fuse(Amperes(63.0))
            .resume_cooldown(TimeDelta::minutes(10))
            .build()
    }

    fn proportional_balancer() -> LoadBalancer {
        LoadBalancer::builder()
            .mode(BalancingMode::Proportional)
            .mains(MAINS)
            .main_fuse(Amperes(63.0))
            .build()
    }

    #[test]
    fn binary_pauses_exactly_once() {
        let mut balancer = binary_balancer();
        let over = Watts(26_000.0);

        let commands = balancer.on_power_reading(now(), over, snapshot(ChargerStatus::Charging, 16.0));
        assert_eq!(commands, vec![ChargerCommand::Pause]);
        assert!(balancer.state().paused_by_load_balance);

        // The next over-limit reading must not pause again:
        let commands = balancer.on_power_reading(now(), over, snapshot(ChargerStatus::Paused, 0.0));
        assert_eq!(commands, Vec::new());
    }

    #[test]
    fn binary_ignores_overload_when_not_charging() {
        let mut balancer = binary_balancer();
        let commands = balancer.on_power_reading(
            now(),
            Watts(26_000.0),
            snapshot(ChargerStatus::ReadyToCharge, 0.0),
        );
        assert_eq!(commands, Vec::new());
        assert!(!balancer.state().paused_by_load_balance);
    }

    #[test]
    fn binary_resumes_after_cooldown() {
        let mut balancer = binary_balancer();
        balancer.on_power_reading(now(), Watts(26_000.0), snapshot(ChargerStatus::Charging, 16.0));

        // Below the limit, but still inside the cooldown:
        let early = now() + TimeDelta::minutes(5);
        let commands =
            balancer.on_power_reading(early, Watts(20_000.0), snapshot(ChargerStatus::Paused, 0.0));
        assert_eq!(commands, Vec::new());
        assert!(balancer.state().paused_by_load_balance);

        // Cooldown elapsed, exactly one resume:
        let later = now() + TimeDelta::minutes(10);
        let commands =
            balancer.on_power_reading(later, Watts(20_000.0), snapshot(ChargerStatus::Paused, 0.0));
        assert_eq!(commands, vec![ChargerCommand::Resume]);
        assert!(!balancer.state().paused_by_load_balance);

        let commands =
            balancer.on_power_reading(later, Watts(20_000.0), snapshot(ChargerStatus::Charging, 16.0));
        assert_eq!(commands, Vec::new());
    }

    #[test]
    fn proportional_is_idempotent_on_equal_headroom() {
        let mut balancer = proportional_balancer();
        let usage = Watts(10_000.0);

        let first = balancer.on_power_reading(now(), usage, snapshot(ChargerStatus::Charging, 16.0));
        assert_eq!(first.len(), 1);

        // The same reading floors to the same limit, so no command:
        let second = balancer.on_power_reading(now(), usage, snapshot(ChargerStatus::Charging, 16.0));
        assert_eq!(second, Vec::new());
    }

    #[test]
    fn proportional_clamps_to_the_circuit_limit() {
        let mut balancer = proportional_balancer();
        // Nearly idle house: headroom far above the 32 A circuit.
        let commands =
            balancer.on_power_reading(now(), Watts(2_000.0), snapshot(ChargerStatus::Charging, 0.0));
        assert_eq!(commands, vec![ChargerCommand::SetCurrentLimit(Amperes(32.0))]);
    }

    #[test]
    fn proportional_parks_at_five_amps_under_six_amps_headroom() {
        let mut balancer = proportional_balancer();
        // House draw ≈ 52.7 A against 63 × 0.9 = 56.7 A budget: headroom ≈ 4 A.
        let usage = MAINS.amps_to_watts(Amperes(52.7));

        let commands = balancer.on_power_reading(now(), usage, snapshot(ChargerStatus::Charging, 0.0));
        assert_eq!(commands, vec![ChargerCommand::SetCurrentLimit(Amperes(5.0))]);
        assert!(balancer.state().paused_by_load_balance);
        assert!(balancer.state().limited_since.is_some());

        // No stop command is ever issued on this path:
        assert!(!commands.contains(&ChargerCommand::Pause));
    }

    #[test]
    fn proportional_recovery_clears_the_pause_flag() {
        let mut balancer = proportional_balancer();
        let parked = MAINS.amps_to_watts(Amperes(52.7));
        balancer.on_power_reading(now(), parked, snapshot(ChargerStatus::Charging, 0.0));
        assert!(balancer.state().paused_by_load_balance);

        // House backs off, headroom ≈ 16 A:
        let recovered = MAINS.amps_to_watts(Amperes(40.0));
        let commands =
            balancer.on_power_reading(now(), recovered, snapshot(ChargerStatus::Charging, 0.0));
        assert_eq!(commands, vec![ChargerCommand::SetCurrentLimit(Amperes(16.0))]);
        assert!(!balancer.state().paused_by_load_balance);
        assert_eq!(balancer.state().limited_since, None);
    }

    #[test]
    fn standby_charger_is_left_alone() {
        let mut balancer = proportional_balancer();
        let commands =
            balancer.on_power_reading(now(), Watts(2_000.0), snapshot(ChargerStatus::Standby, 0.0));
        assert_eq!(commands, Vec::new());
        assert_eq!(balancer.state(), LoadBalanceState::default());
    }
}
