//! Turns a charge plan into timed start/stop actions and owns their handles.

use std::sync::Arc;

use chrono::{DateTime, Local};
use itertools::Itertools;
use tokio::{sync::mpsc, task::AbortHandle};

use crate::{
    config::Config,
    core::{
        plan::{ChargePlan, Outcome, Planner, resolve_ready_at},
        platform::Platform,
        price::PriceCurve,
    },
    prelude::*,
    quantity::percent::Percent,
    service::notify::Notifier,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActionKind {
    BeginCharging,
    EndCharging,
}

/// One fired timed action, posted back into the service loop.
#[derive(Copy, Clone, Debug)]
pub struct PlanAction {
    pub kind: ActionKind,
    pub at: DateTime<Local>,
}

/// Idle → Planned → Scheduled, and back to Idle on `cancel`.
///
/// The handle set is drained before every rebuild, so overlapping plans can
/// never double-fire start or stop commands.
pub struct PlanScheduler {
    platform: Arc<dyn Platform>,
    config: Arc<Config>,
    notifier: Notifier,
    actions: mpsc::Sender<PlanAction>,
    handles: Vec<AbortHandle>,
}

impl PlanScheduler {
    pub fn new(
        platform: Arc<dyn Platform>,
        config: Arc<Config>,
        notifier: Notifier,
        actions: mpsc::Sender<PlanAction>,
    ) -> Self {
        Self { platform, config, notifier, actions, handles: Vec::new() }
    }

    /// Outstanding timed actions, for observability.
    pub fn pending_actions(&self) -> usize {
        self.handles.len()
    }

    /// Drop the previous plan and build a fresh one from the live inputs.
    #[instrument(skip_all)]
    pub async fn reschedule(&mut self) -> Result {
        self.cancel();

        if let Some(toggle) = &self.config.plan.smart_charging_entity
            && !self.platform.is_on(toggle).await?
        {
            info!("smart charging is off");
            return Ok(());
        }

        let now = Local::now();
        match self.plan(now).await? {
            Outcome::AlreadyCharged => {}
            Outcome::NoPriceData => {
                self.notifier.send("No usable price data, the charge plan was not built.").await;
                if self.config.plan.charge_now_fallback {
                    warn!("no price data, falling back to an immediate start");
                    self.schedule(now, ActionKind::BeginCharging);
                }
            }
            Outcome::Planned(plan) => self.apply(&plan).await,
        }
        Ok(())
    }

    /// Gather the planner inputs from the platform. A missing state-of-charge
    /// sensor reads as an empty battery.
    async fn plan(&self, now: DateTime<Local>) -> Result<Outcome> {
        let state_of_charge = match &self.config.car.soc_entity {
            Some(entity_id) => self
                .platform
                .numeric_state(entity_id)
                .await?
                .map_or(Percent::ZERO, Percent),
            None => Percent::ZERO,
        };

        let ready_at = match &self.config.car.ready_at_entity {
            Some(entity_id) => match self.platform.state(entity_id).await? {
                Some(raw) => {
                    let resolved = resolve_ready_at(now, &raw);
                    if resolved.is_none() {
                        warn!(raw, "could not parse the deadline, planning without one");
                    }
                    resolved
                }
                None => None,
            },
            None => None,
        };

        let curve =
            PriceCurve::from_attributes(self.platform.attributes(&self.config.plan.price_entity).await?)?;
        info!(n_slots = curve.len(), ?ready_at, ?state_of_charge, "planning…");

        Ok(Planner::builder()
            .now(now)
            .maybe_ready_at(ready_at)
            .state_of_charge(state_of_charge)
            .battery_capacity(self.config.car.battery_capacity)
            .charge_power(self.config.car.charge_power)
            .curve(&curve)
            .build()
            .plan())
    }

    async fn apply(&mut self, plan: &ChargePlan) {
        for window in &plan.windows {
            info!(start = %window.start, end = %window.end, mean_rate = %window.mean_rate, "scheduling a charge window");
            self.schedule(window.start, ActionKind::BeginCharging);
            self.schedule(window.end, ActionKind::EndCharging);
        }

        let mut message = plan
            .windows
            .iter()
            .map(|window| {
                format!(
                    "{} – {}, mean {}",
                    window.start.format("%a %H:%M"),
                    window.end.format("%H:%M"),
                    window.mean_rate,
                )
            })
            .join("\n");
        message.push_str(&format!(
            "\nEstimated cost: {} {}",
            plan.estimated_cost,
            plan.currency.as_deref().unwrap_or(""),
        ));
        if !plan.reaches_target {
            warn!(
                hours_needed = plan.hours_needed,
                hours_selected = plan.hours_selected,
                "the plan will not reach the target before the deadline"
            );
            message.push_str("\nThe battery will not reach the target before the deadline.");
        }
        info!(cost = %plan.estimated_cost, "built the charge plan");
        self.notifier.send(&message).await;
    }

    /// Arm one timer; its abort handle is the cancellation token.
    fn schedule(&mut self, at: DateTime<Local>, kind: ActionKind) {
        let delay = (at - Local::now()).to_std().unwrap_or_default();
        let actions = self.actions.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The receiver only closes on shutdown; nothing left to do then.
            let _ = actions.send(PlanAction { kind, at }).await;
        });
        self.handles.push(handle.abort_handle());
    }

    /// Cancel every outstanding timed action. Idempotent.
    pub fn cancel(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        debug!("cancelled the pending charge actions");
    }
}
