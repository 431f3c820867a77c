//! The long-running controller: entity subscriptions, plan scheduling, and
//! load balancing against one Home Assistant instance.

pub mod notify;
pub mod scheduler;

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Local;
use serde_json::json;
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::mpsc,
    time::{MissedTickBehavior, interval},
};

use crate::{
    config::Config,
    core::{
        charger::{ChargerCommand, ChargerSnapshot, ChargerStatus},
        load_balance::LoadBalancer,
        platform::Platform,
    },
    prelude::*,
    quantity::{current::Amperes, power::Watts},
    service::{
        notify::Notifier,
        scheduler::{ActionKind, PlanAction, PlanScheduler},
    },
    tables::build_config_table,
};

pub struct Service {
    platform: Arc<dyn Platform>,
    config: Arc<Config>,
    notifier: Notifier,
    scheduler: PlanScheduler,
    balancer: Option<LoadBalancer>,

    /// Last observed state per subscribed entity, to synthesize old→new
    /// transitions from polling.
    last_seen: HashMap<String, Option<String>>,
}

impl Service {
    pub fn new(
        platform: Arc<dyn Platform>,
        config: Config,
    ) -> (Self, mpsc::Receiver<PlanAction>) {
        let config = Arc::new(config);
        let (actions_tx, actions_rx) = mpsc::channel(16);
        let notifier = Notifier::new(Arc::clone(&platform), Arc::clone(&config));
        let scheduler = PlanScheduler::new(
            Arc::clone(&platform),
            Arc::clone(&config),
            notifier.clone(),
            actions_tx,
        );
        let balancer = config.load_balance.as_ref().and_then(|section| {
            match section.verify_wiring(&config.charger) {
                Ok(()) => Some(
                    LoadBalancer::builder()
                        .mode(section.mode)
                        .mains(config.mains.mains)
                        .main_fuse(config.mains.main_fuse)
                        .safety_fraction(section.safety_fraction)
                        .resume_cooldown(section.resume_cooldown())
                        .build(),
                ),
                // The rest of the controller keeps running without it:
                Err(error) => {
                    error!("load balancing disabled: {error:#}");
                    None
                }
            }
        });
        let service = Self {
            platform,
            config,
            notifier,
            scheduler,
            balancer,
            last_seen: HashMap::new(),
        };
        (service, actions_rx)
    }

    /// Run until ctrl-c or SIGTERM, draining pending actions on the way out.
    pub async fn run(
        mut self,
        mut actions: mpsc::Receiver<PlanAction>,
        poll_interval: Duration,
    ) -> Result {
        println!("{}", build_config_table(&self.config));
        self.prime().await;

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll().await,
                action = actions.recv() => match action {
                    Some(action) => self.execute_action(action).await,
                    None => bail!("the action channel closed unexpectedly"),
                },
                _ = tokio::signal::ctrl_c() => break,
                _ = sigterm.recv() => break,
            }
        }

        info!("shutting down…");
        self.scheduler.cancel();
        Ok(())
    }

    /// Read all subscribed entities once, without dispatching, so the first
    /// poll only reacts to genuine transitions.
    async fn prime(&mut self) {
        for entity_id in self.watched() {
            let _ = self.transition(&entity_id).await;
        }
    }

    fn watched(&self) -> Vec<String> {
        let mut entities = vec![
            self.config.charger.status_entity.clone(),
            self.config.mains.power_usage_entity.clone(),
        ];
        entities.extend(self.config.car.ready_at_entity.clone());
        entities.extend(self.config.plan.smart_charging_entity.clone());
        entities.extend(self.config.plan.replan_entity.clone());
        entities
    }

    /// One polling pass: dispatch every observed transition. Individual
    /// failures are absorbed so the service keeps listening.
    #[instrument(skip_all)]
    async fn poll(&mut self) {
        let mut replan = false;

        let status_entity = self.config.charger.status_entity.clone();
        if let Some((old, new)) = self.transition(&status_entity).await {
            let old = old.as_deref().and_then(ChargerStatus::parse);
            let new = new.as_deref().and_then(ChargerStatus::parse);
            match new {
                Some(new) if ChargerStatus::triggers_replan(old, new) => {
                    info!(%new, "the car is ready for a charge plan");
                    replan = true;
                }
                Some(ChargerStatus::Standby) => {
                    info!("the car got disconnected, dropping the charge plan");
                    self.scheduler.cancel();
                }
                _ => {}
            }
        }

        if let Some(entity_id) = self.config.car.ready_at_entity.clone()
            && self.transition(&entity_id).await.is_some()
        {
            info!("the deadline changed");
            replan = true;
        }

        if let Some(entity_id) = self.config.plan.smart_charging_entity.clone()
            && let Some((_, new)) = self.transition(&entity_id).await
        {
            if new.as_deref() == Some("on") {
                info!("smart charging switched on");
                replan = true;
            } else {
                info!("smart charging switched off, dropping the charge plan");
                self.scheduler.cancel();
            }
        }

        if let Some(entity_id) = self.config.plan.replan_entity.clone()
            && self.transition(&entity_id).await.is_some()
        {
            info!("manual replan requested");
            replan = true;
        }

        // Coalesce multiple triggers from one pass into a single rebuild:
        if replan
            && let Err(error) = self.scheduler.reschedule().await
        {
            error!("failed to rebuild the charge plan: {error:#}");
        }

        let power_entity = self.config.mains.power_usage_entity.clone();
        if let Some((_, Some(state))) = self.transition(&power_entity).await {
            match state.parse::<f64>() {
                Ok(watts) => self.balance(Watts(watts)).await,
                Err(_) => warn!(state, "the power reading is not numeric"),
            }
        }
    }

    /// Observe one entity; [`Some`] only on a genuine change. The first
    /// observation primes the cache and an unchanged state returns early.
    async fn transition(&mut self, entity_id: &str) -> Option<(Option<String>, Option<String>)> {
        let new = match self.platform.state(entity_id).await {
            Ok(new) => new,
            Err(error) => {
                warn!("failed to read `{entity_id}`: {error:#}");
                return None;
            }
        };
        let old = self.last_seen.insert(entity_id.to_string(), new.clone())?;
        if old == new { None } else { Some((old, new)) }
    }

    /// Feed one power reading through the load balancer.
    async fn balance(&mut self, usage: Watts) {
        if self.balancer.is_none() {
            return;
        }
        if let Some(section) = &self.config.load_balance
            && let Some(toggle) = &section.toggle_entity
        {
            match self.platform.is_on(toggle).await {
                Ok(true) => {}
                Ok(false) => return,
                Err(error) => {
                    warn!("failed to read the load-balance toggle: {error:#}");
                    return;
                }
            }
        }
        let Some(snapshot) = self.charger_snapshot().await else {
            return;
        };
        let now = Local::now();
        let commands = match &mut self.balancer {
            Some(balancer) => balancer.on_power_reading(now, usage, snapshot),
            None => return,
        };
        for command in commands {
            if let Err(error) = self.execute(command).await {
                error!("failed to execute {command:?}: {error:#}");
                continue;
            }
            match command {
                ChargerCommand::Pause => {
                    self.notifier.send("Paused charging: the house is at the fuse limit.").await;
                }
                ChargerCommand::Resume => {
                    self.notifier
                        .send("Resumed charging: usage is back under the fuse limit.")
                        .await;
                }
                _ => {}
            }
        }
    }

    async fn charger_snapshot(&self) -> Option<ChargerSnapshot> {
        let charger = &self.config.charger;
        let status = match self.platform.state(&charger.status_entity).await {
            Ok(Some(state)) => ChargerStatus::parse(&state),
            Ok(None) => None,
            Err(error) => {
                warn!("failed to read the charger status: {error:#}");
                None
            }
        }?;
        let current_draw = match &charger.current_entity {
            Some(entity_id) => self
                .platform
                .numeric_state(entity_id)
                .await
                .ok()
                .flatten()
                .map_or(Amperes::ZERO, Amperes),
            None => Amperes::ZERO,
        };
        let from_sensor = match &charger.max_circuit_entity {
            Some(entity_id) => {
                self.platform.numeric_state(entity_id).await.ok().flatten().map(Amperes)
            }
            None => None,
        };
        // With no rating at all, the main fuse is the outermost safe clamp:
        let max_circuit_current = from_sensor
            .or(charger.max_circuit_current)
            .unwrap_or(self.config.mains.main_fuse);
        Some(ChargerSnapshot { status, current_draw, max_circuit_current })
    }

    /// Execute a fired plan action, re-verifying presence when configured.
    async fn execute_action(&self, action: PlanAction) {
        if let Some(guard) = &self.config.plan.presence {
            match guard.verify(self.platform.as_ref()).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(kind = ?action.kind, "presence check failed, skipping the action");
                    return;
                }
                Err(error) => {
                    warn!(kind = ?action.kind, "presence check errored, skipping: {error:#}");
                    return;
                }
            }
        }
        let command = match action.kind {
            ActionKind::BeginCharging => ChargerCommand::Start,
            ActionKind::EndCharging => ChargerCommand::Pause,
        };
        info!(kind = ?action.kind, at = %action.at, "executing the scheduled action");
        if let Err(error) = self.execute(command).await {
            error!("failed to execute {command:?}: {error:#}");
        }
    }

    /// Map a charger command onto the configured services.
    async fn execute(&self, command: ChargerCommand) -> Result {
        let services = &self.config.charger.services;
        let (service, mut payload) = match command {
            ChargerCommand::Start => (&services.start, json!({})),
            ChargerCommand::Pause => (&services.pause, json!({})),
            ChargerCommand::Resume => (&services.resume, json!({})),
            ChargerCommand::SetCurrentLimit(limit) => {
                let service = services
                    .set_current_limit
                    .as_ref()
                    .context("no `set_current_limit` service configured")?;
                (service, json!({ "current": limit.0 }))
            }
        };
        if let Some(charger_id) = &services.charger_id {
            payload["charger_id"] = json!(charger_id);
        }
        debug!(%service, "calling");
        self.platform.call(&service.domain, &service.service, payload).await
    }
}
