use std::{fs, path::PathBuf};

use chrono::Local;
use clap::Parser;

use crate::{
    cli::{ConfigArgs, OptionalConnectionArgs},
    core::{
        plan::{Outcome, Planner, resolve_ready_at},
        platform::Platform,
        price::PriceCurve,
    },
    prelude::*,
    quantity::percent::Percent,
    tables::build_plan_table,
};

/// The replay/preview helper: builds the plan the service would build, prints
/// it, and never touches the charger.
#[derive(Parser)]
pub struct ScoutArgs {
    #[clap(flatten)]
    home_assistant: OptionalConnectionArgs,

    #[clap(flatten)]
    config: ConfigArgs,

    /// Replay a saved price-sensor attribute payload instead of fetching it.
    #[clap(long = "attributes-file")]
    attributes_file: Option<PathBuf>,

    /// Override the state of charge instead of reading the sensor.
    #[clap(long = "state-of-charge")]
    state_of_charge: Option<Percent>,

    /// Override the deadline, e.g. `07:00:00` or `2026-08-05 07:00:00`.
    #[clap(long = "ready-at")]
    ready_at: Option<String>,
}

impl ScoutArgs {
    pub async fn run(&self) -> Result {
        let config = self.config.load()?;
        let platform = self.home_assistant.try_new_client()?;
        let now = Local::now();

        let curve = match &self.attributes_file {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("failed to read `{}`", path.display()))?;
                PriceCurve::from_attributes(serde_json::from_str(&contents)?)?
            }
            None => {
                let platform = platform.as_ref().context(
                    "either `--attributes-file` or the Home Assistant connection is required",
                )?;
                PriceCurve::from_attributes(
                    platform.attributes(&config.plan.price_entity).await?,
                )?
            }
        };

        let state_of_charge = match self.state_of_charge {
            Some(state_of_charge) => state_of_charge,
            None => match (&platform, &config.car.soc_entity) {
                (Some(platform), Some(entity_id)) => {
                    platform.numeric_state(entity_id).await?.map_or(Percent::ZERO, Percent)
                }
                _ => Percent::ZERO,
            },
        };

        let ready_at = match &self.ready_at {
            Some(raw) => resolve_ready_at(now, raw),
            None => match (&platform, &config.car.ready_at_entity) {
                (Some(platform), Some(entity_id)) => platform
                    .state(entity_id)
                    .await?
                    .and_then(|raw| resolve_ready_at(now, &raw)),
                _ => None,
            },
        };

        let outcome = Planner::builder()
            .now(now)
            .maybe_ready_at(ready_at)
            .state_of_charge(state_of_charge)
            .battery_capacity(config.car.battery_capacity)
            .charge_power(config.car.charge_power)
            .curve(&curve)
            .build()
            .plan();
        match outcome {
            Outcome::AlreadyCharged => info!("the battery is already at the target"),
            Outcome::NoPriceData => warn!("no usable price data"),
            Outcome::Planned(plan) => {
                println!("{}", build_plan_table(&plan));
                println!(
                    "Estimated cost: {} {}",
                    plan.estimated_cost,
                    plan.currency.as_deref().unwrap_or(""),
                );
                if !plan.reaches_target {
                    warn!("the plan cannot reach the target before the deadline");
                }
            }
        }
        Ok(())
    }
}
