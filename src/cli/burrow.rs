use chrono::Local;
use clap::{Parser, Subcommand};

use crate::{
    cli::{ConfigArgs, HomeAssistantConnectionArgs},
    core::{charger::ChargerStatus, platform::Platform, price::PriceCurve},
    prelude::*,
    tables::build_price_table,
};

#[derive(Parser)]
pub struct BurrowArgs {
    #[command(subcommand)]
    pub command: BurrowCommand,
}

#[derive(Subcommand)]
pub enum BurrowCommand {
    /// Dump the upcoming price curve.
    Prices(BurrowPricesArgs),

    /// Dump the live charger snapshot.
    Status(BurrowStatusArgs),
}

impl BurrowArgs {
    pub async fn run(&self) -> Result {
        match &self.command {
            BurrowCommand::Prices(args) => args.run().await,
            BurrowCommand::Status(args) => args.run().await,
        }
    }
}

#[derive(Parser)]
pub struct BurrowPricesArgs {
    #[clap(flatten)]
    home_assistant: HomeAssistantConnectionArgs,

    #[clap(flatten)]
    config: ConfigArgs,
}

impl BurrowPricesArgs {
    pub async fn run(&self) -> Result {
        let config = self.config.load()?;
        let platform = self.home_assistant.try_new_client()?;
        let curve = PriceCurve::from_attributes(
            platform.attributes(&config.plan.price_entity).await?,
        )?;
        ensure!(!curve.is_empty(), "the price sensor returned no data");
        if let Some(currency) = &curve.currency {
            info!(%currency, "gotcha");
        }
        let slots = curve.availability_window(Local::now(), None);
        println!("{}", build_price_table(&slots));
        Ok(())
    }
}

#[derive(Parser)]
pub struct BurrowStatusArgs {
    #[clap(flatten)]
    home_assistant: HomeAssistantConnectionArgs,

    #[clap(flatten)]
    config: ConfigArgs,
}

impl BurrowStatusArgs {
    pub async fn run(&self) -> Result {
        let config = self.config.load()?;
        let platform = self.home_assistant.try_new_client()?;

        let raw = platform.state(&config.charger.status_entity).await?;
        match raw.as_deref().and_then(ChargerStatus::parse) {
            Some(status) => info!(%status, "charger"),
            None => warn!(?raw, "unrecognized charger status"),
        }
        if let Some(entity_id) = &config.charger.current_entity
            && let Some(current) = platform.numeric_state(entity_id).await?
        {
            info!(current, "charger draw");
        }
        if let Some(entity_id) = &config.charger.max_circuit_entity
            && let Some(rating) = platform.numeric_state(entity_id).await?
        {
            info!(rating, "circuit rating");
        }
        Ok(())
    }
}
