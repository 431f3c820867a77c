use std::sync::Arc;

use clap::Parser;

use crate::{
    cli::{ConfigArgs, HomeAssistantConnectionArgs},
    prelude::*,
    service::Service,
};

#[derive(Parser)]
pub struct ProwlArgs {
    #[clap(flatten)]
    home_assistant: HomeAssistantConnectionArgs,

    #[clap(flatten)]
    config: ConfigArgs,

    /// How often to poll the subscribed entities.
    #[clap(long = "poll-interval", env = "POLL_INTERVAL", default_value = "30s")]
    poll_interval: humantime::Duration,
}

impl ProwlArgs {
    pub async fn run(&self) -> Result {
        let config = self.config.load()?;
        let platform = Arc::new(self.home_assistant.try_new_client()?);
        let (service, actions) = Service::new(platform, config);
        service.run(actions, self.poll_interval.into()).await
    }
}
