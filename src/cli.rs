mod burrow;
mod prowl;
mod scout;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::Url;

pub use self::{burrow::BurrowArgs, prowl::ProwlArgs, scout::ScoutArgs};
use crate::{api::home_assistant, config::Config, prelude::*};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: watch the house and steer the charger.
    #[clap(name = "prowl")]
    Prowl(Box<ProwlArgs>),

    /// Build and print the charge plan without touching the charger.
    #[clap(name = "scout")]
    Scout(Box<ScoutArgs>),

    /// Development tools.
    #[clap(name = "burrow")]
    Burrow(Box<BurrowArgs>),
}

#[derive(Parser)]
pub struct HomeAssistantConnectionArgs {
    /// Home Assistant API access token.
    #[clap(long = "home-assistant-access-token", env = "HOME_ASSISTANT_ACCESS_TOKEN")]
    pub access_token: String,

    /// Home Assistant API base URL. For example: `http://homeassistant.local:8123/api`.
    #[clap(long = "home-assistant-api-base-url", env = "HOME_ASSISTANT_API_BASE_URL")]
    pub base_url: Url,
}

impl HomeAssistantConnectionArgs {
    pub fn try_new_client(&self) -> Result<home_assistant::Api> {
        home_assistant::Api::try_new(&self.access_token, self.base_url.clone())
    }
}

/// Like [`HomeAssistantConnectionArgs`], for commands that can also run from
/// a file.
#[derive(Parser)]
pub struct OptionalConnectionArgs {
    /// Home Assistant API access token.
    #[clap(long = "home-assistant-access-token", env = "HOME_ASSISTANT_ACCESS_TOKEN")]
    pub access_token: Option<String>,

    /// Home Assistant API base URL. For example: `http://homeassistant.local:8123/api`.
    #[clap(long = "home-assistant-api-base-url", env = "HOME_ASSISTANT_API_BASE_URL")]
    pub base_url: Option<Url>,
}

impl OptionalConnectionArgs {
    pub fn try_new_client(&self) -> Result<Option<home_assistant::Api>> {
        match (&self.access_token, &self.base_url) {
            (Some(access_token), Some(base_url)) => {
                Ok(Some(home_assistant::Api::try_new(access_token, base_url.clone())?))
            }
            (None, None) => Ok(None),
            _ => bail!("both the access token and the base URL are required"),
        }
    }
}

#[derive(Parser)]
pub struct ConfigArgs {
    /// Path to the controller configuration file.
    #[clap(long = "config", env = "CORSAC_CONFIG", default_value = "corsac.toml")]
    pub path: PathBuf,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<Config> {
        Config::try_load(&self.path)
    }
}
