//! [Home Assistant REST API](https://developers.home-assistant.io/docs/api/rest/) client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client,
    ClientBuilder,
    StatusCode,
    Url,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use serde::Deserialize;
use serde_json::Value;

use crate::{core::platform::Platform, prelude::*};

pub struct Api {
    client: Client,
    base_url: Url,
}

impl Api {
    pub fn try_new(access_token: &str, base_url: Url) -> Result<Self> {
        let headers = HeaderMap::from_iter([(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&format!("Bearer {access_token}"))?,
        )]);
        let client = ClientBuilder::new()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Fetch an entity, [`None`] when Home Assistant does not know it.
    #[instrument(skip_all, fields(entity_id = entity_id))]
    pub async fn get_entity(&self, entity_id: &str) -> Result<Option<EntityState>> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("invalid base URL"))?
            .push("states")
            .push(entity_id);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch `{entity_id}`"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let entity: EntityState = response
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("failed to deserialize `{entity_id}`"))?;
        Ok(Some(entity))
    }

    /// Invoke `domain.service` with the payload.
    #[instrument(skip_all, fields(domain = domain, service = service))]
    pub async fn post_service(&self, domain: &str, service: &str, payload: &Value) -> Result {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("invalid base URL"))?
            .push("services")
            .push(domain)
            .push(service);
        self.client
            .post(url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("failed to call `{domain}.{service}`"))?
            .error_for_status()
            .with_context(|| format!("`{domain}.{service}` failed"))?;
        Ok(())
    }
}

#[must_use]
#[derive(Deserialize)]
pub struct EntityState {
    pub state: String,

    #[serde(default)]
    pub attributes: Value,
}

impl EntityState {
    /// Home Assistant reports missing readings as literal strings.
    pub fn is_known(&self) -> bool {
        self.state != "unknown" && self.state != "unavailable"
    }
}

#[async_trait]
impl Platform for Api {
    async fn state(&self, entity_id: &str) -> Result<Option<String>> {
        Ok(self
            .get_entity(entity_id)
            .await?
            .filter(EntityState::is_known)
            .map(|entity| entity.state))
    }

    async fn attributes(&self, entity_id: &str) -> Result<Value> {
        Ok(self
            .get_entity(entity_id)
            .await?
            .map_or(Value::Null, |entity| entity.attributes))
    }

    async fn call(&self, domain: &str, service: &str, payload: Value) -> Result {
        self.post_service(domain, service, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_entity_state_ok() -> Result {
        // language=json
        const RESPONSE: &str = r#"
            {
                "entity_id": "sensor.easee_charger_eh123456_status",
                "state": "READY_TO_CHARGE",
                "attributes": {
                    "icon": "mdi:ev-station",
                    "friendly_name": "Easee status"
                },
                "last_changed": "2026-08-04T15:08:40.326747+00:00",
                "last_updated": "2026-08-04T15:08:40.326747+00:00"
            }
        "#;
        let entity = serde_json::from_str::<EntityState>(RESPONSE)?;
        assert_eq!(entity.state, "READY_TO_CHARGE");
        assert!(entity.is_known());
        assert_eq!(entity.attributes["friendly_name"], "Easee status");
        Ok(())
    }

    #[test]
    fn unavailable_state_is_unknown() -> Result {
        // language=json
        let entity = serde_json::from_str::<EntityState>(r#"{"state": "unavailable"}"#)?;
        assert!(!entity.is_known());
        Ok(())
    }
}
