//! Seam between the controllers and the home-automation platform.

use async_trait::async_trait;
use serde_json::Value;

use crate::prelude::*;

/// What the controllers need from the host platform: read entity state,
/// read attribute bundles, and invoke remote services.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Read the scalar state of an entity.
    ///
    /// Returns [`None`] when the entity does not exist or its state is
    /// `unknown`/`unavailable`.
    async fn state(&self, entity_id: &str) -> Result<Option<String>>;

    /// Read the full attribute bundle of an entity.
    async fn attributes(&self, entity_id: &str) -> Result<Value>;

    /// Invoke a remote service with a key-value payload.
    async fn call(&self, domain: &str, service: &str, payload: Value) -> Result;

    /// Read an `input_boolean`-style entity.
    async fn is_on(&self, entity_id: &str) -> Result<bool> {
        Ok(self.state(entity_id).await?.as_deref() == Some("on"))
    }

    /// Read a numeric sensor, [`None`] when absent or non-numeric.
    async fn numeric_state(&self, entity_id: &str) -> Result<Option<f64>> {
        Ok(self.state(entity_id).await?.and_then(|state| state.parse().ok()))
    }
}
