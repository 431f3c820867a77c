use std::sync::Arc;

use crate::{config::Config, core::platform::Platform, prelude::*};

/// Operator notifications through the configured `notify` service.
///
/// Delivery is best-effort: a failed notification is logged and forgotten.
#[derive(Clone)]
pub struct Notifier {
    platform: Arc<dyn Platform>,
    config: Arc<Config>,
}

impl Notifier {
    pub fn new(platform: Arc<dyn Platform>, config: Arc<Config>) -> Self {
        Self { platform, config }
    }

    pub async fn send(&self, message: &str) {
        let Some(notify) = &self.config.notify else {
            debug!(message, "notifications are not configured");
            return;
        };
        let payload = serde_json::json!({
            "title": notify.title,
            "message": message,
        });
        if let Err(error) =
            self.platform.call(&notify.service.domain, &notify.service.service, payload).await
        {
            warn!("failed to send the notification: {error:#}");
        }
    }
}
