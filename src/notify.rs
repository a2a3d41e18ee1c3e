//! Outbound transition notifications
//!
//! Offline/online transitions detected by the liveness sweep are posted to
//! a configured webhook. Delivery is fire-and-forget: failures are logged
//! and never surface to the sweep.

use std::fmt;

use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::config::NotifierConfig;

/// Host liveness transition reported by the sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Online,
    Offline,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Online => write!(f, "online"),
            Transition::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct WebhookMessage {
    content: String,
}

/// Webhook notifier shared by all sweep passes
#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    config: Option<NotifierConfig>,
}

impl Notifier {
    pub fn new(config: Option<NotifierConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn build_message(&self, name: &str, transition: Transition) -> WebhookMessage {
        let headline = match transition {
            Transition::Offline => format!("🔴 Host **{name}** went offline"),
            Transition::Online => format!("🟢 Host **{name}** is back online"),
        };

        let content = match self.config.as_ref().and_then(|c| c.mention.as_deref()) {
            Some(mention) => format!("<@{mention}> {headline}"),
            None => headline,
        };

        WebhookMessage { content }
    }

    /// Post one transition to the webhook. Never returns an error; every
    /// outcome is logged here.
    #[instrument(skip(self))]
    pub async fn notify(&self, name: &str, transition: Transition) {
        let Some(config) = self.config.as_ref() else {
            info!("host {name} is now {transition} (no webhook configured)");
            return;
        };

        let message = self.build_message(name, transition);

        match self.client.post(&config.url).json(&message).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("sent {transition} notification for {name}");
                } else {
                    warn!(
                        "{transition} notification for {name} failed with status: {}",
                        response.status()
                    );
                }
            }
            Err(e) => {
                error!("failed to send {transition} notification for {name}: {e}");
            }
        }
    }
}
