//! Notification service façade.
//!
//! Three operations over the envelope and the queue:
//! - `send_notification`: resolve a dispatcher and deliver now (no retry here)
//! - `add_to_queue`: push to the `"default"` queue
//! - `remove_from_queue`: pop from the `"default"` queue
//!
//! Errors are always returned to the caller; only the worker pool absorbs them.

use std::collections::HashMap;
use std::sync::Arc;

use missive_common::config::AppConfig;
use missive_common::error::NotifyError;
use missive_common::types::{Channel, DispatchOutcome, Envelope};

use crate::dispatch::DispatchRegistry;
use crate::queue::{DEFAULT_QUEUE_KEY, QueueStore};

/// Process-wide default provider for each channel.
#[derive(Debug, Clone, Default)]
pub struct DefaultProviders {
    providers: HashMap<Channel, String>,
}

impl DefaultProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: Channel, provider: impl Into<String>) -> Self {
        self.providers.insert(channel, provider.into());
        self
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new().with(Channel::Email, config.default_email_provider.clone())
    }

    pub fn get(&self, channel: Channel) -> Option<&str> {
        self.providers.get(&channel).map(String::as_str)
    }
}

pub struct NotificationService {
    store: Arc<dyn QueueStore>,
    registry: DispatchRegistry,
    defaults: DefaultProviders,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn QueueStore>,
        registry: DispatchRegistry,
        defaults: DefaultProviders,
    ) -> Self {
        Self {
            store,
            registry,
            defaults,
        }
    }

    /// Deliver an envelope immediately through its channel's default provider.
    ///
    /// Provider errors are passed through unwrapped.
    pub async fn send_notification(
        &self,
        envelope: &Envelope,
    ) -> Result<DispatchOutcome, NotifyError> {
        let channel = envelope.channel;
        let provider = self.defaults.get(channel);

        let dispatcher = provider
            .and_then(|p| self.registry.resolve(channel, p, envelope.clone()))
            .ok_or_else(|| {
                tracing::warn!(%channel, provider = ?provider, "No dispatcher for envelope");
                NotifyError::InvalidMessageType {
                    channel,
                    provider: provider.map(str::to_string),
                }
            })?;

        let result = dispatcher.dispatch().await;
        match &result {
            Ok(outcome) => tracing::info!(
                %channel,
                provider = dispatcher.provider(),
                success = outcome.success,
                "Notification dispatched"
            ),
            Err(e) => tracing::warn!(
                %channel,
                provider = dispatcher.provider(),
                error = %e,
                "Notification dispatch failed"
            ),
        }
        result
    }

    /// Push an envelope to the default queue.
    pub async fn add_to_queue(&self, envelope: &Envelope) -> Result<DispatchOutcome, NotifyError> {
        self.store.push(DEFAULT_QUEUE_KEY, envelope).await?;
        tracing::debug!(channel = %envelope.channel, to = %envelope.to, "Envelope queued");
        Ok(DispatchOutcome::delivered())
    }

    /// Pop the oldest envelope from the default queue.
    pub async fn remove_from_queue(&self) -> Result<Envelope, NotifyError> {
        self.store.pop(DEFAULT_QUEUE_KEY).await
    }

    /// Number of envelopes waiting in the default queue.
    pub async fn queue_depth(&self) -> Result<usize, NotifyError> {
        self.store.depth(DEFAULT_QUEUE_KEY).await
    }
}
