use std::collections::HashMap;
use std::sync::Arc;

use missive_common::config::ProviderSettings;
use missive_common::error::NotifyError;
use missive_common::types::{Channel, EmailProvider, Envelope};

use super::{Dispatcher, SendGridDispatcher};

/// Builds a dispatcher for one envelope from the registry's provider settings.
pub type DispatcherFactory =
    Arc<dyn Fn(Envelope, &ProviderSettings) -> Box<dyn Dispatcher> + Send + Sync>;

/// Registration table mapping `(channel, provider id)` to a dispatcher constructor.
///
/// New providers are added with [`DispatchRegistry::register`]; resolution never
/// changes. Provider ids are matched case-insensitively.
pub struct DispatchRegistry {
    settings: ProviderSettings,
    factories: HashMap<(Channel, String), DispatcherFactory>,
}

impl DispatchRegistry {
    /// Create an empty registry.
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            settings,
            factories: HashMap::new(),
        }
    }

    /// Create a registry with every built-in provider registered.
    pub fn with_builtin(settings: ProviderSettings) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| NotifyError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let mut registry = Self::new(settings);
        registry.register(
            Channel::Email,
            EmailProvider::SendGrid.as_str(),
            move |envelope, settings| {
                Box::new(SendGridDispatcher::new(client.clone(), settings, envelope))
            },
        );
        Ok(registry)
    }

    pub fn register<F>(&mut self, channel: Channel, provider: &str, factory: F)
    where
        F: Fn(Envelope, &ProviderSettings) -> Box<dyn Dispatcher> + Send + Sync + 'static,
    {
        let key = (channel, normalize(provider));
        if self.factories.insert(key, Arc::new(factory)).is_some() {
            tracing::warn!(%channel, provider, "Dispatcher registration replaced");
        }
    }

    /// Build a dispatcher for `envelope`, or `None` when the pair is unknown.
    pub fn resolve(
        &self,
        channel: Channel,
        provider: &str,
        envelope: Envelope,
    ) -> Option<Box<dyn Dispatcher>> {
        self.factories
            .get(&(channel, normalize(provider)))
            .map(|factory| factory(envelope, &self.settings))
    }

    pub fn is_registered(&self, channel: Channel, provider: &str) -> bool {
        self.factories.contains_key(&(channel, normalize(provider)))
    }

    /// Provider ids registered for `channel`, sorted.
    pub fn providers(&self, channel: Channel) -> Vec<&str> {
        let mut providers: Vec<&str> = self
            .factories
            .keys()
            .filter(|(c, _)| *c == channel)
            .map(|(_, p)| p.as_str())
            .collect();
        providers.sort_unstable();
        providers
    }
}

fn normalize(provider: &str) -> String {
    provider.trim().to_ascii_lowercase()
}
