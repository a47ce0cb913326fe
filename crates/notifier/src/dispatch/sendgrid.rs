//! SendGrid v3 email dispatcher.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;

use missive_common::config::ProviderSettings;
use missive_common::error::{NotifyError, ProviderError};
use missive_common::types::{DispatchOutcome, EmailProvider, Envelope};

/// Path of the mail send endpoint, relative to the API base URL.
pub const SEND_PATH: &str = "/v3/mail/send";

pub struct SendGridDispatcher {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
    from_name: String,
    envelope: Envelope,
}

impl SendGridDispatcher {
    pub fn new(client: Client, settings: &ProviderSettings, envelope: Envelope) -> Self {
        Self {
            client,
            endpoint: format!(
                "{}{}",
                settings.sendgrid_api_url.trim_end_matches('/'),
                SEND_PATH
            ),
            api_key: settings.sendgrid_api_key.clone(),
            from: settings.email_from.clone(),
            from_name: settings.email_from_name.clone(),
            envelope,
        }
    }

    /// Mail payload; the envelope body is sent as HTML content.
    pub fn payload(&self) -> serde_json::Value {
        json!({
            "personalizations": [
                { "to": [{ "email": self.envelope.to }] }
            ],
            "from": { "email": self.from, "name": self.from_name },
            "subject": self.envelope.subject,
            "content": [
                { "type": "text/html", "value": self.envelope.body }
            ]
        })
    }
}

#[async_trait]
impl super::Dispatcher for SendGridDispatcher {
    fn provider(&self) -> &str {
        EmailProvider::SendGrid.as_str()
    }

    async fn dispatch(&self) -> Result<DispatchOutcome, NotifyError> {
        let provider = EmailProvider::SendGrid.as_str();
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredential(provider))?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&self.payload())
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::ACCEPTED {
            tracing::debug!(to = %self.envelope.to, status = status.as_u16(), "Email accepted");
            return Ok(DispatchOutcome::delivered());
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(
            to = %self.envelope.to,
            status = status.as_u16(),
            "Email rejected by provider"
        );
        Err(ProviderError::Status {
            provider,
            status: status.as_u16(),
            body,
        }
        .into())
    }
}
