use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Outbound channel a notification is delivered through.
///
/// On the wire the channel is an integer ordinal (`EMAIL = 0`). Ordinals this
/// build does not know are kept as `Unrecognized` so they can be rejected by the
/// dispatch registry rather than by the JSON decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Channel {
    #[default]
    Email,
    Unrecognized(i32),
}

impl From<i32> for Channel {
    fn from(ordinal: i32) -> Self {
        match ordinal {
            0 => Channel::Email,
            other => Channel::Unrecognized(other),
        }
    }
}

impl From<Channel> for i32 {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Email => 0,
            Channel::Unrecognized(ordinal) => ordinal,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Unrecognized(ordinal) => write!(f, "unrecognized({})", ordinal),
        }
    }
}

/// Email backends with a built-in dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmailProvider {
    SendGrid,
}

impl EmailProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailProvider::SendGrid => "sendgrid",
        }
    }
}

impl FromStr for EmailProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sendgrid" => Ok(EmailProvider::SendGrid),
            other => Err(format!("unknown email provider: {}", other)),
        }
    }
}

impl std::fmt::Display for EmailProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of notification work.
///
/// Envelopes carry no id: two envelopes with equal fields are interchangeable
/// once they sit in a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", default)]
    pub channel: Channel,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(rename = "msg", default)]
    pub body: String,
}

impl Envelope {
    pub fn new(
        channel: Channel,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    pub fn email(
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::new(Channel::Email, to, subject, body)
    }

    /// Text form stored in the queue.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Result of a single delivery attempt. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub success: bool,
}

impl DispatchOutcome {
    pub fn delivered() -> Self {
        Self { success: true }
    }

    pub fn failed() -> Self {
        Self { success: false }
    }
}
