use std::str::FromStr;
use std::time::Duration;

/// What the queue store does with an entry that cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptEntryPolicy {
    /// Push the raw value back, unchanged, to the tail of the same key.
    #[default]
    Preserve,
    /// Drop the raw value.
    Discard,
}

impl FromStr for CorruptEntryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preserve" => Ok(CorruptEntryPolicy::Preserve),
            "discard" => Ok(CorruptEntryPolicy::Discard),
            other => Err(format!("unknown corrupt entry policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Sender identity and credentials handed to dispatcher constructors.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Sender address on outgoing mail
    pub email_from: String,

    /// Sender display name on outgoing mail
    pub email_from_name: String,

    /// SendGrid API key (bearer credential)
    pub sendgrid_api_key: Option<String>,

    /// SendGrid API base URL, without the `/v3/mail/send` path
    pub sendgrid_api_url: String,

    /// Timeout applied to each outbound provider request
    pub request_timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            email_from: "test@test.com".to_string(),
            email_from_name: "Test User".to_string(),
            sendgrid_api_key: None,
            sendgrid_api_url: "https://api.sendgrid.com".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Bounds on every Redis round trip.
///
/// A server that accepts the connection but never answers surfaces as a store
/// error once these expire, instead of stalling the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedisTimeouts {
    /// Limit on establishing a connection, handshake included
    pub connect: Duration,

    /// Limit on waiting for the reply to a single command
    pub response: Duration,
}

impl Default for RedisTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            response: Duration::from_secs(5),
        }
    }
}

/// Worker pool sizing and timing.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Number of worker tokens, i.e. the cap on concurrent dispatch cycles
    pub pool_size: usize,

    /// Sleep after a dequeue that found nothing (or failed)
    pub backoff: Duration,

    /// How long shutdown waits for in-flight cycles before aborting them
    pub drain_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            pool_size: 2,
            backoff: Duration::from_secs(60),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Redis connection string
    pub redis_url: String,

    /// Redis password, overrides any credential in `redis_url`
    pub redis_password: Option<String>,

    /// Redis logical database index, overrides any index in `redis_url`
    pub redis_db: Option<i64>,

    pub redis_timeouts: RedisTimeouts,

    /// Address the HTTP API binds to
    pub bind_addr: String,

    /// Provider used for the email channel (e.g. "sendgrid")
    pub default_email_provider: String,

    pub providers: ProviderSettings,

    pub workers: WorkerSettings,

    pub corrupt_entry_policy: CorruptEntryPolicy,

    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pool_size: usize = parse_or(&lookup, "WORKER_POOL_SIZE", 2)?;
        if pool_size == 0 {
            anyhow::bail!("WORKER_POOL_SIZE must be at least 1");
        }

        Ok(Self {
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            redis_password: lookup("REDIS_PASSWORD").filter(|p| !p.is_empty()),
            redis_db: lookup("REDIS_DB")
                .map(|v| {
                    v.parse()
                        .map_err(|_| anyhow::anyhow!("REDIS_DB must be a valid i64"))
                })
                .transpose()?,
            redis_timeouts: RedisTimeouts {
                connect: Duration::from_secs(parse_or(&lookup, "REDIS_CONNECT_TIMEOUT_SECS", 5)?),
                response: Duration::from_secs(parse_or(
                    &lookup,
                    "REDIS_RESPONSE_TIMEOUT_SECS",
                    5,
                )?),
            },
            bind_addr: lookup("API_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:9092".to_string()),
            default_email_provider: lookup("DEFAULT_EMAIL_PROVIDER")
                .unwrap_or_else(|| "sendgrid".to_string()),
            providers: ProviderSettings {
                email_from: lookup("EMAIL_FROM").unwrap_or_else(|| "test@test.com".to_string()),
                email_from_name: lookup("EMAIL_FROM_NAME")
                    .unwrap_or_else(|| "Test User".to_string()),
                sendgrid_api_key: lookup("SENDGRID_API_KEY").filter(|k| !k.is_empty()),
                sendgrid_api_url: lookup("SENDGRID_API_URL")
                    .unwrap_or_else(|| "https://api.sendgrid.com".to_string()),
                request_timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "PROVIDER_TIMEOUT_SECS",
                    30,
                )?),
            },
            workers: WorkerSettings {
                pool_size,
                backoff: Duration::from_secs(parse_or(&lookup, "WORKER_BACKOFF_SECS", 60)?),
                drain_timeout: Duration::from_secs(parse_or(&lookup, "SHUTDOWN_DRAIN_SECS", 30)?),
            },
            corrupt_entry_policy: parse_or(
                &lookup,
                "QUEUE_CORRUPT_ENTRY_POLICY",
                CorruptEntryPolicy::default(),
            )?,
            log_format: parse_or(&lookup, "LOG_FORMAT", LogFormat::default())?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            anyhow::anyhow!(
                "{} must be a valid {}",
                key,
                std::any::type_name::<T>().rsplit("::").next().unwrap_or("value")
            )
        }),
        None => Ok(default),
    }
}
