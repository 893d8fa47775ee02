use {
    crate::{
        adapters::verifier::DEFAULT_TOLERANCE_SECS,
        domain::{error::SyncError, event::EventKind},
    },
    std::{str::FromStr, time::Duration},
};

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub stripe_secret_key: String,
    pub webhook_secret: String,
    pub app_url: String,
    pub database_url: Option<String>,
    pub listen_addr: String,
    pub stripe_timeout: Duration,
    pub webhook_tolerance_secs: i64,
    pub webhook_events: Vec<EventKind>,
    pub outbound_max_attempts: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SyncError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required =
            |key: &str| get(key).ok_or_else(|| SyncError::Config(format!("{key} must be set")));

        let app_url = required("PUBLIC_APP_URL")?.trim_end_matches('/').to_string();
        if !app_url.starts_with("http://") && !app_url.starts_with("https://") {
            return Err(SyncError::Config(format!(
                "PUBLIC_APP_URL must be an absolute http(s) URL, got: {app_url}"
            )));
        }

        let webhook_events = match get("WEBHOOK_EVENTS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(EventKind::from_str)
                .collect::<Result<Vec<_>, _>>()?,
            None => EventKind::ALL.to_vec(),
        };

        Ok(Self {
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            webhook_secret: required("STRIPE_WEBHOOKS_ENDPOINT_SECRET")?,
            app_url,
            database_url: get("DATABASE_URL"),
            listen_addr: get("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            stripe_timeout: Duration::from_secs(parse_or(&get, "STRIPE_TIMEOUT_SECS", 10)?),
            webhook_tolerance_secs: parse_or(&get, "WEBHOOK_TOLERANCE_SECS", DEFAULT_TOLERANCE_SECS)?,
            webhook_events,
            outbound_max_attempts: parse_or(&get, "OUTBOUND_SYNC_MAX_ATTEMPTS", 3)?,
        })
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, SyncError> {
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| SyncError::Config(format!("{key} is not a valid number: {raw}"))),
        None => Ok(default),
    }
}
