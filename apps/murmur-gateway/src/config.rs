use std::time::Duration;

use crate::gateway::registry::SessionPolicy;

/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// PostgreSQL connection string. Without it the gateway runs on
    /// in-memory collaborators.
    pub database_url: Option<String>,
    pub session_policy: SessionPolicy,
    /// Offline grace window. Zero announces offline immediately.
    pub presence_grace: Duration,
    /// How often parked offline transitions are checked.
    pub presence_sweep: Duration,
    /// A connection with no inbound traffic for this long is closed.
    pub ping_timeout: Duration,
    /// A connection must send `register_user` within this window.
    pub register_timeout: Duration,
    /// Push relay endpoint. Without it escalations are only logged.
    pub push_relay_url: Option<String>,
    pub push_timeout: Duration,
    /// Bearer token for the internal hook API. Without it the hooks reject
    /// every call.
    pub internal_token: Option<String>,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            database_url: None,
            session_policy: SessionPolicy::Shared,
            presence_grace: Duration::ZERO,
            presence_sweep: Duration::from_millis(1000),
            ping_timeout: Duration::from_millis(60_000),
            register_timeout: Duration::from_millis(30_000),
            push_relay_url: None,
            push_timeout: Duration::from_millis(5000),
            internal_token: None,
            cors_origins: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a variable is set but invalid.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed_var("PORT").unwrap_or(defaults.port),
            database_url: optional_var("DATABASE_URL"),
            session_policy: optional_var("SESSION_POLICY")
                .map(|v| v.parse().unwrap_or_else(|e| panic!("SESSION_POLICY: {e}")))
                .unwrap_or(defaults.session_policy),
            presence_grace: millis_var("PRESENCE_GRACE_MS").unwrap_or(defaults.presence_grace),
            presence_sweep: nonzero(
                "PRESENCE_SWEEP_MS",
                millis_var("PRESENCE_SWEEP_MS").unwrap_or(defaults.presence_sweep),
            ),
            ping_timeout: nonzero(
                "PING_TIMEOUT_MS",
                millis_var("PING_TIMEOUT_MS").unwrap_or(defaults.ping_timeout),
            ),
            register_timeout: millis_var("REGISTER_TIMEOUT_MS")
                .unwrap_or(defaults.register_timeout),
            push_relay_url: optional_var("PUSH_RELAY_URL"),
            push_timeout: millis_var("PUSH_TIMEOUT_MS").unwrap_or(defaults.push_timeout),
            internal_token: optional_var("INTERNAL_TOKEN"),
            cors_origins: optional_var("CORS_ORIGINS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    optional_var(name).map(|v| {
        v.trim()
            .parse()
            .unwrap_or_else(|_| panic!("{name} env var has an invalid value: {v}"))
    })
}

fn millis_var(name: &str) -> Option<Duration> {
    parsed_var::<u64>(name).map(Duration::from_millis)
}

fn nonzero(name: &str, value: Duration) -> Duration {
    if value.is_zero() {
        panic!("{name} must be greater than zero");
    }
    value
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_skips_empty() {
        assert_eq!(
            split_list(" https://a.example , ,https://b.example,"),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.session_policy, SessionPolicy::Shared);
        assert!(config.presence_grace.is_zero());
        assert_eq!(config.ping_timeout, Duration::from_secs(60));
        assert!(config.internal_token.is_none());
    }

    #[test]
    #[should_panic(expected = "PING_TIMEOUT_MS must be greater than zero")]
    fn nonzero_rejects_zero() {
        nonzero("PING_TIMEOUT_MS", Duration::ZERO);
    }
}
