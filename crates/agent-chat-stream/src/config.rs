use std::time::Duration;

use crate::errors::ClientError;
use crate::transport::ReaderStrategy;

const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for an `A2aClient`.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// JSON-RPC endpoint of the remote runtime.
    pub endpoint: String,
    /// Optional bearer token for authenticated deployments.
    pub bearer_token: Option<String>,
    /// Watchdog window for streams.
    ///
    /// Long by default: multi-agent tool execution can be quiet for minutes.
    pub inactivity_timeout: Duration,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Total timeout for non-streaming calls (`tasks/cancel`, `tasks/get`).
    pub request_timeout: Duration,
    /// Body reading strategy, fixed for the client's lifetime.
    pub reader_strategy: ReaderStrategy,
}

impl ClientConfig {
    /// Creates a config with defaults for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bearer_token: None,
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reader_strategy: ReaderStrategy::default(),
        }
    }

    /// Builds a config from `A2A_*` environment variables.
    ///
    /// - `A2A_ENDPOINT` (required)
    /// - `A2A_BEARER_TOKEN`
    /// - `A2A_INACTIVITY_TIMEOUT_SECS`, `A2A_CONNECT_TIMEOUT_SECS`,
    ///   `A2A_REQUEST_TIMEOUT_SECS`
    /// - `A2A_READER` (`pipe` | `manual`), else detection from `A2A_USER_AGENT`
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_env_with_endpoint(None)
    }

    /// Like `from_env`, with `endpoint` taking precedence over `A2A_ENDPOINT`.
    pub fn from_env_with_endpoint(endpoint: Option<String>) -> Result<Self, ClientError> {
        Self::from_lookup(|key| match (key, &endpoint) {
            ("A2A_ENDPOINT", Some(endpoint)) => Some(endpoint.clone()),
            _ => std::env::var(key).ok(),
        })
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ClientError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let endpoint = get("A2A_ENDPOINT")
            .ok_or_else(|| ClientError::Config("missing A2A_ENDPOINT".into()))?;
        let mut config = Self::new(endpoint.trim());
        config.bearer_token = get("A2A_BEARER_TOKEN").map(|t| t.trim().to_string());

        if let Some(secs) = get("A2A_INACTIVITY_TIMEOUT_SECS") {
            config.inactivity_timeout = parse_secs("A2A_INACTIVITY_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = get("A2A_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout = parse_secs("A2A_CONNECT_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = get("A2A_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = parse_secs("A2A_REQUEST_TIMEOUT_SECS", &secs)?;
        }

        config.reader_strategy = match get("A2A_READER") {
            Some(raw) => ReaderStrategy::parse(&raw).ok_or_else(|| {
                ClientError::Config(format!("A2A_READER must be pipe or manual, got {raw:?}"))
            })?,
            None => get("A2A_USER_AGENT")
                .map(|ua| ReaderStrategy::for_user_agent(&ua))
                .unwrap_or_default(),
        };
        Ok(config)
    }

    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn inactivity_timeout(mut self, window: Duration) -> Self {
        self.inactivity_timeout = window;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn reader_strategy(mut self, strategy: ReaderStrategy) -> Self {
        self.reader_strategy = strategy;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.endpoint.trim().is_empty() {
            return Err(ClientError::Config("endpoint must not be empty".into()));
        }
        if self.inactivity_timeout.is_zero() {
            return Err(ClientError::Config(
                "inactivity timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration, ClientError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ClientError::Config(format!("{key} must be a number of seconds: {e}")))
}
