use std::time::Duration;

use convlab_core::error::CoreError;

/// Env var holding the backend base URL.
pub const ENV_API_URL: &str = "CONVLAB_API_URL";
/// Env var for the TCP connect timeout, in seconds.
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "CONVLAB_CONNECT_TIMEOUT_SECS";
/// Env var for the synchronous request timeout, in seconds.
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "CONVLAB_REQUEST_TIMEOUT_SECS";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend base URL, without a trailing slash.
    pub api_url: String,
    pub connect_timeout: Duration,
    /// Applied to `/health` and `/convolve`; streams are never timed out.
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                        | Default |
    /// |--------------------------------|---------|
    /// | `CONVLAB_API_URL`              | required unless `api_url_override` is given |
    /// | `CONVLAB_CONNECT_TIMEOUT_SECS` | `10`    |
    /// | `CONVLAB_REQUEST_TIMEOUT_SECS` | `120`   |
    pub fn from_env(api_url_override: Option<&str>) -> Result<Self, CoreError> {
        Self::from_lookup(api_url_override, |key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(
        api_url_override: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CoreError> {
        let api_url = api_url_override
            .map(str::to_string)
            .or_else(|| lookup(ENV_API_URL))
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                CoreError::Configuration(format!(
                    "{ENV_API_URL} is not set; point it at the processing backend"
                ))
            })?;

        let connect_timeout = secs(
            &lookup,
            ENV_CONNECT_TIMEOUT_SECS,
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )?;
        let request_timeout = secs(
            &lookup,
            ENV_REQUEST_TIMEOUT_SECS,
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;

        Ok(Self {
            api_url,
            connect_timeout,
            request_timeout,
        })
    }
}

fn secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<Duration, CoreError> {
    match lookup(key) {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| CoreError::Configuration(format!("{key} must be a whole number of seconds"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_url_is_a_configuration_error() {
        assert_matches!(
            ClientConfig::from_lookup(None, lookup(&[])),
            Err(CoreError::Configuration(msg)) if msg.contains(ENV_API_URL)
        );
        assert_matches!(
            ClientConfig::from_lookup(None, lookup(&[(ENV_API_URL, "   ")])),
            Err(CoreError::Configuration(_))
        );
    }

    #[test]
    fn defaults_apply_and_trailing_slash_is_trimmed() {
        let config =
            ClientConfig::from_lookup(None, lookup(&[(ENV_API_URL, "http://gpu:8000/")])).unwrap();
        assert_eq!(config.api_url, "http://gpu:8000");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(120));
    }

    #[test]
    fn override_wins_over_environment() {
        let config = ClientConfig::from_lookup(
            Some("http://other:9000"),
            lookup(&[(ENV_API_URL, "http://gpu:8000")]),
        )
        .unwrap();
        assert_eq!(config.api_url, "http://other:9000");

        let config = ClientConfig::from_lookup(Some("http://only:1"), lookup(&[])).unwrap();
        assert_eq!(config.api_url, "http://only:1");
    }

    #[test]
    fn timeouts_are_read_and_validated() {
        let config = ClientConfig::from_lookup(
            None,
            lookup(&[
                (ENV_API_URL, "http://gpu:8000"),
                (ENV_CONNECT_TIMEOUT_SECS, "3"),
                (ENV_REQUEST_TIMEOUT_SECS, "600"),
            ]),
        )
        .unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.request_timeout, Duration::from_secs(600));

        assert_matches!(
            ClientConfig::from_lookup(
                None,
                lookup(&[(ENV_API_URL, "http://gpu:8000"), (ENV_REQUEST_TIMEOUT_SECS, "soon")]),
            ),
            Err(CoreError::Configuration(msg)) if msg.contains(ENV_REQUEST_TIMEOUT_SECS)
        );
    }
}
