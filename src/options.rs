use serde::{Deserialize, Serialize};

use crate::{HttpError, Result};

/// Which built-in transport a [`Client`](crate::Client) uses when none is injected.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// General-purpose `reqwest` client.
    #[default]
    Reqwest,
    /// Pooled `hyper-util` client over plain HTTP/1.
    Hyper,
}

impl std::str::FromStr for Backend {
    type Err = HttpError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reqwest" => Ok(Backend::Reqwest),
            "hyper" => Ok(Backend::Hyper),
            other => Err(HttpError::Config(format!("unknown backend '{other}'"))),
        }
    }
}

/// Configures HTTP timeout and retry behavior.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Base retry backoff in milliseconds (exponential strategy).
    pub retry_backoff_ms: u64,
    /// Deadline for the whole call, retries and waits included.
    pub total_timeout_ms: Option<u64>,
    /// Sends `Connection: close` so pooled connections are not reused between attempts.
    pub close_connection: bool,
    /// Transport used when no custom one is supplied.
    pub backend: Backend,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 0,
            retry_backoff_ms: 250,
            total_timeout_ms: None,
            close_connection: false,
            backend: Backend::default(),
        }
    }
}

impl ClientOptions {
    /// Builds options from environment variables, starting from the defaults.
    ///
    /// Reads (all optional):
    /// - `RESILIENT_HTTP_TIMEOUT_MS`
    /// - `RESILIENT_HTTP_MAX_RETRIES`
    /// - `RESILIENT_HTTP_RETRY_BACKOFF_MS`
    /// - `RESILIENT_HTTP_TOTAL_TIMEOUT_MS`
    /// - `RESILIENT_HTTP_CLOSE_CONNECTION` (`true`/`false`/`1`/`0`)
    /// - `RESILIENT_HTTP_BACKEND` (`reqwest` or `hyper`)
    ///
    /// Returns an error if a variable is set but empty or unparsable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parses options from a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|err| HttpError::Config(format!("invalid client options JSON: {err}")))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut opts = Self::default();
        if let Some(value) = read_var(&lookup, "RESILIENT_HTTP_TIMEOUT_MS")? {
            opts.timeout_ms = parse_var("RESILIENT_HTTP_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_var(&lookup, "RESILIENT_HTTP_MAX_RETRIES")? {
            opts.max_retries = parse_var("RESILIENT_HTTP_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_var(&lookup, "RESILIENT_HTTP_RETRY_BACKOFF_MS")? {
            opts.retry_backoff_ms = parse_var("RESILIENT_HTTP_RETRY_BACKOFF_MS", &value)?;
        }
        if let Some(value) = read_var(&lookup, "RESILIENT_HTTP_TOTAL_TIMEOUT_MS")? {
            opts.total_timeout_ms = Some(parse_var("RESILIENT_HTTP_TOTAL_TIMEOUT_MS", &value)?);
        }
        if let Some(value) = read_var(&lookup, "RESILIENT_HTTP_CLOSE_CONNECTION")? {
            opts.close_connection = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(HttpError::Config(format!(
                        "RESILIENT_HTTP_CLOSE_CONNECTION must be a boolean, got '{other}'"
                    )))
                }
            };
        }
        if let Some(value) = read_var(&lookup, "RESILIENT_HTTP_BACKEND")? {
            opts.backend = value.parse()?;
        }
        Ok(opts)
    }
}

fn read_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<String>> {
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => {
            Err(HttpError::Config(format!("{key} is set but empty")))
        }
        Some(value) => Ok(Some(value.trim().to_owned())),
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| HttpError::Config(format!("{key} has invalid value '{value}'")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{Backend, ClientOptions};
    use crate::HttpError;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let opts = ClientOptions::from_lookup(lookup(&[])).expect("defaults must load");
        assert_eq!(opts, ClientOptions::default());
        assert_eq!(opts.timeout_ms, 30_000);
        assert_eq!(opts.max_retries, 0);
        assert!(!opts.close_connection);
    }

    #[test]
    fn env_values_override_defaults() {
        let opts = ClientOptions::from_lookup(lookup(&[
            ("RESILIENT_HTTP_MAX_RETRIES", "3"),
            ("RESILIENT_HTTP_RETRY_BACKOFF_MS", "10"),
            ("RESILIENT_HTTP_TOTAL_TIMEOUT_MS", "5000"),
            ("RESILIENT_HTTP_CLOSE_CONNECTION", "true"),
            ("RESILIENT_HTTP_BACKEND", "Hyper"),
        ]))
        .expect("options must parse");
        assert_eq!(opts.max_retries, 3);
        assert_eq!(opts.retry_backoff_ms, 10);
        assert_eq!(opts.total_timeout_ms, Some(5000));
        assert!(opts.close_connection);
        assert_eq!(opts.backend, Backend::Hyper);
    }

    #[test]
    fn empty_or_bad_values_are_rejected() {
        let err = ClientOptions::from_lookup(lookup(&[("RESILIENT_HTTP_TIMEOUT_MS", "  ")]))
            .expect_err("empty value must fail");
        assert!(matches!(err, HttpError::Config(msg) if msg.contains("set but empty")));

        let err = ClientOptions::from_lookup(lookup(&[("RESILIENT_HTTP_MAX_RETRIES", "many")]))
            .expect_err("non-numeric value must fail");
        assert!(matches!(err, HttpError::Config(_)));
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let opts = ClientOptions::from_json(r#"{"max_retries": 2, "backend": "hyper"}"#)
            .expect("json must parse");
        assert_eq!(opts.max_retries, 2);
        assert_eq!(opts.backend, Backend::Hyper);
        assert_eq!(opts.timeout_ms, 30_000);
    }
}
