use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use crate::error::SinkError;

/// Sink client settings. `uri` comes from `SINK_URI`, the rest from `[sink]`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HttpSinkConfig {
    #[serde(default)]
    pub uri: String,
    /// Per-request timeout, connect included.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Static headers added to every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for HttpSinkConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            timeout_ms: default_timeout_ms(),
            headers: BTreeMap::new(),
        }
    }
}

impl HttpSinkConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), ..Self::default() }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `uri` as an absolute http(s) URL.
    pub fn url(&self) -> Result<Url, SinkError> {
        let invalid = |reason: String| SinkError::InvalidUri { uri: self.uri.clone(), reason };

        let url = Url::parse(self.uri.trim()).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme '{other}'"))),
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".into()));
        }
        Ok(url)
    }

    pub fn header_map(&self) -> Result<HeaderMap, SinkError> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            let invalid = |reason: String| SinkError::InvalidHeader { name: name.clone(), reason };
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
            let value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
            map.insert(header, value);
        }
        Ok(map)
    }

    pub fn validate(&self) -> Result<(), SinkError> {
        self.url()?;
        self.header_map()?;
        if self.timeout_ms == 0 {
            return Err(SinkError::InvalidUri {
                uri: self.uri.clone(),
                reason: "timeout_ms must be > 0".into(),
            });
        }
        Ok(())
    }
}
