//! Node connection settings.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Delay between receives while an invoice or payment is still pending.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Settings for connecting to an LND node over its REST API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LndConfig {
    /// REST endpoint, e.g. "https://127.0.0.1:8080".
    pub url: String,
    /// Hex-encoded macaroon sent with every request.
    pub macaroon: String,
    /// PEM certificate to trust in addition to the system roots. LND uses a
    /// self-signed one by default.
    #[serde(default)]
    pub tls_cert_pem: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl LndConfig {
    pub fn new(url: impl Into<String>, macaroon: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            macaroon: macaroon.into(),
            tls_cert_pem: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    /// Load the binary macaroon and the TLS certificate the node wrote to disk.
    pub fn from_files(
        url: impl Into<String>,
        macaroon_path: impl AsRef<Path>,
        tls_cert_path: Option<&Path>,
    ) -> Result<Self> {
        let macaroon_path = macaroon_path.as_ref();
        let macaroon = std::fs::read(macaroon_path).map_err(|e| {
            Error::Config(format!(
                "Failed to read macaroon {}: {}",
                macaroon_path.display(),
                e
            ))
        })?;

        let tls_cert_pem = tls_cert_path
            .map(|path| {
                std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!(
                        "Failed to read TLS certificate {}: {}",
                        path.display(),
                        e
                    ))
                })
            })
            .transpose()?;

        Ok(Self {
            tls_cert_pem,
            ..Self::new(url, hex::encode(macaroon))
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check the settings before any connection is made.
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "URL must start with http:// or https://: {}",
                self.url
            )));
        }
        if self.macaroon.is_empty() {
            return Err(Error::Config("macaroon is empty".to_string()));
        }
        hex::decode(&self.macaroon)
            .map_err(|e| Error::Config(format!("macaroon is not hex: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_interval_defaults_when_missing() {
        let config: LndConfig = serde_json::from_str(
            r#"{"url": "https://localhost:8080", "macaroon": "0201036c6e64"}"#,
        )
        .unwrap();

        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.tls_cert_pem, None);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(LndConfig::new("localhost:8080", "00").validate().is_err());
        assert!(LndConfig::new("https://localhost:8080", "").validate().is_err());
        assert!(LndConfig::new("https://localhost:8080", "xyz").validate().is_err());
    }

    #[test]
    fn macaroon_file_is_hex_encoded() {
        let path = std::env::temp_dir().join(format!("lnc-core-test-{}.macaroon", std::process::id()));
        std::fs::write(&path, [0x02, 0x01, 0x03]).unwrap();

        let config = LndConfig::from_files("https://localhost:8080", &path, None).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.macaroon, "020103");
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn missing_macaroon_file() {
        let err = LndConfig::from_files("https://localhost:8080", "/nonexistent/admin.macaroon", None)
            .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
    }
}
