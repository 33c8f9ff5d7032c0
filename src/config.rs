use std::env;
use std::fmt;
use std::time::Duration;

use log::*;

use crate::domain::errors::DomainError;

const DEFAULT_GATEWAY_URL: &str = "https://cybqa.pesapal.com/pesapalv3";

/// A value that never appears in `Debug` output or logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret<T: Clone + Default> {
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl<T: Clone + Default> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub consumer_key: Secret<String>,
    pub consumer_secret: Secret<String>,
    pub timeout: Duration,
    /// Notification registration handle provisioned out of band, if any.
    pub ipn_id: Option<String>,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, consumer_key: &str, consumer_secret: &str) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            consumer_key: Secret::new(consumer_key.to_string()),
            consumer_secret: Secret::new(consumer_secret.to_string()),
            timeout: Duration::from_secs(15),
            ipn_id: None,
        }
    }
}

/// Public URLs the gateway and the browser are sent back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackUrls {
    /// Browser landing URL after payment.
    pub callback_url: String,
    /// Server-to-server notification URL registered with the gateway.
    pub ipn_url: String,
    /// Confirmation page the callback handler redirects the browser to.
    pub confirmation_url: String,
}

impl CallbackUrls {
    pub fn from_base(public_base_url: &str) -> Self {
        let base = public_base_url.trim_end_matches('/');
        Self {
            callback_url: format!("{base}/payments/callback"),
            ipn_url: format!("{base}/payments/ipn"),
            confirmation_url: format!("{base}/payments/confirmation"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub urls: CallbackUrls,
    pub gateway: GatewayConfig,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, DomainError> {
        let required = |name: &str| {
            env::var(name).map_err(|e| {
                DomainError::Config(format!("Missing environment variable '{name}': {e}"))
            })
        };

        let database_url = required("DATABASE_URL")?;
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|e| DomainError::Config(format!("Invalid PORT: {e}")))?;
        let public_base_url = env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| {
            warn!("PUBLIC_BASE_URL not set, the gateway will not be able to reach this service");
            format!("http://localhost:{port}")
        });
        let mut urls = CallbackUrls::from_base(&public_base_url);
        if let Ok(confirmation_url) = env::var("CONFIRMATION_URL") {
            urls.confirmation_url = confirmation_url;
        }

        let base_url = env::var("GATEWAY_BASE_URL").unwrap_or_else(|_| {
            warn!("GATEWAY_BASE_URL not set, using sandbox {DEFAULT_GATEWAY_URL}");
            DEFAULT_GATEWAY_URL.to_string()
        });
        let mut gateway = GatewayConfig::new(
            base_url,
            &required("GATEWAY_CONSUMER_KEY")?,
            &required("GATEWAY_CONSUMER_SECRET")?,
        );
        if let Ok(secs) = env::var("GATEWAY_TIMEOUT_SECS") {
            let secs = secs
                .parse::<u64>()
                .map_err(|e| DomainError::Config(format!("Invalid GATEWAY_TIMEOUT_SECS: {e}")))?;
            gateway.timeout = Duration::from_secs(secs);
        }
        gateway.ipn_id = env::var("GATEWAY_IPN_ID").ok().filter(|id| !id.is_empty());

        info!(
            "Configuration loaded. Gateway at {}, callbacks under {}",
            gateway.base_url, public_base_url
        );
        Ok(Self { database_url, host, port, urls, gateway })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_debug_is_redacted() {
        let secret = Secret::new("hunter2".to_string());
        assert_eq!(format!("{secret:?}"), "****");
        assert_eq!(secret.reveal(), "hunter2");
    }

    #[test]
    fn gateway_config_debug_never_leaks_credentials() {
        let config = GatewayConfig::new("https://gw.example/", "key-123", "secret-456");
        let printed = format!("{config:?}");
        assert!(!printed.contains("key-123"));
        assert!(!printed.contains("secret-456"));
        assert_eq!(config.base_url, "https://gw.example");
    }

    #[test]
    fn callback_urls_derive_from_public_base() {
        let urls = CallbackUrls::from_base("https://shop.example/");
        assert_eq!(urls.callback_url, "https://shop.example/payments/callback");
        assert_eq!(urls.ipn_url, "https://shop.example/payments/ipn");
        assert_eq!(urls.confirmation_url, "https://shop.example/payments/confirmation");
    }
}
