//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// JWT configuration.
    pub jwt: JwtConfig,
    /// Payment provider (VNPay) configuration.
    pub vnpay: VnpayConfig,
    /// Quota enforcement configuration.
    #[serde(default)]
    pub quota: QuotaConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// JWT configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Secret key for validating tokens.
    pub secret: String,
}

/// VNPay payment gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VnpayConfig {
    /// Terminal code issued by the provider.
    pub tmn_code: String,
    /// Shared HMAC secret for signing and verifying payloads.
    pub hash_secret: String,
    /// Hosted payment page base URL.
    #[serde(default = "default_payment_url")]
    pub payment_url: String,
    /// Transaction-status (querydr) API endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Browser return URL registered with the provider.
    pub return_url: String,
    /// Outbound HTTP timeout in seconds.
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
    /// Age in seconds after which a pending payment is actively reconciled.
    #[serde(default = "default_reconcile_after")]
    pub reconcile_after_secs: u64,
}

fn default_payment_url() -> String {
    "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string()
}

fn default_api_url() -> String {
    "https://sandbox.vnpayment.vn/merchant_webapi/api/transaction".to_string()
}

fn default_provider_timeout() -> u64 {
    15
}

fn default_reconcile_after() -> u64 {
    900 // 15 minutes without a callback
}

/// Quota enforcement configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    /// Soft-cap warning threshold as a percentage of quota.
    #[serde(default = "default_soft_cap_percent")]
    pub soft_cap_percent: u8,
    /// Grace window in days for camera quota overruns.
    #[serde(default = "default_grace_days")]
    pub grace_days_camera: i64,
    /// Grace window in days for caregiver quota overruns.
    #[serde(default = "default_grace_days")]
    pub grace_days_caregiver: i64,
    /// Grace window in days for storage quota overruns.
    #[serde(default = "default_grace_days")]
    pub grace_days_storage: i64,
    /// Grace window in days for site quota overruns.
    #[serde(default = "default_grace_days")]
    pub grace_days_site: i64,
    /// Fallback camera quota when neither override nor plan defines one.
    #[serde(default = "default_fallback_cameras")]
    pub fallback_camera_quota: i64,
    /// Fallback caregiver seats.
    #[serde(default = "default_fallback_caregivers")]
    pub fallback_caregiver_seats: i64,
    /// Fallback storage quota in GB.
    #[serde(default = "default_fallback_storage_gb")]
    pub fallback_storage_gb: i64,
    /// Fallback site quota.
    #[serde(default = "default_fallback_sites")]
    pub fallback_sites: i64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            soft_cap_percent: default_soft_cap_percent(),
            grace_days_camera: default_grace_days(),
            grace_days_caregiver: default_grace_days(),
            grace_days_storage: default_grace_days(),
            grace_days_site: default_grace_days(),
            fallback_camera_quota: default_fallback_cameras(),
            fallback_caregiver_seats: default_fallback_caregivers(),
            fallback_storage_gb: default_fallback_storage_gb(),
            fallback_sites: default_fallback_sites(),
        }
    }
}

fn default_soft_cap_percent() -> u8 {
    80
}

fn default_grace_days() -> i64 {
    7
}

fn default_fallback_cameras() -> i64 {
    1
}

fn default_fallback_caregivers() -> i64 {
    1
}

fn default_fallback_storage_gb() -> i64 {
    5
}

fn default_fallback_sites() -> i64 {
    1
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("VIGIL").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_defaults() {
        let quota = QuotaConfig::default();
        assert_eq!(quota.soft_cap_percent, 80);
        assert_eq!(quota.grace_days_camera, 7);
        assert_eq!(quota.fallback_camera_quota, 1);
    }

    #[test]
    fn test_server_defaults() {
        assert_eq!(default_host(), "0.0.0.0");
        assert_eq!(default_port(), 8080);
    }
}
