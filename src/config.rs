use jiff::SignedDuration;
use serde::Deserialize;

/// Service configuration, loaded from a TOML file.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub otp: OtpConfig,

    pub smtp: SmtpConfig,

    pub identity: IdentityConfig,
}

/// Lifecycle parameters for challenges and verification tickets.
#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    /// How long an issued code stays valid.
    #[serde(default = "default_code_ttl")]
    pub code_ttl: SignedDuration,

    /// How long a solved challenge authorizes a privileged action.
    #[serde(default = "default_ticket_ttl")]
    pub ticket_ttl: SignedDuration,

    /// Failed submissions allowed before the challenge is evicted.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_ttl: default_code_ttl(),
            ticket_ttl: default_ticket_ttl(),
            max_attempts: default_max_attempts(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_code_ttl() -> SignedDuration {
    SignedDuration::from_mins(5)
}

fn default_ticket_ttl() -> SignedDuration {
    SignedDuration::from_mins(5)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_sweep_interval_secs() -> u64 {
    300
}

/// Outbound email transport settings.
#[derive(Debug, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: String,

    /// Display name used in the From header and email templates.
    #[serde(default = "default_platform_name")]
    pub platform_name: String,
}

fn default_platform_name() -> String {
    "Postern".to_owned()
}

/// Identity provider used for credential updates after a verified reset.
#[derive(Debug, Deserialize)]
pub struct IdentityConfig {
    pub base_url: String,
    pub api_key: String,
}

pub fn load(path: &str) -> color_eyre::Result<Config> {
    use color_eyre::eyre::Context;

    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config file: {path}"))?;

    toml::from_str(&content).wrap_err_with(|| format!("failed to parse config file: {path}"))
}
