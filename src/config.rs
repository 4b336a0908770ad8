use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub application: ApplicationConfig,
    #[serde(default)]
    pub billing: BillingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_expiration_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationConfig {
    /// Public base URL of this API
    pub base_url: String,
    /// Base URL of the web client, used for checkout redirects and profile links
    pub client_url: String,
}

/// Payment provider credentials. Each section is optional: a deployment may
/// run with one provider, both, or neither. Endpoints of an unconfigured
/// provider fail closed with a server error instead of silently no-opping.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillingConfig {
    #[serde(default)]
    pub stripe: Option<StripeConfig>,
    #[serde(default)]
    pub razorpay: Option<RazorpayConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub monthly_price_id: String,
    pub yearly_price_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    /// Plan prices in paise
    pub monthly_amount_minor: i64,
    pub yearly_amount_minor: i64,
    pub currency: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for environment variable overrides)
        dotenvy::dotenv().ok();

        // Build config from config.yml (required) with environment variable overrides
        let config = config::Config::builder()
            // Load config.yml (REQUIRED)
            .add_source(config::File::with_name("config").required(true))
            // Allow environment variables to override config file
            .add_source(
                config::Environment::with_prefix("BACKFOLIO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
