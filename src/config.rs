use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expires_in: i64, // seconds
}

/// External payment gateway (Mercado Pago style) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Platform account credential, used when a restaurant has no
    /// delegated credential of its own.
    pub access_token: String,
    /// OAuth application credentials for the merchant-delegation flow.
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Redirect URI registered with the gateway for the OAuth exchange.
    #[serde(default)]
    pub oauth_redirect_uri: String,
    /// Publicly reachable URL the gateway posts webhook notifications to.
    pub notification_url: String,
    /// Base URL of the gateway API, overridable for tests/sandboxes.
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,
    /// Platform commission in percent, charged only on delegated payments.
    #[serde(default = "default_commission_percent")]
    pub commission_percent: u32,
    /// Timeout for every gateway call, in seconds.
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

fn default_gateway_base_url() -> String {
    "https://api.mercadopago.com".to_string()
}

fn default_commission_percent() -> u32 {
    10
}

fn default_gateway_timeout() -> u64 {
    10
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // Missing file is fine; the deployment can be env-only.
        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => {
                toml::from_str(&config_str).map_err(|e| format!("Failed to parse {config_path}: {e}"))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let database_url = env::var("DATABASE_URL")
                    .map_err(|_| "DATABASE_URL is required when no config.toml is present")?;

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    jwt: JwtConfig {
                        secret: get_env("JWT_SECRET")
                            .unwrap_or_else(|| "change-me-in-production".to_string()),
                        access_token_expires_in: get_env_parse("JWT_ACCESS_EXPIRES_IN", 7200i64),
                    },
                    gateway: GatewayConfig {
                        access_token: get_env("GATEWAY_ACCESS_TOKEN").unwrap_or_default(),
                        client_id: get_env("GATEWAY_CLIENT_ID").unwrap_or_default(),
                        client_secret: get_env("GATEWAY_CLIENT_SECRET").unwrap_or_default(),
                        oauth_redirect_uri: get_env("GATEWAY_OAUTH_REDIRECT_URI")
                            .unwrap_or_default(),
                        notification_url: get_env("GATEWAY_NOTIFICATION_URL")
                            .unwrap_or_default(),
                        base_url: get_env("GATEWAY_BASE_URL")
                            .unwrap_or_else(default_gateway_base_url),
                        commission_percent: get_env_parse(
                            "GATEWAY_COMMISSION_PERCENT",
                            default_commission_percent(),
                        ),
                        timeout_secs: get_env_parse(
                            "GATEWAY_TIMEOUT_SECS",
                            default_gateway_timeout(),
                        ),
                    },
                }
            }
            Err(e) => {
                return Err(format!("Failed to read config file {config_path}: {e}").into());
            }
        };

        // Environment variables win even when a file is present.
        if let Ok(v) = env::var("SERVER_HOST") {
            config.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT") {
            if let Ok(p) = v.parse() {
                config.server.port = p;
            }
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            config.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS") {
            if let Ok(mc) = v.parse() {
                config.database.max_connections = mc;
            }
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            config.jwt.secret = v;
        }
        if let Ok(v) = env::var("JWT_ACCESS_EXPIRES_IN") {
            if let Ok(n) = v.parse() {
                config.jwt.access_token_expires_in = n;
            }
        }
        if let Ok(v) = env::var("GATEWAY_ACCESS_TOKEN") {
            config.gateway.access_token = v;
        }
        if let Ok(v) = env::var("GATEWAY_CLIENT_ID") {
            config.gateway.client_id = v;
        }
        if let Ok(v) = env::var("GATEWAY_CLIENT_SECRET") {
            config.gateway.client_secret = v;
        }
        if let Ok(v) = env::var("GATEWAY_OAUTH_REDIRECT_URI") {
            config.gateway.oauth_redirect_uri = v;
        }
        if let Ok(v) = env::var("GATEWAY_NOTIFICATION_URL") {
            config.gateway.notification_url = v;
        }
        if let Ok(v) = env::var("GATEWAY_BASE_URL") {
            config.gateway.base_url = v;
        }
        if let Ok(v) = env::var("GATEWAY_COMMISSION_PERCENT") {
            if let Ok(n) = v.parse() {
                config.gateway.commission_percent = n;
            }
        }
        if let Ok(v) = env::var("GATEWAY_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                config.gateway.timeout_secs = n;
            }
        }

        Ok(config)
    }
}

fn get_env(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
