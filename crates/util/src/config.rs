use std::{env, fmt, net::SocketAddr};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://hris.db?mode=rwc";
pub const DEFAULT_PASS_SUFFIX_DIGITS: u32 = 4;
pub const DEFAULT_PASS_MAX_ATTEMPTS: u32 = 64;
pub const DEFAULT_NOTIFY_BUFFER: usize = 256;
const MIN_TOKEN_SECRET_LEN: usize = 16;

// Only used outside production when ACTOR_TOKEN_SECRET_HEX is unset.
const DEVELOPMENT_TOKEN_SECRET: &[u8] = b"hris-development-actor-token-key";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub token_secret: Vec<u8>,
    pub pass_suffix_digits: u32,
    pub pass_max_attempts: u32,
    pub notify_buffer: usize,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("environment", &self.environment)
            .field("database_url", &self.database_url)
            .field("token_secret", &"<redacted>")
            .field("pass_suffix_digits", &self.pass_suffix_digits)
            .field("pass_max_attempts", &self.pass_max_attempts)
            .field("notify_buffer", &self.notify_buffer)
            .finish()
    }
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_str(&env_or("APP_ENV", "development"))?;
        let bind_addr = env_or("APP_BIND_ADDR", DEFAULT_BIND_ADDR)
            .trim()
            .parse::<SocketAddr>()
            .map_err(ConfigError::BindAddress)?;
        let database_url = env_or("DATABASE_URL", DEFAULT_DATABASE_URL);
        let token_secret = token_secret(environment)?;

        let pass_suffix_digits = parse_number("PASS_SUFFIX_DIGITS", DEFAULT_PASS_SUFFIX_DIGITS)?;
        if !(1..=9).contains(&pass_suffix_digits) {
            return Err(ConfigError::OutOfRange {
                key: "PASS_SUFFIX_DIGITS",
                value: pass_suffix_digits.to_string(),
            });
        }
        let pass_max_attempts = parse_number("PASS_MAX_ATTEMPTS", DEFAULT_PASS_MAX_ATTEMPTS)?;
        if pass_max_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                key: "PASS_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }
        let notify_buffer = parse_number("NOTIFY_BUFFER", DEFAULT_NOTIFY_BUFFER)?;
        if notify_buffer == 0 {
            return Err(ConfigError::OutOfRange {
                key: "NOTIFY_BUFFER",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            token_secret,
            pass_suffix_digits,
            pass_max_attempts,
            notify_buffer,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn token_secret(environment: Environment) -> Result<Vec<u8>, ConfigError> {
    let raw = match env::var("ACTOR_TOKEN_SECRET_HEX") {
        Ok(value) if !value.trim().is_empty() => value,
        _ if environment == Environment::Production => {
            return Err(ConfigError::MissingVar("ACTOR_TOKEN_SECRET_HEX"))
        }
        _ => return Ok(DEVELOPMENT_TOKEN_SECRET.to_vec()),
    };
    let secret = hex::decode(raw.trim()).map_err(ConfigError::TokenSecret)?;
    if secret.len() < MIN_TOKEN_SECRET_LEN {
        return Err(ConfigError::TokenSecretTooShort(secret.len()));
    }
    Ok(secret)
}

fn parse_number<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        Err(_) => Ok(default),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    MissingVar(&'static str),
    TokenSecret(hex::FromHexError),
    TokenSecretTooShort(usize),
    InvalidNumber { key: &'static str, value: String },
    OutOfRange { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::MissingVar(key) => write!(f, "{key} must be set in production"),
            Self::TokenSecret(err) => write!(f, "ACTOR_TOKEN_SECRET_HEX is not valid hex: {err}"),
            Self::TokenSecretTooShort(len) => write!(
                f,
                "ACTOR_TOKEN_SECRET_HEX must decode to at least {MIN_TOKEN_SECRET_LEN} bytes (got {len})"
            ),
            Self::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative integer (got {value})")
            }
            Self::OutOfRange { key, value } => write!(f, "{key} is out of range (got {value})"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::BindAddress(err) => Some(err),
            Self::TokenSecret(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{LazyLock, Mutex};

    /// Serializes tests that mutate process environment variables.
    static ENV_GUARD: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    const KEYS: [&str; 7] = [
        "APP_ENV",
        "APP_BIND_ADDR",
        "DATABASE_URL",
        "ACTOR_TOKEN_SECRET_HEX",
        "PASS_SUFFIX_DIGITS",
        "PASS_MAX_ATTEMPTS",
        "NOTIFY_BUFFER",
    ];

    fn clear_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_in_development() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();

        let config = AppConfig::from_env().expect("config should load with defaults");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.token_secret, DEVELOPMENT_TOKEN_SECRET);
        assert_eq!(config.pass_suffix_digits, 4);
        assert_eq!(config.pass_max_attempts, 64);
        assert_eq!(config.notify_buffer, 256);
    }

    #[test]
    fn rejects_invalid_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "invalid");

        let err = AppConfig::from_env().expect_err("invalid env should error");
        assert!(matches!(err, ConfigError::InvalidEnvironment(value) if value == "invalid"));

        clear_env();
    }

    #[test]
    fn production_requires_token_secret() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "production");
        env::set_var("APP_BIND_ADDR", "0.0.0.0:9000");

        let err = AppConfig::from_env().expect_err("secret is mandatory");
        assert!(matches!(err, ConfigError::MissingVar("ACTOR_TOKEN_SECRET_HEX")));

        env::set_var("ACTOR_TOKEN_SECRET_HEX", "00112233445566778899aabbccddeeff");
        let config = AppConfig::from_env().expect("config should load");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.token_secret.len(), 16);
        assert!(!format!("{config:?}").contains("00112233"));

        clear_env();
    }

    #[test]
    fn rejects_malformed_token_secret() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();

        env::set_var("ACTOR_TOKEN_SECRET_HEX", "not-hex");
        let err = AppConfig::from_env().expect_err("bad hex");
        assert!(matches!(err, ConfigError::TokenSecret(_)));

        env::set_var("ACTOR_TOKEN_SECRET_HEX", "abcd");
        let err = AppConfig::from_env().expect_err("short secret");
        assert!(matches!(err, ConfigError::TokenSecretTooShort(2)));

        clear_env();
    }

    #[test]
    fn validates_pass_settings() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();

        env::set_var("PASS_SUFFIX_DIGITS", "6");
        env::set_var("PASS_MAX_ATTEMPTS", "10");
        let config = AppConfig::from_env().expect("config should load");
        assert_eq!(config.pass_suffix_digits, 6);
        assert_eq!(config.pass_max_attempts, 10);

        env::set_var("PASS_SUFFIX_DIGITS", "12");
        let err = AppConfig::from_env().expect_err("too many digits");
        assert!(matches!(err, ConfigError::OutOfRange { key: "PASS_SUFFIX_DIGITS", .. }));

        env::set_var("PASS_SUFFIX_DIGITS", "four");
        let err = AppConfig::from_env().expect_err("not a number");
        assert!(matches!(err, ConfigError::InvalidNumber { key: "PASS_SUFFIX_DIGITS", .. }));

        clear_env();
    }

    #[test]
    fn rejects_unparseable_bind_address() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();

        env::set_var("APP_BIND_ADDR", " 0.0.0.0:9100 ");
        let config = AppConfig::from_env().expect("padded address should parse");
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9100");

        env::set_var("APP_BIND_ADDR", "localhost");
        let err = AppConfig::from_env().expect_err("missing port");
        assert!(matches!(err, ConfigError::BindAddress(_)));

        clear_env();
    }
}
