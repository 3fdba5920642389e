use std::env;
use std::net::SocketAddr;

#[derive(Clone)]
pub struct Config {
    // Token signing
    pub jwt_secret: String,

    // Redis
    pub redis_url: String,

    // Server
    pub bind_addr: SocketAddr,

    // Challenge composition
    pub auth_domain: String,
    pub auth_uri: String,
    pub chain_id: u64,

    // TTLs / durations
    pub challenge_ttl_secs: u64,
    pub session_default_minutes: u64,
    pub session_max_minutes: u64,

    // Rate limiting
    pub rate_limit_window_secs: u64,
    pub rate_limit_max: u32,

    // CORS
    pub cors_allowed_origins: Vec<String>,

    // Proxy
    pub trusted_proxy_count: usize,

    // Background login writer
    pub login_queue_capacity: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("jwt_secret", &"[REDACTED]")
            .field("redis_url", &"[REDACTED]")
            .field("bind_addr", &self.bind_addr)
            .field("auth_domain", &self.auth_domain)
            .field("auth_uri", &self.auth_uri)
            .field("chain_id", &self.chain_id)
            .field("challenge_ttl_secs", &self.challenge_ttl_secs)
            .field("session_default_minutes", &self.session_default_minutes)
            .field("session_max_minutes", &self.session_max_minutes)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("rate_limit_max", &self.rate_limit_max)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("trusted_proxy_count", &self.trusted_proxy_count)
            .field("login_queue_capacity", &self.login_queue_capacity)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        // (env vars may be set directly in production)
        let _ = dotenvy::dotenv();

        // Token signing secret is required; an empty or short secret makes
        // forged tokens feasible.
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| ConfigError::MissingVar("JWT_SECRET".to_string()))?;
        if jwt_secret.len() < 32 {
            return Err(ConfigError::InvalidValue(
                "JWT_SECRET".to_string(),
                "must be at least 32 bytes".to_string(),
            ));
        }

        // Redis — required to prevent silent unauthenticated connections
        let redis_url =
            env::var("REDIS_URL").map_err(|_| ConfigError::MissingVar("REDIS_URL".to_string()))?;

        // Server
        let bind_addr_str = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;

        // Challenge composition
        let auth_domain = env::var("AUTH_DOMAIN").unwrap_or_else(|_| "localhost:5173".to_string());
        let auth_uri =
            env::var("AUTH_URI").unwrap_or_else(|_| "http://localhost:5173".to_string());
        let chain_id = parse_env_or_default("CHAIN_ID", 1)?;

        // TTLs / durations
        let challenge_ttl_secs = parse_env_or_default("CHALLENGE_TTL_SECS", 300)?;
        let session_default_minutes = parse_env_or_default("SESSION_DEFAULT_MINUTES", 60)?;
        let session_max_minutes = parse_env_or_default("SESSION_MAX_MINUTES", 10_080)?;

        if session_default_minutes == 0 || session_default_minutes > session_max_minutes {
            return Err(ConfigError::InvalidValue(
                "SESSION_DEFAULT_MINUTES".to_string(),
                format!("must be in 1..={}", session_max_minutes),
            ));
        }

        // Rate limiting
        let rate_limit_window_secs = parse_env_or_default("RATE_LIMIT_WINDOW_SECS", 900)?;
        let rate_limit_max = parse_env_or_default("RATE_LIMIT_MAX", 100)?;

        // CORS
        let cors_origins_str = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());
        let cors_allowed_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Proxy configuration
        let trusted_proxy_count = parse_env_or_default("TRUSTED_PROXY_COUNT", 0)?;

        // Background login writer
        let login_queue_capacity = parse_env_or_default("LOGIN_QUEUE_CAPACITY", 1024)?;

        Ok(Config {
            jwt_secret,
            redis_url,
            bind_addr,
            auth_domain,
            auth_uri,
            chain_id,
            challenge_ttl_secs,
            session_default_minutes,
            session_max_minutes,
            rate_limit_window_secs,
            rate_limit_max,
            cors_allowed_origins,
            trusted_proxy_count,
            login_queue_capacity,
        })
    }
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Use a mutex to ensure tests run serially since they modify global env vars.
    // unwrap_or_else handles poison from prior panics.
    static TEST_MUTEX: Mutex<()> = Mutex::new(());

    fn lock_test() -> std::sync::MutexGuard<'static, ()> {
        TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    const TEST_SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn clear_test_env() {
        env::remove_var("JWT_SECRET");
        env::remove_var("REDIS_URL");
        env::remove_var("BIND_ADDR");
        env::remove_var("AUTH_DOMAIN");
        env::remove_var("AUTH_URI");
        env::remove_var("CHAIN_ID");
        env::remove_var("CHALLENGE_TTL_SECS");
        env::remove_var("SESSION_DEFAULT_MINUTES");
        env::remove_var("SESSION_MAX_MINUTES");
        env::remove_var("RATE_LIMIT_WINDOW_SECS");
        env::remove_var("RATE_LIMIT_MAX");
        env::remove_var("CORS_ALLOWED_ORIGINS");
        env::remove_var("TRUSTED_PROXY_COUNT");
        env::remove_var("LOGIN_QUEUE_CAPACITY");
    }

    #[test]
    fn test_parse_env_or_default() {
        let _guard = lock_test();

        env::set_var("TEST_U64", "12345");
        let result: Result<u64, ConfigError> = parse_env_or_default("TEST_U64", 100);
        assert_eq!(result.unwrap(), 12345);

        env::remove_var("TEST_U64");
        let result: Result<u64, ConfigError> = parse_env_or_default("TEST_U64", 100);
        assert_eq!(result.unwrap(), 100);
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let _guard = lock_test();
        clear_test_env();

        env::set_var("JWT_SECRET", "too-short");
        env::set_var("REDIS_URL", "redis://127.0.0.1:6379");

        let result = Config::from_env();
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue(ref s, _) if s == "JWT_SECRET"
        ));

        clear_test_env();
    }

    #[test]
    fn test_invalid_socket_addr() {
        let _guard = lock_test();
        clear_test_env();

        env::set_var("JWT_SECRET", TEST_SECRET);
        env::set_var("REDIS_URL", "redis://127.0.0.1:6379");
        env::set_var("BIND_ADDR", "invalid_address");

        let result = Config::from_env();
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_, _)));

        clear_test_env();
    }

    #[test]
    fn test_session_default_above_max_rejected() {
        let _guard = lock_test();
        clear_test_env();

        env::set_var("JWT_SECRET", TEST_SECRET);
        env::set_var("REDIS_URL", "redis://127.0.0.1:6379");
        env::set_var("SESSION_DEFAULT_MINUTES", "20000");
        env::set_var("SESSION_MAX_MINUTES", "10080");

        let result = Config::from_env();
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue(ref s, _) if s == "SESSION_DEFAULT_MINUTES"
        ));

        clear_test_env();
    }

    #[test]
    fn test_cors_origins_parsing() {
        let _guard = lock_test();
        clear_test_env();

        env::set_var("JWT_SECRET", TEST_SECRET);
        env::set_var("REDIS_URL", "redis://127.0.0.1:6379");
        env::set_var(
            "CORS_ALLOWED_ORIGINS",
            "http://localhost:5173, https://app.example.com ,",
        );

        let config = Config::from_env().unwrap();
        assert_eq!(
            config.cors_allowed_origins,
            vec!["http://localhost:5173", "https://app.example.com"]
        );

        clear_test_env();
    }

    #[test]
    fn test_config_defaults() {
        let _guard = lock_test();
        clear_test_env();

        env::set_var("JWT_SECRET", TEST_SECRET);
        env::set_var("REDIS_URL", "redis://127.0.0.1:6379");
        env::set_var("BIND_ADDR", "0.0.0.0:8080");

        let config = Config::from_env().unwrap();

        assert_eq!(config.jwt_secret, TEST_SECRET);
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.auth_domain, "localhost:5173");
        assert_eq!(config.auth_uri, "http://localhost:5173");
        assert_eq!(config.chain_id, 1);
        assert_eq!(config.challenge_ttl_secs, 300);
        assert_eq!(config.session_default_minutes, 60);
        assert_eq!(config.session_max_minutes, 10_080);
        assert_eq!(config.rate_limit_window_secs, 900);
        assert_eq!(config.rate_limit_max, 100);
        assert_eq!(config.trusted_proxy_count, 0);
        assert_eq!(config.login_queue_capacity, 1024);

        clear_test_env();
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let _guard = lock_test();
        clear_test_env();

        env::set_var("JWT_SECRET", TEST_SECRET);
        env::set_var("REDIS_URL", "redis://:password@10.0.0.5:6379");

        let config = Config::from_env().unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains(TEST_SECRET));
        assert!(!debug.contains("password"));
        assert!(debug.contains("[REDACTED]"));

        clear_test_env();
    }
}
