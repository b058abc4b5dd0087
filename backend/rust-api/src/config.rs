use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    /// Base URL under which stored image answers are served.
    pub uploads_base_url: String,
    pub security: SecurityConfig,
}

/// Anti-abuse knobs for a deployment. Passed explicitly into the gate and
/// the public security-config endpoint; components never read these from
/// ambient state, which keeps them independently testable.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub turnstile_enabled: bool,
    pub turnstile_secret_key: String,
    pub time_check_enabled: bool,
    /// Submissions filled faster than this are treated as automated. Never
    /// exposed through any public surface.
    pub min_fill_seconds: u32,
    pub rate_limit_enabled: bool,
    pub max_submissions_per_day: u32,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", env)).required(false), // Allow missing config file, fallback to ENV
            )
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017/surveygate".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "surveygate".to_string());

        let jwt_secret = settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: JWT_SECRET must be set in production!");
                }
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            });

        let uploads_base_url = settings
            .get_string("uploads.base_url")
            .or_else(|_| env::var("UPLOADS_BASE_URL"))
            .unwrap_or_else(|_| "/uploads".to_string());

        let security = SecurityConfig {
            turnstile_enabled: settings
                .get_bool("security.turnstile_enabled")
                .ok()
                .or_else(|| env_flag("TURNSTILE_ENABLED"))
                .unwrap_or(false),
            turnstile_secret_key: settings
                .get_string("security.turnstile_secret_key")
                .or_else(|_| env::var("TURNSTILE_SECRET_KEY"))
                .unwrap_or_default(),
            time_check_enabled: settings
                .get_bool("security.time_check_enabled")
                .ok()
                .or_else(|| env_flag("TIME_CHECK_ENABLED"))
                .unwrap_or(true),
            min_fill_seconds: settings
                .get_int("security.min_fill_seconds")
                .ok()
                .map(|v| v as u32)
                .or_else(|| env_u32("MIN_FILL_SECONDS"))
                .unwrap_or(10),
            rate_limit_enabled: settings
                .get_bool("security.rate_limit_enabled")
                .ok()
                .or_else(|| env_flag("RATE_LIMIT_ENABLED"))
                .unwrap_or(true),
            max_submissions_per_day: settings
                .get_int("security.max_submissions_per_day")
                .ok()
                .map(|v| v as u32)
                .or_else(|| env_u32("MAX_SUBMISSIONS_PER_DAY"))
                .unwrap_or(2),
        };

        Ok(Config {
            bind_addr,
            mongo_uri,
            redis_uri,
            mongo_database,
            jwt_secret,
            uploads_base_url,
            security,
        })
    }
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key).ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn env_u32(key: &str) -> Option<u32> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
