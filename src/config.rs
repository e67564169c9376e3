use std::sync::LazyLock;

use crate::util::{get_env, get_env_bool};

/// Process-wide configuration, read once from the environment at startup.
///
/// Unlike the admin-editable, file-persisted configuration this crate's
/// teacher carries, there is no runtime mutation surface here: the auth core
/// has no admin config UI, so every value below is fixed for the life of the
/// process. See the design ledger for the rationale.
pub static CONFIG: LazyLock<Config> = LazyLock::new(Config::load);

pub struct Config {
    database_url: String,
    database_max_conns: u32,
    database_min_conns: u32,
    database_timeout: u64,
    database_idle_timeout: u64,

    redis_url: String,

    domain_origin: String,

    /// Symmetric secret used to sign and verify bearer tokens (HS256).
    token_secret: String,
    access_token_ttl_secs: i64,
    refresh_token_ttl_secs: i64,

    otp_code_length: u32,
    otp_code_lifetime_secs: i64,
    otp_sms_cooldown_secs: i64,
    otp_sms_limit: i64,
    otp_sms_limit_window_secs: i64,
    otp_revoke_old: bool,

    cache_ttl_secs: u64,

    bcrypt_cost: u32,

    ip_header: String,
    ip_header_enabled: bool,

    auth_ratelimit_seconds: u64,
    auth_ratelimit_max_burst: u32,
}

impl Config {
    fn load() -> Self {
        dotenvy::dotenv().ok();

        let token_secret = get_env::<String>("TOKEN_SECRET").unwrap_or_else(|| {
            eprintln!("[ERROR] TOKEN_SECRET must be set to a long, random value.");
            std::process::exit(1);
        });
        if token_secret.len() < 32 {
            eprintln!("[ERROR] TOKEN_SECRET must be at least 32 bytes long.");
            std::process::exit(1);
        }

        Config {
            database_url: get_env("DATABASE_URL").unwrap_or_else(|| "postgres://localhost/loyalty_auth".to_string()),
            database_max_conns: get_env("DATABASE_MAX_CONNS").unwrap_or(10),
            database_min_conns: get_env("DATABASE_MIN_CONNS").unwrap_or(1),
            database_timeout: get_env("DATABASE_TIMEOUT").unwrap_or(30),
            database_idle_timeout: get_env("DATABASE_IDLE_TIMEOUT").unwrap_or(600),

            redis_url: get_env("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),

            domain_origin: get_env("DOMAIN_ORIGIN").unwrap_or_else(|| "https://localhost".to_string()),

            token_secret,
            access_token_ttl_secs: get_env("ACCESS_TOKEN_TTL_SECS").unwrap_or(7 * 24 * 3600),
            refresh_token_ttl_secs: get_env("REFRESH_TOKEN_TTL_SECS").unwrap_or(14 * 24 * 3600),

            otp_code_length: get_env("OTP_CODE_LENGTH").unwrap_or(6),
            otp_code_lifetime_secs: get_env("OTP_CODE_LIFETIME_SECS").unwrap_or(5 * 60),
            otp_sms_cooldown_secs: get_env("OTP_SMS_COOLDOWN_SECS").unwrap_or(30),
            otp_sms_limit: get_env("OTP_SMS_LIMIT").unwrap_or(10),
            otp_sms_limit_window_secs: get_env("OTP_SMS_LIMIT_WINDOW_SECS").unwrap_or(3 * 3600),
            otp_revoke_old: get_env_bool("OTP_REVOKE_OLD").unwrap_or(true),

            cache_ttl_secs: get_env("CACHE_TTL_SECS").unwrap_or(3600),

            bcrypt_cost: get_env("BCRYPT_COST").unwrap_or(bcrypt::DEFAULT_COST),

            ip_header: get_env("IP_HEADER").unwrap_or_else(|| "X-Real-IP".to_string()),
            ip_header_enabled: get_env_bool("IP_HEADER_ENABLED").unwrap_or(true),

            auth_ratelimit_seconds: get_env("AUTH_RATELIMIT_SECONDS").unwrap_or(60),
            auth_ratelimit_max_burst: get_env("AUTH_RATELIMIT_MAX_BURST").unwrap_or(15),
        }
    }

    pub fn database_url(&self) -> String {
        self.database_url.clone()
    }

    pub fn database_max_conns(&self) -> u32 {
        self.database_max_conns
    }

    pub fn database_min_conns(&self) -> u32 {
        self.database_min_conns
    }

    pub fn database_timeout(&self) -> u64 {
        self.database_timeout
    }

    pub fn database_idle_timeout(&self) -> u64 {
        self.database_idle_timeout
    }

    pub fn redis_url(&self) -> String {
        self.redis_url.clone()
    }

    pub fn domain_origin(&self) -> String {
        self.domain_origin.clone()
    }

    pub fn token_secret(&self) -> &str {
        &self.token_secret
    }

    pub fn access_token_ttl_secs(&self) -> i64 {
        self.access_token_ttl_secs
    }

    pub fn refresh_token_ttl_secs(&self) -> i64 {
        self.refresh_token_ttl_secs
    }

    pub fn otp_code_length(&self) -> u32 {
        self.otp_code_length
    }

    pub fn otp_code_lifetime_secs(&self) -> i64 {
        self.otp_code_lifetime_secs
    }

    pub fn otp_sms_cooldown_secs(&self) -> i64 {
        self.otp_sms_cooldown_secs
    }

    pub fn otp_sms_limit(&self) -> i64 {
        self.otp_sms_limit
    }

    pub fn otp_sms_limit_window_secs(&self) -> i64 {
        self.otp_sms_limit_window_secs
    }

    pub fn otp_revoke_old(&self) -> bool {
        self.otp_revoke_old
    }

    pub fn cache_ttl_secs(&self) -> u64 {
        self.cache_ttl_secs
    }

    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }

    pub fn ip_header(&self) -> &str {
        &self.ip_header
    }

    pub fn ip_header_enabled(&self) -> bool {
        self.ip_header_enabled
    }

    pub fn auth_ratelimit_seconds(&self) -> u64 {
        self.auth_ratelimit_seconds
    }

    pub fn auth_ratelimit_max_burst(&self) -> u32 {
        self.auth_ratelimit_max_burst
    }
}
