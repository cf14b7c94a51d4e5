// src/config.rs

use std::env;

use dotenvy::dotenv;

/// Per-question time limit in seconds when `QUESTION_TIME_LIMIT` is unset.
pub const DEFAULT_QUESTION_TIME_LIMIT: u32 = 60;

/// Questions drawn for a practice attempt when `PRACTICE_QUESTION_COUNT` is unset.
pub const DEFAULT_PRACTICE_QUESTION_COUNT: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub port: u16,
    /// `0` disables the per-question timer.
    pub question_time_limit: u32,
    pub practice_question_count: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration: parse_or("JWT_EXPIRATION", 86_400),
            rust_log,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            port: parse_or("PORT", 3000),
            question_time_limit: parse_or("QUESTION_TIME_LIMIT", DEFAULT_QUESTION_TIME_LIMIT),
            practice_question_count: parse_or(
                "PRACTICE_QUESTION_COUNT",
                DEFAULT_PRACTICE_QUESTION_COUNT,
            ),
        }
    }

    /// Per-question limit as the engine expects it.
    pub fn question_limit(&self) -> Option<u32> {
        (self.question_time_limit > 0).then_some(self.question_time_limit)
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
