use chirper_common::{
    hashing::HashCost,
    password::{DEFAULT_MAX_SIMILARITY, DEFAULT_MIN_LENGTH, MAX_SIMILARITY_RANGE, PasswordPolicy},
    snowflake::{ProcessId, WorkerId},
    util::PositiveDuration,
};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;
use tracing::debug;

const TWO_WEEKS_SECONDS: u32 = 60 * 60 * 24 * 14;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("PASSWORD_MAX_SIMILARITY must be between 0.1 and 1.0, got {0}")]
    PasswordMaxSimilarity(f64),
}

/// Process configuration, read from the environment and an optional `.env`.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Env {
    pub server_address: IpAddr,
    pub server_port: u16,
    /// Unset selects the in-memory store.
    pub database_url: Option<String>,
    #[serde(default)]
    pub worker_id: WorkerId,
    #[serde(default)]
    pub process_id: ProcessId,
    #[serde(default = "default_post_max_length")]
    pub post_max_length: usize,
    #[serde(default = "default_password_min_length")]
    pub password_min_length: usize,
    #[serde(default = "default_password_max_similarity")]
    pub password_max_similarity: f64,
    /// Zero disables expiry.
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u32,
    #[serde(default = "default_login_redirect_url")]
    pub login_redirect_url: String,
    #[serde(default = "default_logout_redirect_url")]
    pub logout_redirect_url: String,
    #[serde(default)]
    pub argon2_memory_kib: Option<u32>,
    #[serde(default)]
    pub argon2_iterations: Option<u32>,
    #[serde(default)]
    pub argon2_parallelism: Option<u32>,
}

fn default_post_max_length() -> usize {
    280
}

fn default_password_min_length() -> usize {
    DEFAULT_MIN_LENGTH
}

fn default_password_max_similarity() -> f64 {
    DEFAULT_MAX_SIMILARITY
}

fn default_session_ttl_seconds() -> u32 {
    TWO_WEEKS_SECONDS
}

fn default_login_redirect_url() -> String {
    "/tweets/home/".to_owned()
}

fn default_logout_redirect_url() -> String {
    "/accounts/login/".to_owned()
}

/// Behavioural knobs shared by the request handlers.
#[derive(Clone, PartialEq, Debug)]
pub struct Settings {
    pub post_max_length: usize,
    pub password_policy: PasswordPolicy,
    pub session_ttl: Option<PositiveDuration>,
    pub login_redirect_url: String,
    pub logout_redirect_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            post_max_length: default_post_max_length(),
            password_policy: PasswordPolicy::default(),
            session_ttl: PositiveDuration::from_seconds(TWO_WEEKS_SECONDS),
            login_redirect_url: default_login_redirect_url(),
            logout_redirect_url: default_logout_redirect_url(),
        }
    }
}

impl Env {
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if e.not_found() {
                debug!("No .env file found");
            } else {
                return Err(e.into());
            }
        }

        Ok(envy::from_env()?)
    }

    #[must_use]
    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.server_address, self.server_port)
    }

    pub fn settings(&self) -> Result<Settings, ConfigError> {
        if !MAX_SIMILARITY_RANGE.contains(&self.password_max_similarity) {
            return Err(ConfigError::PasswordMaxSimilarity(
                self.password_max_similarity,
            ));
        }

        Ok(Settings {
            post_max_length: self.post_max_length,
            password_policy: PasswordPolicy {
                min_length: self.password_min_length,
                max_similarity: self.password_max_similarity,
            },
            session_ttl: PositiveDuration::from_seconds(self.session_ttl_seconds),
            login_redirect_url: self.login_redirect_url.clone(),
            logout_redirect_url: self.logout_redirect_url.clone(),
        })
    }

    #[must_use]
    pub fn hash_cost(&self) -> HashCost {
        let default = HashCost::default();
        HashCost {
            memory_kib: self.argon2_memory_kib.unwrap_or(default.memory_kib),
            iterations: self.argon2_iterations.unwrap_or(default.iterations),
            parallelism: self.argon2_parallelism.unwrap_or(default.parallelism),
        }
    }
}
