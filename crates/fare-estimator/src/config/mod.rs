use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::fares::ensemble::{BoosterConfig, CombinationRule, EnsembleConfig};

const DEFAULT_BUNDLE_PATH: &str = "models/fare-bundle.json";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub model: ModelConfig,
    pub training: TrainingSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let bundle_path = env::var("FARE_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_BUNDLE_PATH));

        let training = TrainingSettings::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            model: ModelConfig { bundle_path },
            training,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Location of the persisted model bundle.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub bundle_path: PathBuf,
}

/// Ensemble shape used by the offline trainer.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSettings {
    pub members: usize,
    pub weights: Option<Vec<f64>>,
    pub trees_per_member: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub seed: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            members: 5,
            weights: None,
            trees_per_member: 120,
            learning_rate: 0.1,
            max_depth: 5,
            seed: 42,
        }
    }
}

impl TrainingSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let weights = match env::var("FARE_ENSEMBLE_WEIGHTS") {
            Ok(raw) if !raw.trim().is_empty() => Some(parse_weights(&raw)?),
            _ => None,
        };

        Ok(Self {
            members: parse_env("FARE_ENSEMBLE_MEMBERS", defaults.members)?,
            weights,
            trees_per_member: parse_env("FARE_TREES_PER_MEMBER", defaults.trees_per_member)?,
            learning_rate: parse_env("FARE_LEARNING_RATE", defaults.learning_rate)?,
            max_depth: parse_env("FARE_MAX_DEPTH", defaults.max_depth)?,
            seed: parse_env("FARE_SEED", defaults.seed)?,
        })
    }

    /// Translate the settings into the trainer's ensemble configuration.
    ///
    /// Explicit weights switch the combination rule to a weighted mean.
    pub fn ensemble_config(&self) -> EnsembleConfig {
        let combination = match &self.weights {
            Some(weights) => CombinationRule::WeightedMean {
                weights: weights.clone(),
            },
            None => CombinationRule::Mean,
        };

        EnsembleConfig {
            members: self.members,
            combination,
            booster: BoosterConfig {
                trees: self.trees_per_member,
                learning_rate: self.learning_rate,
                max_depth: self.max_depth,
                ..BoosterConfig::default()
            },
            seed: self.seed,
            ..EnsembleConfig::default()
        }
    }
}

fn parse_env<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_weights(raw: &str) -> Result<Vec<f64>, ConfigError> {
    raw.split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ConfigError::InvalidWeights {
            value: raw.to_string(),
        })
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str, value: String },
    InvalidWeights { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be numeric (found '{value}')")
            }
            ConfigError::InvalidWeights { value } => write!(
                f,
                "FARE_ENSEMBLE_WEIGHTS must be a comma separated list of numbers (found '{value}')"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidWeights { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "FARE_MODEL_PATH",
            "FARE_ENSEMBLE_MEMBERS",
            "FARE_ENSEMBLE_WEIGHTS",
            "FARE_TREES_PER_MEMBER",
            "FARE_LEARNING_RATE",
            "FARE_MAX_DEPTH",
            "FARE_SEED",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.model.bundle_path, PathBuf::from(DEFAULT_BUNDLE_PATH));
        assert_eq!(config.training, TrainingSettings::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn ensemble_weights_switch_to_weighted_mean() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("FARE_ENSEMBLE_MEMBERS", "3");
        env::set_var("FARE_ENSEMBLE_WEIGHTS", "0.5, 0.3,0.2");
        let config = AppConfig::load().expect("config loads");
        reset_env();

        let ensemble = config.training.ensemble_config();
        assert_eq!(ensemble.members, 3);
        assert_eq!(
            ensemble.combination,
            CombinationRule::WeightedMean {
                weights: vec![0.5, 0.3, 0.2]
            }
        );
    }

    #[test]
    fn rejects_non_numeric_training_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("FARE_LEARNING_RATE", "fast");
        let result = AppConfig::load();
        reset_env();

        match result {
            Err(ConfigError::InvalidNumber { key, .. }) => assert_eq!(key, "FARE_LEARNING_RATE"),
            other => panic!("expected invalid number error, got {other:?}"),
        }
    }
}
