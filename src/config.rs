//! Configuration management with validation and defaults
//!
//! Configuration is loaded once and passed explicitly into the components
//! that need it. The seed encryption key in particular is never read from
//! ambient process state by the core.

use crate::errors::{ConfigurationError, DiceResult};
use crate::types::{Amount, Currency};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Largest house edge accepted, in hundredths of a percent (50%)
const MAX_HOUSE_EDGE_BP: u16 = 5_000;

/// Top-level configuration for the betting core
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiceConfig {
    pub game: GameConfig,
    pub seeds: SeedConfig,
    pub accounts: AccountsConfig,
    pub monitoring: MonitoringConfig,
}

/// Dice game parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// House edge in hundredths of a percent (100 = 1%)
    pub house_edge_bp: u16,
    pub max_bets_per_batch: u32,
    /// Smallest accepted win chance, hundredths of a percent
    pub min_win_chance: u16,
    /// Largest accepted win chance, hundredths of a percent
    pub max_win_chance: u16,
    pub settlement_policy: SettlementPolicy,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            house_edge_bp: 100,
            max_bets_per_batch: 10_000,
            min_win_chance: 1,
            max_win_chance: 9_800,
            settlement_policy: SettlementPolicy::SettleAtEnd,
        }
    }
}

/// When batch outcomes become financially binding
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPolicy {
    /// One ledger settlement with the batch aggregate
    SettleAtEnd,
    /// Each bet is settled as soon as it is drawn
    SettleAsYouGo,
}

impl std::str::FromStr for SettlementPolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "settle_at_end" => Ok(SettlementPolicy::SettleAtEnd),
            "settle_as_you_go" => Ok(SettlementPolicy::SettleAsYouGo),
            other => Err(ConfigurationError::InvalidValue {
                field: "game.settlement_policy".to_string(),
                value: other.to_string(),
                reason: "expected settle_at_end or settle_as_you_go".to_string(),
            }),
        }
    }
}

/// Seed commitment and locking configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Hex-encoded 32-byte key protecting server seeds at rest
    pub encryption_key_hex: String,
    pub lock_timeout_ms: u64,
    /// Random bytes used for a freshly provisioned client seed
    pub default_client_seed_bytes: usize,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            encryption_key_hex: String::new(),
            lock_timeout_ms: 2_000,
            default_client_seed_bytes: 8,
        }
    }
}

impl SeedConfig {
    /// Decode the configured encryption key
    pub fn encryption_key(&self) -> Result<[u8; 32], ConfigurationError> {
        if self.encryption_key_hex.is_empty() {
            return Err(ConfigurationError::MissingRequired("seeds.encryption_key_hex".to_string()));
        }

        let bytes = hex::decode(&self.encryption_key_hex).map_err(|e| ConfigurationError::InvalidValue {
            field: "seeds.encryption_key_hex".to_string(),
            value: "<redacted>".to_string(),
            reason: format!("not valid hex: {}", e),
        })?;

        bytes.try_into().map_err(|b: Vec<u8>| ConfigurationError::InvalidValue {
            field: "seeds.encryption_key_hex".to_string(),
            value: "<redacted>".to_string(),
            reason: format!("expected 32 bytes, got {}", b.len()),
        })
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Account provisioning configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    /// Label of the house bankroll in logs
    pub house_owner: String,
    /// Balances credited to every newly opened player account, keyed by ticker
    pub welcome_balances: BTreeMap<String, Amount>,
    /// Opening house bankroll per ticker
    pub house_bankroll: BTreeMap<String, Amount>,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        let mut welcome_balances = BTreeMap::new();
        welcome_balances.insert(Currency::Play.ticker().to_string(), Amount::from_whole(100));
        let mut house_bankroll = BTreeMap::new();
        house_bankroll.insert(Currency::Play.ticker().to_string(), Amount::from_whole(1_000_000));
        Self {
            house_owner: "bankroll".to_string(),
            welcome_balances,
            house_bankroll,
        }
    }
}

impl AccountsConfig {
    /// Welcome balances with their tickers resolved
    pub fn resolved_welcome_balances(&self) -> DiceResult<Vec<(Currency, Amount)>> {
        resolve_tickers(&self.welcome_balances)
    }

    /// House bankroll with its tickers resolved
    pub fn resolved_house_bankroll(&self) -> DiceResult<Vec<(Currency, Amount)>> {
        resolve_tickers(&self.house_bankroll)
    }
}

fn resolve_tickers(balances: &BTreeMap<String, Amount>) -> DiceResult<Vec<(Currency, Amount)>> {
    balances
        .iter()
        .map(|(ticker, amount)| Ok((ticker.parse::<Currency>()?, *amount)))
        .collect()
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: LogLevel,
    pub log_format: LogFormat,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_format: LogFormat::Pretty,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(ConfigurationError::InvalidValue {
                field: "monitoring.log_level".to_string(),
                value: other.to_string(),
                reason: "unknown log level".to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl DiceConfig {
    /// Local development: random seed key, verbose logs
    pub fn development() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);

        Self {
            seeds: SeedConfig {
                encryption_key_hex: hex::encode(key),
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Debug,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Production defaults. The encryption key must still be supplied.
    pub fn production() -> Self {
        Self {
            game: GameConfig {
                settlement_policy: SettlementPolicy::SettleAtEnd,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Info,
                log_format: LogFormat::Json,
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.game.house_edge_bp == 0 || self.game.house_edge_bp > MAX_HOUSE_EDGE_BP {
            return Err(ConfigurationError::InvalidValue {
                field: "game.house_edge_bp".to_string(),
                value: self.game.house_edge_bp.to_string(),
                reason: format!("must be within 1..={}", MAX_HOUSE_EDGE_BP),
            });
        }

        if self.game.max_bets_per_batch == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "game.max_bets_per_batch".to_string(),
                value: "0".to_string(),
                reason: "must be > 0".to_string(),
            });
        }

        if self.game.min_win_chance == 0
            || self.game.min_win_chance > self.game.max_win_chance
            || self.game.max_win_chance >= 10_000
        {
            return Err(ConfigurationError::ValidationFailed(format!(
                "win chance bounds {}..={} must lie strictly inside (0, 10000)",
                self.game.min_win_chance, self.game.max_win_chance
            )));
        }

        // A payout at the highest accepted chance must still exceed 1x
        if u32::from(self.game.house_edge_bp) + u32::from(self.game.max_win_chance) >= 10_000 {
            return Err(ConfigurationError::ValidationFailed(
                "house edge leaves no profit at the maximum win chance".to_string(),
            ));
        }

        let tickers = self
            .accounts
            .welcome_balances
            .keys()
            .map(|t| ("accounts.welcome_balances", t))
            .chain(self.accounts.house_bankroll.keys().map(|t| ("accounts.house_bankroll", t)));
        for (field, ticker) in tickers {
            if ticker.parse::<Currency>().is_err() {
                return Err(ConfigurationError::InvalidValue {
                    field: field.to_string(),
                    value: ticker.clone(),
                    reason: "unsupported currency ticker".to_string(),
                });
            }
        }

        self.seeds.encryption_key()?;

        if self.seeds.lock_timeout_ms == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "seeds.lock_timeout_ms".to_string(),
                value: "0".to_string(),
                reason: "must be > 0".to_string(),
            });
        }

        if self.seeds.default_client_seed_bytes == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "seeds.default_client_seed_bytes".to_string(),
                value: "0".to_string(),
                reason: "must be > 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> DiceResult<DiceConfig> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => DiceConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> Result<DiceConfig, ConfigurationError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content).map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(&self, config: &mut DiceConfig) -> Result<(), ConfigurationError> {
        if let Ok(edge) = env::var("FAIRDICE_HOUSE_EDGE_BP") {
            config.game.house_edge_bp = edge.parse().map_err(|_| ConfigurationError::InvalidValue {
                field: "FAIRDICE_HOUSE_EDGE_BP".to_string(),
                value: edge,
                reason: "Invalid house edge".to_string(),
            })?;
        }
        if let Ok(key) = env::var("FAIRDICE_SEED_KEY") {
            config.seeds.encryption_key_hex = key;
        }
        if let Ok(policy) = env::var("FAIRDICE_SETTLEMENT_POLICY") {
            config.game.settlement_policy = policy.parse()?;
        }
        if let Ok(timeout) = env::var("FAIRDICE_LOCK_TIMEOUT_MS") {
            config.seeds.lock_timeout_ms = timeout.parse().map_err(|_| ConfigurationError::InvalidValue {
                field: "FAIRDICE_LOCK_TIMEOUT_MS".to_string(),
                value: timeout,
                reason: "Invalid timeout value".to_string(),
            })?;
        }
        if let Ok(level) = env::var("FAIRDICE_LOG_LEVEL") {
            config.monitoring.log_level = level.parse()?;
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &DiceConfig, path: &str) -> DiceResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}
