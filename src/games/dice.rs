//! Dice setup: win chance and direction to payout and acceptance range.
//!
//! All quantities are integers in hundredths (of a percent, or of a roll
//! point), so the calculation is exact and identical everywhere.

use crate::config::GameConfig;
use crate::errors::{ConfigurationError, DiceError, DiceResult};
use crate::fairness::roll::{RollValue, ROLL_DOMAIN};
use crate::types::{parse_fixed_point, Amount};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of the threshold wins
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    RollUnder,
    RollOver,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::RollUnder => write!(f, "roll_under"),
            Direction::RollOver => write!(f, "roll_over"),
        }
    }
}

impl FromStr for Direction {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "under" | "roll_under" | "roll-under" => Ok(Direction::RollUnder),
            "over" | "roll_over" | "roll-over" => Ok(Direction::RollOver),
            other => Err(DiceError::InvalidDirection(other.to_string())),
        }
    }
}

/// Requested win probability in hundredths of a percent (4_950 = 49.50%)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WinChance(u16);

impl WinChance {
    /// Build from hundredths; rejects the degenerate 0% and >= 100% chances
    pub fn from_hundredths(value: u16) -> DiceResult<Self> {
        if value == 0 || u32::from(value) >= ROLL_DOMAIN {
            return Err(out_of_range(value, 0, ROLL_DOMAIN as u16));
        }
        Ok(Self(value))
    }

    pub fn hundredths(&self) -> u16 {
        self.0
    }

    pub fn as_percent(&self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl fmt::Display for WinChance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for WinChance {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hundredths = parse_fixed_point(s, 2)
            .and_then(|v| u16::try_from(v).ok())
            .ok_or_else(|| DiceError::InvalidProbability {
                value: s.trim().to_string(),
                min: "0".to_string(),
                max: "100".to_string(),
            })?;
        Self::from_hundredths(hundredths)
    }
}

impl Serialize for WinChance {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WinChance {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Exact payout multiplier `numerator / denominator`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutMultiplier {
    pub numerator: u32,
    pub denominator: u32,
}

impl PayoutMultiplier {
    pub fn as_f64(&self) -> f64 {
        f64::from(self.numerator) / f64::from(self.denominator)
    }

    /// Multiplier truncated to five decimals, as shown to players
    pub fn display_value(&self) -> String {
        let scaled = u64::from(self.numerator) * 100_000 / u64::from(self.denominator);
        format!("{}.{:05}", scaled / 100_000, scaled % 100_000)
    }
}

impl fmt::Display for PayoutMultiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.display_value())
    }
}

/// Payout and winning interval for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetParameters {
    pub win_chance: WinChance,
    pub direction: Direction,
    pub payout_multiplier: PayoutMultiplier,
    /// Inclusive lower bound, hundredths
    pub accept_min: u16,
    /// Exclusive upper bound, hundredths (may equal 10_000)
    pub accept_max: u16,
}

impl BetParameters {
    /// Half-open interval test `accept_min <= roll < accept_max`
    pub fn is_win(&self, roll: RollValue) -> bool {
        let value = roll.hundredths();
        self.accept_min <= value && value < self.accept_max
    }

    pub fn range_width(&self) -> u16 {
        self.accept_max - self.accept_min
    }

    /// Profit on a winning bet: `bet * (multiplier - 1)`, rounded down to atomic units
    pub fn win_profit(&self, bet: Amount) -> DiceResult<Amount> {
        let numerator = u128::from(self.payout_multiplier.numerator - self.payout_multiplier.denominator);
        let profit = u128::from(bet.atomic()) * numerator / u128::from(self.payout_multiplier.denominator);
        u64::try_from(profit)
            .map(Amount::from_atomic)
            .map_err(|_| DiceError::InvalidAmount(format!("win profit on {} overflows", bet)))
    }
}

/// Turns a requested win chance into bet parameters
#[derive(Debug, Clone, Copy)]
pub struct DiceSetupCalculator {
    house_edge_bp: u16,
    min_win_chance: u16,
    max_win_chance: u16,
}

impl DiceSetupCalculator {
    /// Calculator accepting the full open interval `(0, 100)`
    pub fn new(house_edge_bp: u16) -> DiceResult<Self> {
        if house_edge_bp == 0 || u32::from(house_edge_bp) >= ROLL_DOMAIN {
            return Err(ConfigurationError::InvalidValue {
                field: "game.house_edge_bp".to_string(),
                value: house_edge_bp.to_string(),
                reason: "must be within 1..10000".to_string(),
            }
            .into());
        }
        Ok(Self {
            house_edge_bp,
            min_win_chance: 1,
            max_win_chance: (ROLL_DOMAIN - 1) as u16,
        })
    }

    pub fn from_config(config: &GameConfig) -> DiceResult<Self> {
        let mut calculator = Self::new(config.house_edge_bp)?;
        calculator.min_win_chance = config.min_win_chance.max(1);
        calculator.max_win_chance = config.max_win_chance;
        Ok(calculator)
    }

    pub fn house_edge_bp(&self) -> u16 {
        self.house_edge_bp
    }

    pub fn compute(&self, win_chance: WinChance, direction: Direction) -> DiceResult<BetParameters> {
        let p = win_chance.hundredths();
        if p < self.min_win_chance || p > self.max_win_chance {
            return Err(out_of_range(p, self.min_win_chance - 1, self.max_win_chance + 1));
        }

        let numerator = ROLL_DOMAIN - u32::from(self.house_edge_bp);
        let denominator = u32::from(p);
        // Multiplier must stay strictly above 1x
        if numerator <= denominator {
            return Err(out_of_range(p, 0, numerator as u16));
        }

        let (accept_min, accept_max) = match direction {
            Direction::RollUnder => (0, p),
            Direction::RollOver => (ROLL_DOMAIN as u16 - p, ROLL_DOMAIN as u16),
        };

        Ok(BetParameters {
            win_chance,
            direction,
            payout_multiplier: PayoutMultiplier { numerator, denominator },
            accept_min,
            accept_max,
        })
    }
}

fn out_of_range(value: u16, min: u16, max: u16) -> DiceError {
    let pct = |v: u16| format!("{}.{:02}", v / 100, v % 100);
    DiceError::InvalidProbability {
        value: pct(value),
        min: pct(min),
        max: pct(max),
    }
}
