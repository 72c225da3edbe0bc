//! Deterministic roll derivation
//!
//! `HMAC-SHA256(key = server_seed, msg = "{client_seed}:{nonce}")` is read as
//! consecutive big-endian `u32` windows. The first window below
//! [`ACCEPT_LIMIT`] is reduced modulo [`ROLL_DOMAIN`]; windows at or above the
//! limit are rejected so every roll value is equally likely. If all eight
//! windows of a digest are rejected the digest is extended with
//! `SHA256(previous digest)`.
//!
//! Anyone holding the revealed server seed can recompute a roll with these
//! rules and nothing else.

use crate::errors::{DiceError, DiceResult};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

pub type HmacSha256 = Hmac<Sha256>;

/// Number of distinct roll values: `0.00..=99.99`
pub const ROLL_DOMAIN: u32 = 10_000;

/// Largest multiple of [`ROLL_DOMAIN`] that fits in a `u32` window
pub const ACCEPT_LIMIT: u32 = (u32::MAX / ROLL_DOMAIN) * ROLL_DOMAIN;

const WINDOW_BYTES: usize = 4;

/// A roll in `[0, 100)` with two decimal places, stored in hundredths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RollValue(u16);

impl RollValue {
    /// Build from hundredths; `None` outside the roll domain
    pub fn from_hundredths(value: u16) -> Option<Self> {
        (u32::from(value) < ROLL_DOMAIN).then_some(Self(value))
    }

    pub fn hundredths(&self) -> u16 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl fmt::Display for RollValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for RollValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for RollValue {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::types::parse_fixed_point(s, 2)
            .and_then(|v| u16::try_from(v).ok())
            .and_then(RollValue::from_hundredths)
            .ok_or_else(|| DiceError::InvalidAmount(format!("'{}' is not a roll value in [0, 100)", s.trim())))
    }
}

impl<'de> Deserialize<'de> for RollValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One derived roll and the nonce that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollOutcome {
    pub roll: RollValue,
    pub nonce: u64,
}

/// Stateless provably-fair roll generator
pub struct FairRollEngine;

impl FairRollEngine {
    /// Keyed digest for one roll
    pub fn digest(server_seed: &str, client_seed: &str, nonce: u64) -> DiceResult<[u8; 32]> {
        if server_seed.is_empty() {
            return Err(DiceError::InvalidSeed("server seed must not be empty".to_string()));
        }

        let mut mac = HmacSha256::new_from_slice(server_seed.as_bytes())
            .map_err(|e| DiceError::InvalidSeed(format!("unusable server seed: {}", e)))?;
        mac.update(format!("{}:{}", client_seed, nonce).as_bytes());

        Ok(mac.finalize().into_bytes().into())
    }

    /// Map a digest onto the roll domain without modulo bias
    pub fn roll_from_digest(digest: &[u8; 32]) -> RollValue {
        let mut buffer = *digest;
        loop {
            for window in buffer.chunks_exact(WINDOW_BYTES) {
                let value = u32::from_be_bytes([window[0], window[1], window[2], window[3]]);
                if value < ACCEPT_LIMIT {
                    // value % ROLL_DOMAIN < 10_000 always fits u16
                    return RollValue((value % ROLL_DOMAIN) as u16);
                }
            }
            buffer = Sha256::digest(buffer).into();
        }
    }

    /// Derive the roll for `(server_seed, client_seed, nonce)`
    pub fn roll(server_seed: &str, client_seed: &str, nonce: u64) -> DiceResult<RollOutcome> {
        let digest = Self::digest(server_seed, client_seed, nonce)?;
        let roll = Self::roll_from_digest(&digest);
        tracing::trace!(nonce, roll = %roll, "Derived roll");
        Ok(RollOutcome { roll, nonce })
    }
}

/// Public commitment for a plaintext server seed: hex SHA-256
pub fn commitment_for(server_seed: &str) -> String {
    hex::encode(Sha256::digest(server_seed.as_bytes()))
}

/// Check a revealed server seed against the commitment published before play
pub fn verify_commitment(server_seed: &str, commitment: &str) -> bool {
    commitment_for(server_seed).eq_ignore_ascii_case(commitment.trim())
}

/// Recompute a roll from revealed inputs and compare it with the recorded value
pub fn verify_roll(server_seed: &str, client_seed: &str, nonce: u64, recorded: RollValue) -> DiceResult<bool> {
    let outcome = FairRollEngine::roll(server_seed, client_seed, nonce)?;
    Ok(outcome.roll == recorded)
}
