//! Shared type definitions for the betting core
//!
//! Owners, currencies, and fixed-point money used by the seed manager,
//! the batch executor, and the ledger.

use crate::errors::{DiceError, DiceResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of decimal places carried by every monetary amount
pub const AMOUNT_DECIMALS: u32 = 8;

/// Atomic units per whole coin
pub const AMOUNT_SCALE: u64 = 100_000_000;

/// Player identity as resolved by the account/session collaborator
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Supported currency tickers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Play-money chips
    Play,
    Eth,
    Btc,
}

impl Currency {
    pub fn ticker(&self) -> &'static str {
        match self {
            Currency::Play => "PLAY",
            Currency::Eth => "ETH",
            Currency::Btc => "BTC",
        }
    }

    /// List of all supported currencies
    pub fn all_supported() -> [Currency; 3] {
        [Currency::Play, Currency::Eth, Currency::Btc]
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ticker())
    }
}

impl FromStr for Currency {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PLAY" => Ok(Currency::Play),
            "ETH" => Ok(Currency::Eth),
            "BTC" => Ok(Currency::Btc),
            other => Err(DiceError::BadCurrency(other.to_string())),
        }
    }
}

/// Ledger account: a player's balance sheet or the house bankroll
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "owner", rename_all = "lowercase")]
pub enum AccountId {
    Player(OwnerId),
    House,
}

impl AccountId {
    pub fn player(owner: &OwnerId) -> Self {
        AccountId::Player(owner.clone())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountId::Player(owner) => write!(f, "player:{}", owner),
            AccountId::House => write!(f, "house"),
        }
    }
}

/// Non-negative monetary amount with 8 decimal places, stored in atomic units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_atomic(units: u64) -> Self {
        Self(units)
    }

    pub const fn from_whole(coins: u64) -> Self {
        Self(coins * AMOUNT_SCALE)
    }

    pub const fn atomic(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn checked_mul(self, factor: u64) -> Option<Amount> {
        self.0.checked_mul(factor).map(Amount)
    }

    /// Apply a signed delta, failing if the result would be negative or overflow
    pub fn checked_apply(self, delta: SignedAmount) -> Option<Amount> {
        let next = (self.0 as i128).checked_add(delta.atomic())?;
        u64::try_from(next).ok().map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:0width$}",
            self.0 / AMOUNT_SCALE,
            self.0 % AMOUNT_SCALE,
            width = AMOUNT_DECIMALS as usize
        )
    }
}

impl FromStr for Amount {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let units = parse_fixed_point(s, AMOUNT_DECIMALS)
            .ok_or_else(|| DiceError::InvalidAmount(format!("'{}' is not a valid amount", s)))?;
        Ok(Amount(units))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Signed monetary delta (player perspective: positive means the player gained)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignedAmount(i128);

impl SignedAmount {
    pub const ZERO: SignedAmount = SignedAmount(0);

    pub const fn from_atomic(units: i128) -> Self {
        Self(units)
    }

    pub const fn atomic(&self) -> i128 {
        self.0
    }

    pub fn gain(amount: Amount) -> Self {
        Self(amount.atomic() as i128)
    }

    pub fn loss(amount: Amount) -> Self {
        Self(-(amount.atomic() as i128))
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: SignedAmount) -> Option<SignedAmount> {
        self.0.checked_add(other.0).map(SignedAmount)
    }

    /// Magnitude of the delta, if it fits an [`Amount`]
    pub fn magnitude(&self) -> DiceResult<Amount> {
        u64::try_from(self.0.unsigned_abs())
            .map(Amount::from_atomic)
            .map_err(|_| DiceError::InvalidAmount(format!("{} exceeds the amount range", self)))
    }
}

impl fmt::Display for SignedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = AMOUNT_SCALE as u128;
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            abs / scale,
            abs % scale,
            width = AMOUNT_DECIMALS as usize
        )
    }
}

impl Serialize for SignedAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SignedAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let (negative, digits) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.as_str()),
        };
        let units = parse_fixed_point(digits, AMOUNT_DECIMALS)
            .ok_or_else(|| serde::de::Error::custom(format!("'{}' is not a valid signed amount", raw)))?;
        let units = units as i128;
        Ok(SignedAmount(if negative { -units } else { units }))
    }
}

/// Parse an unsigned decimal string into integer units with `decimals` places.
///
/// Rejects signs, exponents, empty input, and more fractional digits than
/// `decimals`.
pub(crate) fn parse_fixed_point(input: &str, decimals: u32) -> Option<u64> {
    let input = input.trim();
    let (whole, fraction) = match input.split_once('.') {
        Some((w, f)) => (w, f),
        None => (input, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if fraction.len() > decimals as usize {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole_units: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut fraction_units: u64 = if fraction.is_empty() { 0 } else { fraction.parse().ok()? };
    for _ in fraction.len()..decimals as usize {
        fraction_units = fraction_units.checked_mul(10)?;
    }

    whole_units
        .checked_mul(10u64.checked_pow(decimals)?)?
        .checked_add(fraction_units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_parsing() {
        assert_eq!("PLAY".parse::<Currency>().unwrap(), Currency::Play);
        assert_eq!(" BTC ".parse::<Currency>().unwrap(), Currency::Btc);
        match "DOGE".parse::<Currency>() {
            Err(DiceError::BadCurrency(ticker)) => assert_eq!(ticker, "DOGE"),
            other => panic!("Expected bad currency, got {:?}", other),
        }
    }

    #[test]
    fn test_amount_parse_and_display() {
        let amount: Amount = "12.5".parse().unwrap();
        assert_eq!(amount.atomic(), 1_250_000_000);
        assert_eq!(amount.to_string(), "12.50000000");
        assert_eq!("0.00000001".parse::<Amount>().unwrap().atomic(), 1);
        assert_eq!(".5".parse::<Amount>().unwrap(), Amount::from_atomic(50_000_000));
    }

    #[test]
    fn test_amount_rejects_malformed_input() {
        assert!("".parse::<Amount>().is_err());
        assert!("-1".parse::<Amount>().is_err());
        assert!("1.000000001".parse::<Amount>().is_err());
        assert!("1e5".parse::<Amount>().is_err());
        assert!("99999999999999999999".parse::<Amount>().is_err());
    }

    #[test]
    fn test_checked_apply_never_goes_negative() {
        let balance = Amount::from_whole(30);
        assert_eq!(
            balance.checked_apply(SignedAmount::loss(Amount::from_whole(30))),
            Some(Amount::ZERO)
        );
        assert_eq!(balance.checked_apply(SignedAmount::loss(Amount::from_whole(31))), None);
        assert_eq!(
            balance.checked_apply(SignedAmount::gain(Amount::from_whole(5))),
            Some(Amount::from_whole(35))
        );
    }

    #[test]
    fn test_signed_amount_display_and_serde() {
        let net = SignedAmount::loss(Amount::from_whole(50));
        assert_eq!(net.to_string(), "-50.00000000");

        let json = serde_json::to_string(&net).unwrap();
        assert_eq!(json, "\"-50.00000000\"");
        let back: SignedAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, net);
        assert_eq!(net.magnitude().unwrap(), Amount::from_whole(50));
    }

    #[test]
    fn test_account_display() {
        assert_eq!(AccountId::player(&OwnerId::new("alice")).to_string(), "player:alice");
        assert_eq!(AccountId::House.to_string(), "house");
    }
}
