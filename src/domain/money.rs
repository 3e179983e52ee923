//! Money, currency codes and exchange-rate snapshots.
//!
//! Every amount in the ledger is a signed integer number of **minor units**
//! (cents for EUR, yen for JPY, fils for KWD). Decimal strings only exist at the
//! boundary: parsing user input and formatting for display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use super::errors::DomainError;

/// Fraction digits carried by [`ExchangeRate::rate_e9`].
pub const RATE_SCALE: u32 = 9;

/// Signed amount in minor units of the group's home currency.
///
/// `Display` prints the raw minor-unit integer; use [`Money::format`] to render
/// a decimal amount for a specific currency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Largest total a single expense or settlement may carry. Keeps any
    /// realistic ledger fold far away from `i64` overflow.
    pub const MAX_RECORDABLE: Money = Money(1_000_000_000_000);

    #[must_use]
    pub const fn new(minor: i64) -> Self {
        Self(minor)
    }

    /// Raw value in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    #[must_use]
    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// Checked subtraction (returns `None` on overflow).
    #[must_use]
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    /// Render as a decimal amount with the currency code, e.g. `12.34 EUR`.
    pub fn format(self, currency: &CurrencyCode) -> String {
        format!(
            "{} {}",
            format_scaled(self.0, currency.minor_units()),
            currency
        )
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Money> for i64 {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// ISO 4217 style currency code (three ASCII letters, stored upper-case).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: &str) -> Result<Self, DomainError> {
        let code = code.trim().to_ascii_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::Currency(format!(
                "invalid currency code: {code:?}"
            )));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of fraction digits of one major unit.
    ///
    /// Example: EUR has 2, so `10.50 EUR` is stored as `1050`.
    pub fn minor_units(&self) -> u32 {
        match self.0.as_str() {
            "BIF" | "CLP" | "DJF" | "GNF" | "ISK" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF"
            | "UGX" | "VND" | "VUV" | "XAF" | "XOF" | "XPF" => 0,
            "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
            _ => 2,
        }
    }

    /// Parse a decimal string (`.` or `,` separator, optional sign) into minor
    /// units of this currency. More fraction digits than the currency allows
    /// is an error, never a silent rounding.
    pub fn parse_amount(&self, input: &str) -> Result<Money, DomainError> {
        parse_scaled(input, self.minor_units())
            .map(Money::new)
            .map_err(|reason| DomainError::InvalidAmount(format!("{reason}: {input:?}")))
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}

/// Exchange rate captured when a foreign-currency expense was recorded.
///
/// The ledger converts once, at creation time, and keeps the snapshot with the
/// expense; balances never depend on current rates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    /// Units of `to` per one unit of `from`, fixed-point with [`RATE_SCALE`]
    /// fraction digits.
    pub rate_e9: i64,
    pub captured_at: DateTime<Utc>,
}

impl ExchangeRate {
    pub fn new(
        from: CurrencyCode,
        to: CurrencyCode,
        rate_e9: i64,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if rate_e9 <= 0 {
            return Err(DomainError::Currency(format!(
                "exchange rate {from}->{to} must be > 0"
            )));
        }
        Ok(Self {
            from,
            to,
            rate_e9,
            captured_at,
        })
    }

    /// Build a snapshot from a decimal rate string such as `"1.0845"`.
    pub fn parse(
        from: CurrencyCode,
        to: CurrencyCode,
        rate: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let rate_e9 = parse_scaled(rate, RATE_SCALE)
            .map_err(|reason| DomainError::Currency(format!("{reason}: {rate:?}")))?;
        Self::new(from, to, rate_e9, captured_at)
    }

    /// Convert an amount in `from` minor units into `to` minor units,
    /// rounding half away from zero.
    pub fn convert(&self, amount: Money) -> Result<Money, DomainError> {
        let numerator = i128::from(amount.minor())
            * i128::from(self.rate_e9)
            * 10i128.pow(self.to.minor_units());
        let denominator = 10i128.pow(RATE_SCALE) * 10i128.pow(self.from.minor_units());
        let converted = div_round_half_away(numerator, denominator);
        i64::try_from(converted)
            .map(Money::new)
            .map_err(|_| DomainError::InvalidAmount("converted amount too large".to_string()))
    }
}

/// Integer division rounding half away from zero. `denominator` must be > 0.
pub(crate) fn div_round_half_away(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.abs() * 2 >= denominator {
        quotient + numerator.signum()
    } else {
        quotient
    }
}

/// Parse a signed decimal string into an integer scaled by `10^scale`.
///
/// Accepts `.` or `,` as decimal separator and an optional leading `+`/`-`.
pub(crate) fn parse_scaled(input: &str, scale: u32) -> Result<i64, String> {
    let trimmed = input.trim();
    let (negative, rest) = if let Some(stripped) = trimmed.strip_prefix('-') {
        (true, stripped)
    } else if let Some(stripped) = trimmed.strip_prefix('+') {
        (false, stripped)
    } else {
        (false, trimmed)
    };

    let rest = rest.trim().replace(',', ".");
    if rest.is_empty() {
        return Err("empty amount".to_string());
    }

    let mut parts = rest.split('.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next().unwrap_or_default();
    if parts.next().is_some() {
        return Err("invalid amount".to_string());
    }
    if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
        return Err("invalid amount".to_string());
    }
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err("invalid amount".to_string());
    }
    if fraction.len() > scale as usize {
        return Err("too many decimals".to_string());
    }

    let whole: i64 = whole.parse().map_err(|_| "amount too large".to_string())?;
    let padded = format!("{fraction:0<width$}", width = scale as usize);
    let fraction: i64 = if padded.is_empty() {
        0
    } else {
        padded.parse().map_err(|_| "invalid amount".to_string())?
    };

    let total = whole
        .checked_mul(10i64.pow(scale))
        .and_then(|v| v.checked_add(fraction))
        .ok_or_else(|| "amount too large".to_string())?;

    Ok(if negative { -total } else { total })
}

/// Format an integer scaled by `10^scale` as a decimal string.
pub(crate) fn format_scaled(value: i64, scale: u32) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    if scale == 0 {
        return format!("{sign}{abs}");
    }
    let factor = 10u64.pow(scale);
    let width = scale as usize;
    format!("{sign}{}.{:0width$}", abs / factor, abs % factor)
}
