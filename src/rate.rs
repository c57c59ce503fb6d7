//! Fixed-rate quoting between the native currency and the confidential
//! token.
//!
//! All arithmetic is integer fixed-point over smallest indivisible units.
//! Quoting is floor division, so the ledger never over-credits relative to
//! the deposited value, and a quote reproduces bit-for-bit across
//! implementations.

use crate::errors::{Error, Result};
use crate::Balance;

/// Whole token units minted per whole native unit.
pub const TOKENS_PER_NATIVE_UNIT: u128 = 2_300;

/// Decimal places of the confidential token.
pub const TOKEN_DECIMALS: u32 = 6;

/// Decimal places of the native currency.
pub const NATIVE_DECIMALS: u32 = 18;

/// A native currency amount in its smallest indivisible unit.
pub type NativeAmount = u128;

/// Immutable fixed-point exchange rate.
///
/// `numerator` is tokens-per-native-unit scaled to the token's smallest
/// unit; `scale` is the native currency's smallest-unit scale.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExchangeRate {
    numerator: u128,
    scale: u128,
}

impl Default for ExchangeRate {
    fn default() -> Self {
        Self {
            numerator: TOKENS_PER_NATIVE_UNIT * 10u128.pow(TOKEN_DECIMALS),
            scale: 10u128.pow(NATIVE_DECIMALS),
        }
    }
}

impl ExchangeRate {
    pub fn new(numerator: u128, scale: u128) -> Result<Self> {
        ensure!(scale != 0, Error::InvalidExchangeRate);
        Ok(Self { numerator, scale })
    }

    /// Quotes the token amount minted for `native` smallest units.
    ///
    /// `floor(native * numerator / scale)`. A product overflow or a
    /// quotient above [`Balance::MAX`] is rejected, since the co-processor
    /// encrypts 64-bit values.
    pub fn quote(&self, native: NativeAmount) -> Result<Balance> {
        let scaled = native
            .checked_mul(self.numerator)
            .ok_or(Error::AmountOutOfRange { amount: native })?;
        Balance::try_from(scaled / self.scale)
            .map_err(|_| Error::AmountOutOfRange { amount: native })
    }
}

/// Parses a decimal native-unit amount ("1.0", "0.01") into smallest
/// units.
///
/// Parsing is a UI boundary concern: malformed or over-precise input
/// parses to 0 instead of surfacing an error into ledger logic.
pub fn parse_native_amount(input: &str) -> NativeAmount {
    let trimmed = input.trim();
    let (whole, frac) = match trimmed.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (trimmed, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return 0;
    }
    if frac.len() > NATIVE_DECIMALS as usize {
        return 0;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        match whole.parse() {
            Ok(value) => value,
            Err(_) => return 0,
        }
    };
    let frac_scaled: u128 = if frac.is_empty() {
        0
    } else {
        match frac.parse::<u128>() {
            Ok(digits) => digits * 10u128.pow(NATIVE_DECIMALS - frac.len() as u32),
            Err(_) => return 0,
        }
    };

    whole
        .checked_mul(10u128.pow(NATIVE_DECIMALS))
        .and_then(|scaled| scaled.checked_add(frac_scaled))
        .unwrap_or(0)
}

// ------------------------------------------------------------------------
// Tests
// ------------------------------------------------------------------------
