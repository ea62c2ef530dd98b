//! Fixed-point arithmetic for reserve, radius and invariant math
//!
//! All quantities are unsigned integers scaled by `10^decimals`. A product of
//! two scaled values is divided by the scale exactly once and a quotient is
//! pre-multiplied by the scale, so neither inflates nor truncates to zero.
//!
//! Two overflow policies exist and each call site picks one:
//!
//! - [`mul_div`] widens to 256 bits and returns [`SphereError::Overflow`] when
//!   the result does not fit. Invariant, solver, radius and share math use it;
//!   a wrapped or truncated value there would misprice trades.
//! - [`mul_div_lossy`] multiplies natively and, when the product would
//!   overflow `u128`, divides first and accepts the precision loss. Only fee
//!   distribution and the coarse price view use it.

use crate::errors::{Result, SphereError};
use ethnum::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Basis-point denominator
pub const BPS: u128 = 10_000;

/// Integer square root by Babylonian iteration.
///
/// Starts from `(x + 1) / 2` and stops once the iterate no longer decreases,
/// returning `floor(√x)`. The sequence is strictly decreasing until it
/// settles, so it finishes in O(log x) steps without an iteration cap.
pub fn sqrt_u256(x: U256) -> U256 {
    if x == U256::ZERO {
        return U256::ZERO;
    }

    let two = U256::new(2);
    let mut y = x;
    // (x + 1) / 2 without overflowing at U256::MAX
    let mut z = x / two + (x % two);
    while z < y {
        y = z;
        z = (x / z + z) / two;
    }
    y
}

/// `floor(√x)` for native integers
pub fn sqrt(x: u128) -> u128 {
    // √(2^128) = 2^64, always fits
    sqrt_u256(U256::from(x)).as_u128()
}

/// Square of a raw value, widened
#[inline]
pub fn square(x: u128) -> U256 {
    let wide = U256::from(x);
    wide * wide
}

/// Narrow a 256-bit intermediate back to `u128`
pub fn to_u128(value: U256, context: &'static str) -> Result<u128> {
    if value > U256::from(u128::MAX) {
        return Err(SphereError::Overflow(context));
    }
    Ok(value.as_u128())
}

/// Exact `a * b / denominator` with a 256-bit intermediate
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Result<u128> {
    if denominator == 0 {
        return Err(SphereError::DivisionByZero);
    }
    let product = U256::from(a) * U256::from(b);
    to_u128(product / U256::from(denominator), "mul_div")
}

/// `a * b / denominator`, dividing first when the native product overflows
pub fn mul_div_lossy(a: u128, b: u128, denominator: u128) -> Result<u128> {
    if denominator == 0 {
        return Err(SphereError::DivisionByZero);
    }
    match a.checked_mul(b) {
        Some(product) => Ok(product / denominator),
        None => (a / denominator)
            .checked_mul(b)
            .ok_or(SphereError::Overflow("mul_div_lossy")),
    }
}

/// `amount * bps / 10_000`
pub fn apply_bps(amount: u128, bps: u32) -> Result<u128> {
    mul_div(amount, bps as u128, BPS)
}

/// Fixed-point scale shared by every computation in one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedPoint {
    decimals: u32,
    one: u128,
}

impl FixedPoint {
    /// Scale of `10^decimals`
    pub fn new(decimals: u32) -> Result<Self> {
        let one = 10u128
            .checked_pow(decimals)
            .ok_or(SphereError::Overflow("precision scale"))?;
        Ok(Self { decimals, one })
    }

    /// The scaled representation of 1.0
    #[inline]
    pub fn one(&self) -> u128 {
        self.one
    }

    #[inline]
    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Whole units to scaled units
    pub fn from_units(&self, units: u128) -> Result<u128> {
        units
            .checked_mul(self.one)
            .ok_or(SphereError::Overflow("from_units"))
    }

    /// Scaled multiply: `a * b / one`
    #[inline]
    pub fn mul(&self, a: u128, b: u128) -> Result<u128> {
        mul_div(a, b, self.one)
    }

    /// Scaled divide: `a * one / b`
    #[inline]
    pub fn div(&self, a: u128, b: u128) -> Result<u128> {
        mul_div(a, self.one, b)
    }

    /// Scaled `√n` for an asset count
    pub fn sqrt_count(&self, n: usize) -> Result<u128> {
        let radicand = U256::from(n as u128) * square(self.one);
        to_u128(sqrt_u256(radicand), "sqrt_count")
    }

    /// Scaled fraction for a basis-point value
    pub fn from_bps(&self, bps: u32) -> Result<u128> {
        mul_div(self.one, bps as u128, BPS)
    }

    /// Render a scaled value as a `Decimal` for display
    pub fn to_decimal(&self, value: u128) -> Result<Decimal> {
        let mantissa = i128::try_from(value).map_err(|_| SphereError::Overflow("to_decimal"))?;
        Decimal::try_from_i128_with_scale(mantissa, self.decimals)
            .map_err(|_| SphereError::Overflow("to_decimal"))
    }

    /// Convert a `Decimal` into scaled units, truncating extra digits
    pub fn from_decimal(&self, value: Decimal) -> Result<u128> {
        if value.is_sign_negative() {
            return Err(SphereError::Overflow("from_decimal: negative value"));
        }
        let one = u64::try_from(self.one).map_err(|_| SphereError::Overflow("from_decimal"))?;
        value
            .checked_mul(Decimal::from(one))
            .and_then(|scaled| scaled.trunc().to_u128())
            .ok_or(SphereError::Overflow("from_decimal"))
    }
}
