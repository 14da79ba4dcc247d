// Copyright 2025 chenjjiaa
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Exact conversion between human-entered decimal strings and token base units.

use ethers::types::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::SwapError;

/// Largest precision whose scale factor still fits in a U256.
const MAX_PRECISION: u8 = 77;

/// Fixed slippage tolerance applied to every swap, in percent.
pub const SLIPPAGE_TOLERANCE_PERCENT: Decimal = Decimal::from_parts(15, 0, 0, false, 0);

const BASIS_POINTS: u64 = 10_000;

fn invalid(input: &str, reason: &str) -> SwapError {
    SwapError::InvalidAmount(format!("{:?}: {}", input, reason))
}

/// Parse a non-negative decimal string into base units of a token with
/// `precision` decimals.
///
/// Digits beyond `precision` are accepted only if they are zeros; anything
/// else would need rounding and is rejected.
///
/// # Example
/// ```ignore
/// assert_eq!(to_base_units("10", 6)?, U256::from(10_000_000u64));
/// assert_eq!(to_base_units("0.5", 18)?, U256::from(5u8) * U256::exp10(17));
/// ```
pub fn to_base_units(input: &str, precision: u8) -> Result<U256, SwapError> {
    if precision > MAX_PRECISION {
        return Err(invalid(input, "token precision is out of range"));
    }

    let text = input.trim();
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (text, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid(input, "not a number"));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid(input, "not a non-negative decimal number"));
    }

    let precision = usize::from(precision);
    let (kept, dropped) = fraction.split_at(fraction.len().min(precision));
    if dropped.bytes().any(|b| b != b'0') {
        return Err(invalid(input, "more decimal places than the token supports"));
    }

    let mut units = U256::zero();
    for digit in whole.bytes().chain(kept.bytes()) {
        units = units
            .checked_mul(U256::from(10u8))
            .and_then(|v| v.checked_add(U256::from(digit - b'0')))
            .ok_or_else(|| invalid(input, "amount is too large"))?;
    }

    let shift = U256::exp10(precision - kept.len());
    units
        .checked_mul(shift)
        .ok_or_else(|| invalid(input, "amount is too large"))
}

/// Render base units as a decimal string with trailing fractional zeros trimmed.
pub fn to_decimal_string(units: U256, precision: u8) -> String {
    let digits = units.to_string();
    let precision = usize::from(precision);
    if precision == 0 {
        return digits;
    }

    let padded = if digits.len() <= precision {
        format!("{}{}", "0".repeat(precision - digits.len() + 1), digits)
    } else {
        digits
    };

    let (whole, fraction) = padded.split_at(padded.len() - precision);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// Minimum acceptable output after allowing `tolerance_percent` of slippage.
///
/// Tolerance is resolved to whole basis points and the result truncates, so
/// the bound never exceeds the exact value.
pub fn minimum_output(quoted: U256, tolerance_percent: Decimal) -> Result<U256, SwapError> {
    if tolerance_percent < Decimal::ZERO || tolerance_percent > Decimal::from(100) {
        return Err(SwapError::InvalidAmount(format!(
            "slippage tolerance {} must be between 0 and 100",
            tolerance_percent
        )));
    }
    let bps = (tolerance_percent * Decimal::from(100))
        .trunc()
        .to_u64()
        .unwrap_or(BASIS_POINTS);

    let slack = quoted
        .checked_mul(U256::from(bps))
        .map(|v| v / U256::from(BASIS_POINTS))
        // quoted * bps can only overflow near U256::MAX; divide first there.
        .unwrap_or_else(|| quoted / U256::from(BASIS_POINTS) * U256::from(bps));
    Ok(quoted - slack)
}
