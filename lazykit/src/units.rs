//! Amount and rate conversions between human input, display strings and the
//! raw on-chain units. Floating point is allowed only up to the pre-submit
//! floor; everything past that boundary is integer arithmetic.

use alloy::primitives::U256;

use crate::error::{KitError, KitResult};

pub const TINYBAR_PER_HBAR: u64 = 100_000_000;

/// On-chain win rates are u32 thousandths of a basis point: 1_000_000 = 100%.
pub const WIN_RATE_SCALE: u32 = 1_000_000;

/// Human HBAR amount to tinybars, flooring sub-tinybar dust.
pub fn hbar_to_tinybar(hbar: f64) -> KitResult<u64> {
    if !hbar.is_finite() || hbar < 0.0 {
        return Err(KitError::Env(format!("invalid hbar amount {hbar}")));
    }
    Ok((hbar * TINYBAR_PER_HBAR as f64).floor() as u64)
}

/// Human fungible amount to raw units with the token's decimal exponent.
pub fn to_raw_amount(human: f64, decimals: u32) -> KitResult<u128> {
    if !human.is_finite() || human < 0.0 {
        return Err(KitError::Env(format!("invalid amount {human}")));
    }
    Ok((human * 10f64.powi(decimals as i32)).floor() as u128)
}

/// Render a raw amount in display units, trimming trailing zeros:
/// `display_amount(100_000_000, 8, "ℏ")` is `"1 ℏ"`,
/// `display_amount(50, 2, "LAZY")` is `"0.5 LAZY"`.
pub fn display_amount(raw: u128, decimals: u32, symbol: &str) -> String {
    let scale = 10u128.pow(decimals);
    let whole = raw / scale;
    let frac = raw % scale;
    if frac == 0 {
        return format!("{whole} {symbol}");
    }
    let frac_str = format!("{frac:0width$}", width = decimals as usize);
    let trimmed = frac_str.trim_end_matches('0');
    format!("{whole}.{trimmed} {symbol}")
}

pub fn display_tinybar(tinybar: u128) -> String {
    display_amount(tinybar, 8, "\u{210f}")
}

/// Percent string with four fractional digits: `raw / 1_000_000 × 100`.
pub fn display_win_rate(raw: u32) -> String {
    format!("{:.4}%", raw as f64 / 10_000.0)
}

/// Re-parse a percentage produced by [`display_win_rate`] back to raw units.
pub fn parse_win_rate(s: &str) -> KitResult<u32> {
    let trimmed = s.trim().trim_end_matches('%');
    let pct: f64 = trimmed
        .parse()
        .map_err(|_| KitError::BadIdentifier(format!("not a percentage: `{s}`")))?;
    Ok((pct * 10_000.0).round() as u32)
}

/// Lossless U256 → u128 narrowing for amounts the display layer handles.
pub fn u256_to_u128(value: U256) -> KitResult<u128> {
    value
        .try_into()
        .map_err(|_| KitError::AbiDecode { context: "amount".into(), reason: format!("{value} exceeds u128") })
}
