//! Wei/ETH conversion and lenient numeric coercion.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimals between wei and ETH.
pub const ETH_DECIMALS: u32 = 18;

/// Render a wei amount as ETH with six decimals.
///
/// A missing or blank value renders as `"0"`. Anything that does not coerce
/// to a number collapses to zero.
pub fn format_eth(wei: Option<&str>) -> String {
    let Some(raw) = wei.map(str::trim).filter(|s| !s.is_empty()) else {
        return "0".to_string();
    };

    let eth = match parse_numeric(raw) {
        Some(Numeric::Integer(wei)) => match Decimal::try_from_i128_with_scale(wei, ETH_DECIMALS) {
            Ok(eth) => eth,
            // Beyond Decimal's 96-bit mantissa; fall back to float precision.
            Err(_) => return format!("{:.6}", wei as f64 / 1e18),
        },
        Some(Numeric::Decimal(d)) => d / Decimal::from(10u64.pow(ETH_DECIMALS)),
        Some(Numeric::Float(f)) => return format!("{:.6}", f / 1e18),
        None => Decimal::ZERO,
    };

    let rounded = eth.round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.6}")
}

/// Coerce a loosely-typed numeric string the way the analysis backend
/// expects: blank, non-numeric and zero all become `"0"`.
pub fn coerce_numeric(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return "0".to_string();
    };

    match parse_numeric(raw) {
        Some(Numeric::Integer(0)) | None => "0".to_string(),
        Some(Numeric::Integer(v)) => v.to_string(),
        Some(Numeric::Decimal(d)) if d.is_zero() => "0".to_string(),
        Some(Numeric::Decimal(d)) => d.normalize().to_string(),
        Some(Numeric::Float(f)) if f == 0.0 => "0".to_string(),
        Some(Numeric::Float(f)) => format!("{f}"),
    }
}

enum Numeric {
    Integer(i128),
    Decimal(Decimal),
    Float(f64),
}

fn parse_numeric(raw: &str) -> Option<Numeric> {
    if let Some(hex) = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
    {
        return i128::from_str_radix(hex, 16).ok().map(Numeric::Integer);
    }

    if let Ok(v) = raw.parse::<i128>() {
        return Some(Numeric::Integer(v));
    }

    if let Ok(d) = Decimal::from_str(raw) {
        return Some(Numeric::Decimal(d));
    }

    if let Ok(d) = Decimal::from_scientific(raw) {
        return Some(Numeric::Decimal(d));
    }

    raw.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Numeric::Float)
}
