use std::fmt;

/// Money is represented as integer cents (minor units) so sums are exact.
/// For EUR/USD, 1 unit = 100 cents, so €50.00 = 5000 cents.
pub type Cents = i64;

/// Format cents as a human-readable amount.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs_cents / 100, abs_cents % 100)
}

/// Parse a decimal string into cents.
/// Example: "50.00" -> 5000, "12.5" -> 1250, "100" -> 10000
///
/// More than two decimal places is rejected rather than truncated: a bill
/// amount that can't be represented exactly must not be silently altered.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim();
    let (negative, digits) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let (units_str, decimal_str) = digits.split_once('.').unwrap_or((digits, ""));
    if units_str.is_empty() && decimal_str.is_empty() {
        return Err(ParseCentsError::InvalidFormat);
    }
    if !units_str.chars().all(|c| c.is_ascii_digit())
        || !decimal_str.chars().all(|c| c.is_ascii_digit())
    {
        return Err(ParseCentsError::InvalidFormat);
    }
    if decimal_str.len() > 2 {
        return Err(ParseCentsError::TooPrecise);
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str.parse().map_err(|_| ParseCentsError::Overflow)?
    };
    let fraction: i64 = match decimal_str.len() {
        0 => 0,
        1 => decimal_str.parse::<i64>().map_err(|_| ParseCentsError::InvalidFormat)? * 10,
        _ => decimal_str.parse().map_err(|_| ParseCentsError::InvalidFormat)?,
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(fraction))
        .ok_or(ParseCentsError::Overflow)?;
    Ok(if negative { -cents } else { cents })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCentsError {
    InvalidFormat,
    TooPrecise,
    Overflow,
}

impl fmt::Display for ParseCentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCentsError::InvalidFormat => write!(f, "invalid money format"),
            ParseCentsError::TooPrecise => write!(f, "more than two decimal places"),
            ParseCentsError::Overflow => write!(f, "amount too large"),
        }
    }
}

impl std::error::Error for ParseCentsError {}

/// Split `total` into `parts` amounts that sum to exactly `total`.
/// The first `total % parts` amounts carry one extra cent.
pub fn split_evenly(total: Cents, parts: usize) -> Result<Vec<Cents>, SplitError> {
    if total < 0 {
        return Err(SplitError::NegativeTotal(total));
    }
    if parts == 0 {
        return Err(SplitError::NoParticipants);
    }
    let n = parts as i64;
    let base = total / n;
    let remainder = (total % n) as usize;

    Ok((0..parts)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect())
}

/// Split `total` proportionally to `weights`.
/// Each part gets the floor of its proportional amount; the leftover cents go
/// one each to the first weighted parts in order.
pub fn split_weighted(total: Cents, weights: &[u32]) -> Result<Vec<Cents>, SplitError> {
    if total < 0 {
        return Err(SplitError::NegativeTotal(total));
    }
    let weight_sum: i128 = weights.iter().map(|&w| i128::from(w)).sum();
    if weight_sum == 0 {
        return Err(SplitError::NoParticipants);
    }

    // i128 keeps total * weight from overflowing for any i64 total.
    let mut parts: Vec<Cents> = weights
        .iter()
        .map(|&w| (i128::from(total) * i128::from(w) / weight_sum) as Cents)
        .collect();

    // Each floor drops less than one cent, so the leftover is smaller than the
    // number of weighted parts and a single pass places all of it.
    let mut leftover = total - parts.iter().sum::<Cents>();
    for (part, &w) in parts.iter_mut().zip(weights) {
        if leftover == 0 {
            break;
        }
        if w > 0 {
            *part += 1;
            leftover -= 1;
        }
    }

    Ok(parts)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitError {
    NoParticipants,
    NegativeTotal(Cents),
}

impl fmt::Display for SplitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitError::NoParticipants => write!(f, "nobody to split the amount between"),
            SplitError::NegativeTotal(total) => {
                write!(f, "cannot split a negative amount ({})", format_cents(*total))
            }
        }
    }
}

impl std::error::Error for SplitError {}
