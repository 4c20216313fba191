use serde::{Deserialize, Serialize};

/// Result of one full ERC-20 balance read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    /// Base-10 integer amount in the token's smallest unit.
    pub raw_amount: String,
    /// `raw_amount` scaled by `decimals`, exact.
    pub formatted_amount: String,
    pub decimals: u8,
    pub symbol: String,
    pub name: String,
}

impl TokenBalance {
    pub fn is_zero(&self) -> bool {
        self.raw_amount.bytes().all(|b| b == b'0')
    }

    /// Rounded amount for display, see [`display_amount`].
    pub fn display(&self) -> String {
        display_amount(&self.formatted_amount)
    }
}

// ── Exact formatting ─────────────────────────────────────────────────

/// Scale a base-10 integer string by `10^decimals` without going through
/// floating point. Always keeps at least one fractional digit, so one whole
/// token at 18 decimals formats as `"1.0"`.
///
/// Returns `None` if `raw` is not a plain unsigned integer.
pub fn format_units(raw: &str, decimals: u8) -> Option<String> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = raw.trim_start_matches('0');
    let decimals = decimals as usize;

    let (whole, frac) = if digits.len() > decimals {
        digits.split_at(digits.len() - decimals)
    } else {
        ("", digits)
    };
    let whole = if whole.is_empty() { "0" } else { whole };

    let mut frac = format!("{frac:0>decimals$}");
    while frac.len() > 1 && frac.ends_with('0') {
        frac.pop();
    }
    if frac.is_empty() {
        frac.push('0');
    }
    Some(format!("{whole}.{frac}"))
}

// ── Display formatting ───────────────────────────────────────────────

/// Round an exact decimal string for display.
///
/// - below 0.000001: up to 12 decimals
/// - below 1: up to 8 decimals
/// - otherwise: thousands separators, up to 6 decimals
///
/// Trailing zeros are trimmed. Zero and unparseable input display as `"0"`.
pub fn display_amount(formatted: &str) -> String {
    let value: f64 = match formatted.replace(',', "").parse() {
        Ok(v) if v > 0.0 && f64::is_finite(v) => v,
        _ => return "0".to_string(),
    };

    if value < 0.000001 {
        trim_zeros(format!("{value:.12}"))
    } else if value < 1.0 {
        trim_zeros(format!("{value:.8}"))
    } else {
        let fixed = trim_zeros(format!("{value:.6}"));
        let (whole, frac) = match fixed.split_once('.') {
            Some((w, f)) => (w.to_string(), Some(f.to_string())),
            None => (fixed, None),
        };
        let grouped = group_thousands(&whole);
        match frac {
            Some(f) => format!("{grouped}.{f}"),
            None => grouped,
        }
    }
}

/// USD value of a balance at `price_usd`, two decimals.
pub fn usd_value(formatted: &str, price_usd: f64) -> String {
    let amount: f64 = formatted.replace(',', "").parse().unwrap_or(0.0);
    format!("{:.2}", amount * price_usd)
}

fn trim_zeros(s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn group_thousands(whole: &str) -> String {
    let mut out = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
