//! Human-readable number formatting for summary mirrors

/// `$1.23M`-style currency figure
pub fn format_usd(value: f64) -> String {
    if value < 0.0 {
        return format!("-{}", format_usd(-value));
    }
    format!("${}", format_compact(value))
}

/// Compact magnitude with K/M/B/T suffix and two decimals
pub fn format_compact(value: f64) -> String {
    if !value.is_finite() {
        return "n/a".to_string();
    }
    let abs = value.abs();
    let (scaled, suffix) = if abs >= 1e12 {
        (value / 1e12, "T")
    } else if abs >= 1e9 {
        (value / 1e9, "B")
    } else if abs >= 1e6 {
        (value / 1e6, "M")
    } else if abs >= 1e3 {
        (value / 1e3, "K")
    } else {
        (value, "")
    };
    format!("{:.2}{}", scaled, suffix)
}

/// Thousands-separated integer
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Signed percentage with four decimals
pub fn format_percent(value: f64) -> String {
    format!("{:+.4}%", value)
}
