//! Display strings for KPI cards and chart point labels.

/// Short label for chart points: thousands collapse to `1.2k`, smaller
/// amounts are rounded to whole units.
pub fn compact(value: f64, currency: bool) -> String {
    if value >= 1000.0 {
        format!("{:.1}k", value / 1000.0)
    } else if currency {
        format!("${:.0}", value)
    } else {
        format!("{:.0}", value)
    }
}

/// Brazilian real notation: `R$ 1.234,56`.
pub fn brl(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (units, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, digit) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("R$ {}{},{}", sign, grouped, cents)
}

pub fn ratio_2dp(value: f64) -> String {
    format!("{:.2}", value)
}
