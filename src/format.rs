//! Display formatting for numbers, money, durations and timestamps.

use chrono::{DateTime, Local, Utc};

/// Separator convention for a locale tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberStyle {
    pub thousands: char,
    pub decimal: char,
}

impl NumberStyle {
    /// Spanish, Portuguese, German and friends group with '.' and use ','
    /// for decimals; everything else gets the English convention.
    pub fn for_locale(locale: &str) -> Self {
        let lang = locale
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match lang.as_str() {
            "es" | "pt" | "de" | "it" | "nl" | "id" => Self { thousands: '.', decimal: ',' },
            _ => Self { thousands: ',', decimal: '.' },
        }
    }
}

pub fn format_number(value: f64, decimals: usize, locale: &str) -> String {
    let style = NumberStyle::for_locale(locale);
    if !value.is_finite() {
        return "-".into();
    }
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(style.thousands);
        }
        grouped.push(c);
    }
    if let Some(f) = frac_part {
        grouped.push(style.decimal);
        grouped.push_str(f);
    }
    // -0 after rounding prints without a sign
    let is_zero = fixed.chars().all(|c| c == '0' || c == '.');
    if value < 0.0 && !is_zero {
        format!("-{grouped}")
    } else {
        grouped
    }
}

pub fn format_count(value: u64, locale: &str) -> String {
    format_number(value as f64, 0, locale)
}

fn currency_decimals(currency: &str) -> usize {
    match currency.to_ascii_uppercase().as_str() {
        "CLP" | "JPY" | "KRW" | "PYG" => 0,
        _ => 2,
    }
}

fn currency_symbol(currency: &str) -> String {
    match currency.to_ascii_uppercase().as_str() {
        "CLP" | "ARS" | "MXN" | "COP" => "$".into(),
        "USD" => "US$".into(),
        "EUR" => "€".into(),
        other => format!("{other} "),
    }
}

pub fn format_currency(value: f64, currency: &str, locale: &str) -> String {
    let digits = format_number(value, currency_decimals(currency), locale);
    let symbol = currency_symbol(currency);
    match digits.strip_prefix('-') {
        Some(rest) => format!("-{symbol}{rest}"),
        None => format!("{symbol}{digits}"),
    }
}

pub fn format_optional_currency(value: Option<f64>, currency: &str, locale: &str) -> String {
    value.map_or_else(|| "-".into(), |v| format_currency(v, currency, locale))
}

/// `ratio` in 0..=1.
pub fn format_percent(ratio: f64, locale: &str) -> String {
    format!("{}%", format_number(ratio * 100.0, 1, locale))
}

/// Compact call duration: `45s`, `3m 05s`, `1h 02m`.
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "-".into();
    }
    let total = seconds.round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

pub fn format_timestamp(ts: Option<&DateTime<Utc>>, locale: &str) -> String {
    let Some(ts) = ts else {
        return "-".into();
    };
    let local = ts.with_timezone(&Local);
    if NumberStyle::for_locale(locale).decimal == ',' {
        local.format("%d-%m-%Y %H:%M").to_string()
    } else {
        local.format("%Y-%m-%d %H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_by_locale() {
        assert_eq!(format_number(1234567.891, 2, "es-CL"), "1.234.567,89");
        assert_eq!(format_number(1234567.891, 2, "en-US"), "1,234,567.89");
        assert_eq!(format_number(999.0, 0, "es-CL"), "999");
        assert_eq!(format_number(1000.0, 0, "es"), "1.000");
        assert_eq!(format_number(-0.001, 2, "en-US"), "0.00");
        assert_eq!(format_count(12000, "en_US"), "12,000");
    }

    #[test]
    fn currency_uses_minor_units_of_the_currency() {
        assert_eq!(format_currency(1500000.4, "CLP", "es-CL"), "$1.500.000");
        assert_eq!(format_currency(-25.5, "USD", "en-US"), "-US$25.50");
        assert_eq!(format_optional_currency(None, "CLP", "es-CL"), "-");
    }

    #[test]
    fn percent_and_duration() {
        assert_eq!(format_percent(0.4567, "es-CL"), "45,7%");
        assert_eq!(format_percent(1.0, "en-US"), "100.0%");
        assert_eq!(format_duration(45.2), "45s");
        assert_eq!(format_duration(185.0), "3m 05s");
        assert_eq!(format_duration(3720.0), "1h 02m");
        assert_eq!(format_duration(f64::NAN), "-");
    }

    #[test]
    fn missing_timestamp() {
        assert_eq!(format_timestamp(None, "es-CL"), "-");
    }
}
