//! Locale-aware currency formatting

use crate::config::CurrencyFormat;
use num_format::{CustomFormat, Grouping, ToFormattedString};

impl CurrencyFormat {
    /// Format a value as `<symbol><sign><grouped integer><decimal sep><fraction>`.
    ///
    /// With the default Brazilian conventions `1234567.891` becomes
    /// `R$1.234.567,89` and `-50.0` becomes `R$-50,00`.
    ///
    /// Rounding works on the exact decimal expansion of `value`, so large
    /// totals keep every digit. Infinities and NaN render as `R$inf`,
    /// `R$-inf` and `R$NaN`.
    pub fn format(&self, value: f64) -> String {
        if !value.is_finite() {
            return format!("{}{}", self.symbol, value);
        }

        let fixed = format!("{:.*}", self.decimals as usize, value.abs());
        let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
        let is_zero = fixed.bytes().all(|b| b == b'0' || b == b'.');
        let sign = if value < 0.0 && !is_zero { "-" } else { "" };

        let mut out = format!("{}{}{}", self.symbol, sign, self.group_digits(integer));
        if !fraction.is_empty() {
            out.push(self.decimal_separator);
            out.push_str(fraction);
        }
        out
    }

    /// Undo [`CurrencyFormat::format`], recovering the numeric value.
    pub fn parse(&self, text: &str) -> crate::Result<f64> {
        let trimmed = text.trim();
        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };
        let rest = rest.strip_prefix(self.symbol.as_str()).unwrap_or(rest).trim();
        let (negative, rest) = match rest.strip_prefix('-') {
            Some(inner) => (true, inner),
            None => (negative, rest),
        };

        let normalized: String = rest
            .chars()
            .filter(|&c| c != self.thousands_separator)
            .map(|c| if c == self.decimal_separator { '.' } else { c })
            .collect();

        let value: f64 = normalized
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid currency value: {}", text))?;

        Ok(if negative { -value } else { value })
    }

    /// Group a run of ASCII digits; digits past `u128` stay ungrouped
    fn group_digits(&self, digits: &str) -> String {
        let format = CustomFormat::builder()
            .grouping(Grouping::Standard)
            .separator(self.thousands_separator.to_string())
            .build();

        match (digits.parse::<u128>(), format) {
            (Ok(integer), Ok(format)) => integer.to_formatted_string(&format),
            _ => digits.to_string(),
        }
    }
}
