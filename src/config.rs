//! Immutable report configuration
//!
//! Everything the aggregation, segmentation and presentation steps need is
//! passed explicitly through these values. Nothing is read from global state.

/// Default spend a customer must exceed to be a top client
pub const DEFAULT_TOP_SPEND_THRESHOLD: f64 = 200_000.0;

/// Default recurrence a customer must exceed to count as loyal
pub const DEFAULT_RECURRENCE_THRESHOLD: u32 = 4;

/// Years that make a customer "recent" regardless of recurrence
pub const DEFAULT_RECENT_YEARS: [i32; 2] = [2024, 2025];

/// Number of customers shown in the ranked chart
pub const DEFAULT_CHART_LIMIT: usize = 50;

/// Placeholder used when a customer has no phone number
pub const MISSING_PHONE: &str = "-";

/// Threshold rules used to classify customers into profiles
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRules {
    /// Total spend a top client must exceed
    pub top_spend_threshold: f64,
    /// Recurrence (distinct active years) a loyal customer must exceed
    pub recurrence_threshold: u32,
    /// A purchase in any of these years also counts as loyalty
    pub recent_years: Vec<i32>,
}

impl Default for SegmentRules {
    fn default() -> Self {
        Self {
            top_spend_threshold: DEFAULT_TOP_SPEND_THRESHOLD,
            recurrence_threshold: DEFAULT_RECURRENCE_THRESHOLD,
            recent_years: DEFAULT_RECENT_YEARS.to_vec(),
        }
    }
}

/// Currency rendering conventions
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyFormat {
    pub symbol: String,
    pub thousands_separator: char,
    pub decimal_separator: char,
    pub decimals: u32,
}

impl Default for CurrencyFormat {
    /// Brazilian real: `R$1.234,56`
    fn default() -> Self {
        Self {
            symbol: "R$".to_string(),
            thousands_separator: '.',
            decimal_separator: ',',
            decimals: 2,
        }
    }
}

/// Full configuration for one report render
#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    pub rules: SegmentRules,
    pub currency: CurrencyFormat,
    pub chart_limit: usize,
    pub missing_phone: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            rules: SegmentRules::default(),
            currency: CurrencyFormat::default(),
            chart_limit: DEFAULT_CHART_LIMIT,
            missing_phone: MISSING_PHONE.to_string(),
        }
    }
}
