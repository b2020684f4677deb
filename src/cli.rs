//! Command-line interface definitions and argument parsing

use crate::config::{
    CurrencyFormat, ReportConfig, SegmentRules, DEFAULT_CHART_LIMIT, DEFAULT_RECURRENCE_THRESHOLD,
    DEFAULT_TOP_SPEND_THRESHOLD, MISSING_PHONE,
};
use crate::filter::{FilterBounds, FilterCriteria};
use crate::segment::Profile;
use clap::Parser;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Customer recurrence report: per-customer spend, recurrence and profiles
/// from a sales spreadsheet
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input spreadsheet (xlsx, xlsm, xlsb, xls, ods or csv);
    /// without one only the upload prompt is shown
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Worksheet to read (defaults to the first sheet)
    #[arg(long)]
    pub sheet: Option<String>,

    /// Only show this customer
    #[arg(short, long)]
    pub customer: Option<String>,

    /// Minimum recurrence in years (defaults to the lowest in the data)
    #[arg(long)]
    pub min_recurrence: Option<u32>,

    /// Maximum recurrence in years (defaults to the highest in the data)
    #[arg(long)]
    pub max_recurrence: Option<u32>,

    /// Purchase years to keep, comma-separated (defaults to every year)
    /// Example: --years "2023,2024"
    #[arg(short, long)]
    pub years: Option<String>,

    /// Customer profile to select
    #[arg(short, long, value_enum, default_value_t = Profile::None)]
    pub profile: Profile,

    /// Years in which a purchase counts as loyalty, comma-separated
    #[arg(long, default_value = "2024,2025")]
    pub recent_years: String,

    /// Total spend a top client must exceed
    #[arg(long, default_value_t = DEFAULT_TOP_SPEND_THRESHOLD)]
    pub top_threshold: f64,

    /// Recurrence a loyal customer must exceed
    #[arg(long, default_value_t = DEFAULT_RECURRENCE_THRESHOLD)]
    pub recurrence_threshold: u32,

    /// Currency symbol used in formatted values
    #[arg(long, default_value = "R$")]
    pub currency_symbol: String,

    /// Thousands separator used in formatted values
    #[arg(long, default_value_t = '.')]
    pub thousands_separator: char,

    /// Decimal separator used in formatted values
    #[arg(long, default_value_t = ',')]
    pub decimal_separator: char,

    /// Output path for the ranking chart (.png or .svg)
    #[arg(long, default_value = "top_clientes.png")]
    pub chart: PathBuf,

    /// Number of customers in the ranking chart
    #[arg(long, default_value_t = DEFAULT_CHART_LIMIT)]
    pub chart_limit: usize,

    /// Output path for the semicolon-delimited export
    #[arg(short, long, default_value = crate::report::EXPORT_FILE_NAME)]
    pub export: PathBuf,

    /// Skip the ranking chart
    #[arg(long)]
    pub no_chart: bool,

    /// Skip the CSV export
    #[arg(long)]
    pub no_export: bool,

    /// Print the available filter values and exit
    #[arg(long)]
    pub list_filters: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse a comma-separated list of years
    /// Expected format: "2023,2024"
    pub fn parse_years(value: &str) -> crate::Result<BTreeSet<i32>> {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<i32>()
                    .map_err(|_| anyhow::anyhow!("Invalid year value: {}", part))
            })
            .collect()
    }

    /// Immutable configuration for this run
    pub fn report_config(&self) -> crate::Result<ReportConfig> {
        if self.thousands_separator == self.decimal_separator {
            anyhow::bail!("Thousands and decimal separators must differ");
        }

        Ok(ReportConfig {
            rules: SegmentRules {
                top_spend_threshold: self.top_threshold,
                recurrence_threshold: self.recurrence_threshold,
                recent_years: Self::parse_years(&self.recent_years)?.into_iter().collect(),
            },
            currency: CurrencyFormat {
                symbol: self.currency_symbol.clone(),
                thousands_separator: self.thousands_separator,
                decimal_separator: self.decimal_separator,
                ..CurrencyFormat::default()
            },
            chart_limit: self.chart_limit,
            missing_phone: MISSING_PHONE.to_string(),
        })
    }

    /// Filter selections, with unset bounds taken from the data
    pub fn filter_criteria(&self, bounds: &FilterBounds) -> crate::Result<FilterCriteria> {
        let min = self.min_recurrence.unwrap_or(bounds.min_recurrence);
        let max = self.max_recurrence.unwrap_or(bounds.max_recurrence);
        if min > max {
            anyhow::bail!(
                "Minimum recurrence ({}) is greater than maximum recurrence ({})",
                min,
                max
            );
        }

        // Selecting every available year is the same as not filtering by year
        let years = match &self.years {
            Some(value) => Some(Self::parse_years(value)?)
                .filter(|years| !bounds.covers_all_years(years)),
            None => None,
        };

        Ok(FilterCriteria {
            customer: self.customer.clone(),
            recurrence: Some(min..=max),
            years,
            profile: self.profile,
        })
    }
}
