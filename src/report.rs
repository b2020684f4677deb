//! Summary metrics, customer table and delimited export

use crate::config::{CurrencyFormat, ReportConfig};
use crate::data::Transactions;
use crate::filter::{apply_filters, FilterBounds, FilterCriteria};
use crate::model::{aggregate_customers, mean_total_spend, sort_by_total_spend, CustomerAggregate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Read;

/// Byte-order mark prepended to exports so spreadsheet tools detect UTF-8
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Default file name offered for the export
pub const EXPORT_FILE_NAME: &str = "clientes.csv";

const EXPORT_DELIMITER: u8 = b';';

const TABLE_HEADERS: [&str; 7] = [
    "Cliente",
    "Celular",
    "Total Gasto",
    "Recorrência",
    "Média Anual",
    "Anos Ativos",
    "Intervalo Sem Compra",
];
const TABLE_RIGHT_ALIGNED: [bool; 7] = [false, false, true, true, true, false, true];

/// Headline metrics over a customer set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    /// Distinct customers
    pub customer_count: usize,
    pub total_spend: f64,
    /// Mean recurrence in years (0 for an empty set)
    pub mean_recurrence: f64,
}

impl Summary {
    pub fn compute(customers: &[CustomerAggregate]) -> Self {
        let distinct: BTreeSet<&str> = customers.iter().map(|c| c.customer.as_str()).collect();
        let total_spend = customers.iter().map(|c| c.total_spend).sum();
        let mean_recurrence = if customers.is_empty() {
            0.0
        } else {
            customers.iter().map(|c| f64::from(c.recurrence)).sum::<f64>() / customers.len() as f64
        };

        Self {
            customer_count: distinct.len(),
            total_spend,
            mean_recurrence,
        }
    }

    pub fn render(&self, currency: &CurrencyFormat) -> String {
        format!(
            "Qt. de Clientes: {}\nTotal Geral Gasto: {}\nRecorrência Média: {:.2} anos",
            self.customer_count,
            currency.format(self.total_spend),
            self.mean_recurrence
        )
    }
}

/// Everything one render of the report needs
#[derive(Debug, Clone)]
pub struct Report {
    /// Every customer, sorted by total spend descending
    pub customers: Vec<CustomerAggregate>,
    /// Customers left after filtering, same order
    pub filtered: Vec<CustomerAggregate>,
    /// Filter options derived from the data
    pub bounds: FilterBounds,
    /// Mean total spend of the unfiltered set
    pub mean_spend: f64,
    /// Metrics over `filtered`
    pub summary: Summary,
}

/// Aggregate, filter and summarize one upload
///
/// Pure with respect to its inputs: re-rendering after a filter change is
/// just another call with new criteria.
pub fn build_report(
    transactions: &Transactions,
    config: &ReportConfig,
    criteria: &FilterCriteria,
) -> crate::Result<Report> {
    let customers = aggregate_customers(transactions, config)?;
    let bounds = FilterBounds::from_data(transactions, &customers)?;
    let filtered = apply_filters(&customers, criteria, &config.rules);
    let summary = Summary::compute(&filtered);

    Ok(Report {
        mean_spend: mean_total_spend(&customers),
        customers,
        filtered,
        bounds,
        summary,
    })
}

/// Fixed-width text table sorted by total spend descending
pub fn render_table(customers: &[CustomerAggregate], currency: &CurrencyFormat) -> String {
    let mut sorted = customers.to_vec();
    sort_by_total_spend(&mut sorted);

    let rows: Vec<[String; 7]> = sorted
        .iter()
        .map(|c| {
            [
                c.customer.clone(),
                c.phone.clone(),
                currency.format(c.total_spend),
                c.recurrence.to_string(),
                currency.format(c.average_annual_spend),
                c.active_years_label(),
                c.gap_years.to_string(),
            ]
        })
        .collect();

    let mut widths = TABLE_HEADERS.map(|header| header.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_table_row(&mut out, &TABLE_HEADERS.map(String::from), &widths);
    let separator: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    out.push_str(&separator.join("-+-"));
    out.push('\n');
    for row in &rows {
        push_table_row(&mut out, row, &widths);
    }
    out
}

fn push_table_row(out: &mut String, cells: &[String; 7], widths: &[usize; 7]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths.iter())
        .zip(TABLE_RIGHT_ALIGNED.iter())
        .map(|((cell, &width), &right)| {
            if right {
                format!("{:>width$}", cell, width = width)
            } else {
                format!("{:<width$}", cell, width = width)
            }
        })
        .collect();
    out.push_str(line.join(" | ").trim_end());
    out.push('\n');
}

/// One line of the delimited export, currency already formatted
#[derive(Debug, Serialize, Deserialize)]
struct ExportRow {
    #[serde(rename = "Cliente")]
    customer: String,
    #[serde(rename = "Primeiro Ano")]
    first_year: Option<i32>,
    #[serde(rename = "Último Ano")]
    last_year: Option<i32>,
    #[serde(rename = "Total Gasto")]
    total_spend: String,
    #[serde(rename = "Recorrência")]
    recurrence: u32,
    #[serde(rename = "Média Anual")]
    average_annual_spend: String,
    #[serde(rename = "Anos Ativos")]
    active_years: String,
    #[serde(rename = "Intervalo Sem Compra")]
    gap_years: u32,
    #[serde(rename = "Celular")]
    phone: String,
}

impl ExportRow {
    fn from_aggregate(customer: &CustomerAggregate, currency: &CurrencyFormat) -> Self {
        Self {
            customer: customer.customer.clone(),
            first_year: customer.first_year,
            last_year: customer.last_year,
            total_spend: currency.format(customer.total_spend),
            recurrence: customer.recurrence,
            average_annual_spend: currency.format(customer.average_annual_spend),
            active_years: customer.active_years_label(),
            gap_years: customer.gap_years,
            phone: customer.phone.clone(),
        }
    }
}

/// A customer read back from an export, currency values parsed
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRecord {
    pub customer: String,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
    pub total_spend: f64,
    pub recurrence: u32,
    pub average_annual_spend: f64,
    pub active_years: String,
    pub gap_years: u32,
    pub phone: String,
}

/// Semicolon-delimited UTF-8 export (with BOM), one row per customer
pub fn export_csv(
    customers: &[CustomerAggregate],
    currency: &CurrencyFormat,
) -> crate::Result<Vec<u8>> {
    let mut buffer = UTF8_BOM.to_vec();
    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(EXPORT_DELIMITER)
            .from_writer(&mut buffer);
        for customer in customers {
            writer.serialize(ExportRow::from_aggregate(customer, currency))?;
        }
        writer.flush()?;
    }
    Ok(buffer)
}

/// Parse an export produced by [`export_csv`]
pub fn read_export<R: Read>(
    mut reader: R,
    currency: &CurrencyFormat,
) -> crate::Result<Vec<ExportRecord>> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(EXPORT_DELIMITER)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for row in csv_reader.deserialize::<ExportRow>() {
        let row = row?;
        records.push(ExportRecord {
            total_spend: currency.parse(&row.total_spend)?,
            average_annual_spend: currency.parse(&row.average_annual_spend)?,
            customer: row.customer,
            first_year: row.first_year,
            last_year: row.last_year,
            recurrence: row.recurrence,
            active_years: row.active_years,
            gap_years: row.gap_years,
            phone: row.phone,
        });
    }
    Ok(records)
}
