//! Per-customer aggregation of transaction rows

use crate::config::ReportConfig;
use crate::data::{Transactions, CUSTOMER_COLUMN, PHONE_COLUMN, SALE_COLUMN, YEAR_COLUMN};
use log::{debug, warn};
use polars::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeSet;

const TOTAL_SPEND_ALIAS: &str = "total_spend";
const YEARS_ALIAS: &str = "active_years";
const PHONE_ALIAS: &str = "phone";

/// Derived metrics for one customer
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerAggregate {
    pub customer: String,
    /// Distinct years with at least one transaction, ascending
    pub active_years: Vec<i32>,
    /// Number of distinct active years
    pub recurrence: u32,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
    /// Years inside the active span without any transaction
    pub gap_years: u32,
    pub total_spend: f64,
    /// Total spend divided by recurrence; 0 when no year was recorded
    pub average_annual_spend: f64,
    /// First non-null phone seen, or the configured placeholder
    pub phone: String,
}

impl CustomerAggregate {
    /// Build an aggregate from a customer's distinct years and total spend
    pub fn new(customer: String, years: BTreeSet<i32>, total_spend: f64, phone: String) -> Self {
        let active_years: Vec<i32> = years.into_iter().collect();
        let recurrence = active_years.len() as u32;
        let first_year = active_years.first().copied();
        let last_year = active_years.last().copied();

        let gap_years = match (first_year, last_year) {
            (Some(first), Some(last)) => {
                // Spans past u32::MAX (years across the whole i32 range) saturate
                let span = u32::try_from(i64::from(last) - i64::from(first) + 1)
                    .unwrap_or(u32::MAX);
                span.saturating_sub(recurrence)
            }
            _ => 0,
        };

        let average_annual_spend = if recurrence == 0 {
            0.0
        } else {
            total_spend / f64::from(recurrence)
        };

        Self {
            customer,
            active_years,
            recurrence,
            first_year,
            last_year,
            gap_years,
            total_spend,
            average_annual_spend,
            phone,
        }
    }

    /// Active years joined as `2021, 2023, 2024`
    pub fn active_years_label(&self) -> String {
        self.active_years
            .iter()
            .map(|year| year.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn is_active_in(&self, year: i32) -> bool {
        self.active_years.binary_search(&year).is_ok()
    }
}

/// Group transactions by customer and derive recurrence and spend metrics
///
/// # Returns
/// * One `CustomerAggregate` per distinct customer, sorted by total spend
///   descending (ties broken by customer name)
pub fn aggregate_customers(
    transactions: &Transactions,
    config: &ReportConfig,
) -> crate::Result<Vec<CustomerAggregate>> {
    let mut aggregations = vec![
        col(SALE_COLUMN).sum().alias(TOTAL_SPEND_ALIAS),
        col(YEAR_COLUMN).drop_nulls().unique().alias(YEARS_ALIAS),
    ];
    if transactions.has_phone() {
        aggregations.push(col(PHONE_COLUMN).drop_nulls().first().alias(PHONE_ALIAS));
    }

    let grouped = transactions
        .frame()
        .clone()
        .lazy()
        .group_by([col(CUSTOMER_COLUMN)])
        .agg(aggregations)
        .collect()?;

    let customers = grouped.column(CUSTOMER_COLUMN)?.str()?;
    let totals = grouped.column(TOTAL_SPEND_ALIAS)?.f64()?;
    let years = grouped.column(YEARS_ALIAS)?.list()?;
    let phones = if transactions.has_phone() {
        Some(grouped.column(PHONE_ALIAS)?.str()?)
    } else {
        None
    };

    let mut aggregates = Vec::with_capacity(grouped.height());
    for idx in 0..grouped.height() {
        let Some(customer) = customers.get(idx) else {
            continue;
        };

        let active_years: BTreeSet<i32> = match years.get_as_series(idx) {
            Some(series) => series.i32()?.into_iter().flatten().collect(),
            None => BTreeSet::new(),
        };
        let total_spend = totals.get(idx).unwrap_or(0.0);
        let phone = phones
            .and_then(|phones| phones.get(idx))
            .map(str::to_string)
            .unwrap_or_else(|| config.missing_phone.clone());

        aggregates.push(CustomerAggregate::new(
            customer.to_string(),
            active_years,
            total_spend,
            phone,
        ));
    }

    sort_by_total_spend(&mut aggregates);

    let without_years = aggregates.iter().filter(|c| c.recurrence == 0).count();
    if without_years > 0 {
        warn!(
            "{} customer(s) have no valid year; their average annual spend is reported as 0",
            without_years
        );
    }
    debug!(
        "Aggregated {} transactions into {} customers",
        transactions.len(),
        aggregates.len()
    );

    Ok(aggregates)
}

/// Sort descending by total spend, ascending by customer name on ties
pub fn sort_by_total_spend(aggregates: &mut [CustomerAggregate]) {
    aggregates.sort_by(|a, b| {
        b.total_spend
            .partial_cmp(&a.total_spend)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.customer.cmp(&b.customer))
    });
}

/// Mean total spend over a set of customers (0 for an empty set)
pub fn mean_total_spend(aggregates: &[CustomerAggregate]) -> f64 {
    if aggregates.is_empty() {
        return 0.0;
    }
    aggregates.iter().map(|c| c.total_spend).sum::<f64>() / aggregates.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Cell;

    fn transactions(rows: &[(&str, Option<f64>, Option<i32>)]) -> Transactions {
        let headers: Vec<String> = ["Cliente", "Vendas", "Ano"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let rows: Vec<Vec<Cell>> = rows
            .iter()
            .map(|(customer, sale, year)| {
                vec![
                    Cell::Text(customer.to_string()),
                    sale.map(Cell::Number).unwrap_or(Cell::Empty),
                    year.map(|y| Cell::Number(f64::from(y))).unwrap_or(Cell::Empty),
                ]
            })
            .collect();
        Transactions::from_table(&headers, &rows).unwrap()
    }

    #[test]
    fn test_aggregate_example() {
        let data = transactions(&[
            ("A", Some(100.0), Some(2023)),
            ("A", Some(50.0), Some(2024)),
            ("B", Some(30.0), Some(2022)),
        ]);

        let aggregates = aggregate_customers(&data, &ReportConfig::default()).unwrap();
        assert_eq!(aggregates.len(), 2);

        let a = &aggregates[0];
        assert_eq!(a.customer, "A");
        assert_eq!(a.total_spend, 150.0);
        assert_eq!(a.recurrence, 2);
        assert_eq!(a.active_years_label(), "2023, 2024");
        assert_eq!(a.gap_years, 0);
        assert_eq!(a.average_annual_spend, 75.0);
        assert_eq!(a.phone, "-");

        let b = &aggregates[1];
        assert_eq!(b.customer, "B");
        assert_eq!(b.total_spend, 30.0);
        assert_eq!(b.recurrence, 1);
        assert_eq!(b.active_years_label(), "2022");
        assert_eq!(b.gap_years, 0);
    }

    #[test]
    fn test_gap_years_and_duplicates() {
        let data = transactions(&[
            ("C", Some(10.0), Some(2019)),
            ("C", Some(10.0), Some(2019)),
            ("C", Some(10.0), Some(2023)),
            ("C", None, Some(2021)),
        ]);

        let aggregates = aggregate_customers(&data, &ReportConfig::default()).unwrap();
        let c = &aggregates[0];
        assert_eq!(c.active_years, vec![2019, 2021, 2023]);
        assert_eq!(c.recurrence, 3);
        assert_eq!(c.first_year, Some(2019));
        assert_eq!(c.last_year, Some(2023));
        assert_eq!(c.gap_years, 2);
        assert_eq!(c.total_spend, 30.0);
        assert!(c.is_active_in(2021));
        assert!(!c.is_active_in(2020));
    }

    #[test]
    fn test_customer_without_years_is_guarded() {
        let data = transactions(&[("D", Some(80.0), None)]);

        let aggregates = aggregate_customers(&data, &ReportConfig::default()).unwrap();
        let d = &aggregates[0];
        assert_eq!(d.recurrence, 0);
        assert_eq!(d.first_year, None);
        assert_eq!(d.gap_years, 0);
        assert_eq!(d.total_spend, 80.0);
        assert_eq!(d.average_annual_spend, 0.0);
    }

    #[test]
    fn test_total_spend_is_preserved() {
        let data = transactions(&[
            ("A", Some(12.5), Some(2020)),
            ("B", None, Some(2021)),
            ("C", Some(7.25), Some(2022)),
            ("A", Some(0.25), Some(2024)),
        ]);

        let aggregates = aggregate_customers(&data, &ReportConfig::default()).unwrap();
        let aggregated: f64 = aggregates.iter().map(|c| c.total_spend).sum();
        assert_eq!(aggregated, data.total_sales().unwrap());
        assert!(aggregates.iter().all(|c| c.recurrence >= 1));
    }

    #[test]
    fn test_first_phone_wins() {
        let headers: Vec<String> = ["Cliente", "Vendas", "Ano", "Celular"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let rows = vec![
            vec![Cell::Text("A".into()), Cell::Number(1.0), Cell::Number(2020.0), Cell::Empty],
            vec![
                Cell::Text("A".into()),
                Cell::Number(1.0),
                Cell::Number(2021.0),
                Cell::Text("1111".into()),
            ],
            vec![
                Cell::Text("A".into()),
                Cell::Number(1.0),
                Cell::Number(2022.0),
                Cell::Text("2222".into()),
            ],
            vec![Cell::Text("B".into()), Cell::Number(1.0), Cell::Number(2020.0), Cell::Empty],
        ];
        let data = Transactions::from_table(&headers, &rows).unwrap();

        let aggregates = aggregate_customers(&data, &ReportConfig::default()).unwrap();
        assert_eq!(aggregates[0].customer, "A");
        assert_eq!(aggregates[0].phone, "1111");
        assert_eq!(aggregates[1].phone, "-");
    }

    #[test]
    fn test_gap_years_saturate_on_extreme_span() {
        let extreme = CustomerAggregate::new(
            "E".into(),
            BTreeSet::from([i32::MIN, i32::MAX]),
            1.0,
            "-".into(),
        );
        assert_eq!(extreme.recurrence, 2);
        assert_eq!(extreme.gap_years, u32::MAX - 2);

        let wide = CustomerAggregate::new("W".into(), BTreeSet::from([0, 1_000_000]), 1.0, "-".into());
        assert_eq!(wide.gap_years, 999_999);
    }

    #[test]
    fn test_mean_total_spend() {
        assert_eq!(mean_total_spend(&[]), 0.0);

        let set = vec![
            CustomerAggregate::new("A".into(), BTreeSet::from([2020]), 10.0, "-".into()),
            CustomerAggregate::new("B".into(), BTreeSet::from([2021]), 30.0, "-".into()),
        ];
        assert_eq!(mean_total_spend(&set), 20.0);
    }
}
