//! Ranked bar chart of the top customers using Plotters

use crate::config::CurrencyFormat;
use crate::model::{sort_by_total_spend, CustomerAggregate};
use log::info;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

/// Bar color of the original dashboard (#2ecc71)
const BAR_COLOR: RGBColor = RGBColor(46, 204, 113);

const CHART_WIDTH: u32 = 1400;
const ROW_HEIGHT: u32 = 22;
const MIN_CHART_HEIGHT: u32 = 300;

/// One bar of the ranking, with everything its tooltip shows
#[derive(Debug, Clone, PartialEq)]
pub struct ChartEntry {
    pub customer: String,
    pub phone: String,
    pub total_spend: f64,
    pub average_annual_spend: f64,
    pub active_years: String,
    pub recurrence: u32,
    pub gap_years: u32,
}

impl ChartEntry {
    pub fn from_aggregate(customer: &CustomerAggregate) -> Self {
        Self {
            customer: customer.customer.clone(),
            phone: customer.phone.clone(),
            total_spend: customer.total_spend,
            average_annual_spend: customer.average_annual_spend,
            active_years: customer.active_years_label(),
            recurrence: customer.recurrence,
            gap_years: customer.gap_years,
        }
    }

    /// Tooltip lines, one per derived attribute
    pub fn tooltip(&self, currency: &CurrencyFormat) -> Vec<String> {
        vec![
            format!("Cliente: {}", self.customer),
            format!("Celular: {}", self.phone),
            format!("Total Gasto: {}", currency.format(self.total_spend)),
            format!("Média Anual: {}", currency.format(self.average_annual_spend)),
            format!("Anos Ativos: {}", self.active_years),
            format!("Anos de Compra: {}", self.recurrence),
            format!("Intervalo sem Compra (anos): {}", self.gap_years),
        ]
    }

    /// Compact single-line annotation drawn next to the bar
    fn annotation(&self, currency: &CurrencyFormat) -> String {
        format!(
            "{} | média {} | {} anos ({}) | intervalo {} | {}",
            currency.format(self.total_spend),
            currency.format(self.average_annual_spend),
            self.recurrence,
            self.active_years,
            self.gap_years,
            self.phone
        )
    }
}

/// Top `limit` customers by total spend, largest first
pub fn rank_entries(aggregates: &[CustomerAggregate], limit: usize) -> Vec<ChartEntry> {
    let mut ranked = aggregates.to_vec();
    sort_by_total_spend(&mut ranked);
    ranked
        .iter()
        .take(limit)
        .map(ChartEntry::from_aggregate)
        .collect()
}

/// Render the ranking as a horizontal bar chart
///
/// # Arguments
/// * `entries` - Ranked entries, largest first (see [`rank_entries`])
/// * `output_path` - `.svg` selects the SVG backend, anything else a bitmap
/// * `currency` - Formatting for the axis and annotations
pub fn create_ranking_chart(
    entries: &[ChartEntry],
    output_path: &Path,
    currency: &CurrencyFormat,
) -> crate::Result<()> {
    if entries.is_empty() {
        anyhow::bail!("No customers to chart");
    }

    let height = (entries.len() as u32 * ROW_HEIGHT + 120).max(MIN_CHART_HEIGHT);
    let is_svg = output_path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));

    if is_svg {
        let root = SVGBackend::new(output_path, (CHART_WIDTH, height)).into_drawing_area();
        draw_ranking(&root, entries, currency)?;
    } else {
        let root = BitMapBackend::new(output_path, (CHART_WIDTH, height)).into_drawing_area();
        draw_ranking(&root, entries, currency)?;
    }

    info!("Ranking chart saved to: {}", output_path.display());
    Ok(())
}

fn draw_ranking<DB>(
    root: &DrawingArea<DB, Shift>,
    entries: &[ChartEntry],
    currency: &CurrencyFormat,
) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;

    let count = entries.len();
    let max_total = entries
        .iter()
        .map(|entry| entry.total_spend)
        .fold(0.0_f64, f64::max);
    // Leave room on the right for the annotations
    let x_max = if max_total > 0.0 { max_total * 1.8 } else { 1.0 };

    // Segment `count - 1` is the top row, so rank 0 is drawn first from the top
    let slot = |rank: usize| count - 1 - rank;

    let mut chart = ChartBuilder::on(root)
        .caption(format!("Top {} Clientes", count), ("sans-serif", 28))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(220)
        .build_cartesian_2d(0f64..x_max, (0..count).into_segmented())?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .x_desc(format!("Total Gasto ({})", currency.symbol))
        .y_desc("Cliente")
        .x_label_formatter(&|value: &f64| currency.format(*value))
        .y_labels(count)
        .y_label_formatter(&|value: &SegmentValue<usize>| match value {
            SegmentValue::CenterOf(idx) => count
                .checked_sub(idx + 1)
                .and_then(|rank| entries.get(rank))
                .map(|entry| entry.customer.clone())
                .unwrap_or_default(),
            _ => String::new(),
        })
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(entries.iter().enumerate().map(|(rank, entry)| {
        let mut bar = Rectangle::new(
            [
                (0.0, SegmentValue::Exact(slot(rank))),
                (entry.total_spend.max(0.0), SegmentValue::Exact(slot(rank) + 1)),
            ],
            BAR_COLOR.filled(),
        );
        bar.set_margin(3, 3, 0, 0);
        bar
    }))?;

    chart.draw_series(entries.iter().enumerate().map(|(rank, entry)| {
        Text::new(
            entry.annotation(currency),
            (
                entry.total_spend.max(0.0) + x_max * 0.01,
                SegmentValue::CenterOf(slot(rank)),
            ),
            ("sans-serif", 12).into_font(),
        )
    }))?;

    root.present()?;
    Ok(())
}
