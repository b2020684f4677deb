//! cohortlens: customer recurrence report
//!
//! This is the main entrypoint that orchestrates loading, aggregation,
//! filtering and the report outputs (metrics, table, chart, export).

use anyhow::Result;
use clap::Parser;
use cohortlens::{
    build_report, create_ranking_chart, export_csv, load_transactions, rank_entries, render_table,
    Args, FilterCriteria, IngestError, Profile, Report, ReportConfig, Transactions,
};
use log::{info, warn, LevelFilter};
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

/// Shown when no spreadsheet was given
const UPLOAD_PROMPT: &str = "Envie uma planilha Excel com os dados dos seus clientes.";

fn main() -> Result<ExitCode> {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose);

    let config = args.report_config()?;

    let transactions = match open_upload(args.input.as_deref(), args.sheet.as_deref())? {
        Upload::Loaded(transactions) => transactions,
        Upload::Missing => {
            println!("{}", UPLOAD_PROMPT);
            return Ok(ExitCode::SUCCESS);
        }
        Upload::Rejected(message) => {
            eprintln!("{}", message);
            return Ok(ExitCode::FAILURE);
        }
    };
    report_data_quality(&transactions);

    if args.list_filters {
        print_filter_options(&transactions, &config)?;
    } else {
        run_report(&args, &config, &transactions)?;
    }

    Ok(ExitCode::SUCCESS)
}

/// Outcome of reading the user's spreadsheet
enum Upload {
    Loaded(Transactions),
    /// No file was given
    Missing,
    /// The sheet cannot be used; the message is shown as-is
    Rejected(String),
}

fn open_upload(input: Option<&Path>, sheet: Option<&str>) -> Result<Upload> {
    let Some(path) = input else {
        return Ok(Upload::Missing);
    };

    match load_transactions(path, sheet) {
        Ok(transactions) => Ok(Upload::Loaded(transactions)),
        Err(err) => match err.downcast_ref::<IngestError>() {
            Some(IngestError::MissingColumns(_)) => Ok(Upload::Rejected(err.to_string())),
            _ => Err(err),
        },
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn report_data_quality(transactions: &Transactions) {
    let quality = transactions.quality();
    if !quality.has_issues() {
        return;
    }
    if quality.skipped_rows > 0 {
        warn!("{} row(s) without a customer were skipped", quality.skipped_rows);
    }
    if quality.coerced_sales > 0 {
        warn!(
            "{} non-numeric sale amount(s) were treated as missing",
            quality.coerced_sales
        );
    }
    if quality.coerced_years > 0 {
        warn!(
            "{} invalid year(s) were treated as missing",
            quality.coerced_years
        );
    }
    if quality.lossy_rows > 0 {
        warn!(
            "{} row(s) were not valid UTF-8; unreadable characters were replaced",
            quality.lossy_rows
        );
    }
}

/// Print the values each filter accepts
fn print_filter_options(transactions: &Transactions, config: &ReportConfig) -> Result<()> {
    let report = build_report(transactions, config, &FilterCriteria::default())?;
    let bounds = &report.bounds;

    println!("=== Filtros ===");
    println!("Clientes ({}):", bounds.customers.len());
    for customer in &bounds.customers {
        println!("  {}", customer);
    }
    println!(
        "Recorrência (anos): {} a {}",
        bounds.min_recurrence, bounds.max_recurrence
    );
    println!(
        "Anos: {}",
        bounds
            .years
            .iter()
            .map(|year| year.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Perfis:");
    for profile in [
        Profile::None,
        Profile::LoyalProfitable,
        Profile::MediumLoyal,
        Profile::Top,
    ] {
        match profile.criteria(&config.rules, &config.currency) {
            Some(criteria) => println!("  {}: {}", profile, criteria),
            None => println!("  {}", profile),
        }
    }

    Ok(())
}

/// Run the full report for the selected filters
fn run_report(args: &Args, config: &ReportConfig, transactions: &Transactions) -> Result<()> {
    let start_time = Instant::now();

    // Filter defaults come from the data, so aggregate once unfiltered first
    let unfiltered = build_report(transactions, config, &FilterCriteria::default())?;
    let criteria = args.filter_criteria(&unfiltered.bounds)?;
    let report = build_report(transactions, config, &criteria)?;

    info!(
        "Loaded {} transactions for {} customers",
        transactions.len(),
        report.customers.len()
    );
    if let Some(rule) = criteria.profile.criteria(&config.rules, &config.currency) {
        info!("Perfil '{}': {}", criteria.profile, rule);
    }

    print_metrics(&report, config);

    println!("\n=== Tabela de Clientes ===");
    print!("{}", render_table(&report.filtered, &config.currency));

    if !args.no_chart {
        write_chart(args, config, &report)?;
    }

    if !args.no_export {
        write_export(args, config, &report)?;
    }

    info!(
        "Report complete in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

fn print_metrics(report: &Report, config: &ReportConfig) {
    println!("=== Métricas Gerais ===");
    println!("{}", report.summary.render(&config.currency));
}

fn write_chart(args: &Args, config: &ReportConfig, report: &Report) -> Result<()> {
    let entries = rank_entries(&report.filtered, config.chart_limit);
    if entries.is_empty() {
        info!("No customers match the filters; chart skipped");
        return Ok(());
    }
    create_ranking_chart(&entries, &args.chart, &config.currency)?;
    println!("\nTop {} chart saved to: {}", entries.len(), args.chart.display());
    Ok(())
}

fn write_export(args: &Args, config: &ReportConfig, report: &Report) -> Result<()> {
    if report.filtered.is_empty() {
        info!("No customers match the filters; export skipped");
        return Ok(());
    }
    let bytes = export_csv(&report.filtered, &config.currency)?;
    std::fs::write(&args.export, bytes)?;
    println!("Export saved to: {}", args.export.display());
    Ok(())
}
