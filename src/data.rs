//! Transaction ingestion into a typed Polars frame
//!
//! Workbooks are read with calamine and delimited text with the csv crate.
//! Both end up as a header row plus loosely typed cells, which are then
//! normalized into a `DataFrame` with the columns `Cliente` (string),
//! `Vendas` (nullable f64), `Ano` (nullable i32) and, when present,
//! `Celular` (nullable string).

use anyhow::Context;
use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::Datelike;
use log::{debug, info};
use polars::prelude::*;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

pub const CUSTOMER_COLUMN: &str = "Cliente";
pub const SALE_COLUMN: &str = "Vendas";
pub const YEAR_COLUMN: &str = "Ano";
pub const PHONE_COLUMN: &str = "Celular";

/// Columns an input sheet must provide
pub const REQUIRED_COLUMNS: [&str; 3] = [CUSTOMER_COLUMN, SALE_COLUMN, YEAR_COLUMN];

/// Prefix given to blank headers by spreadsheet exporters
const UNNAMED_PREFIX: &str = "Unnamed";

/// Byte order mark some tools put in front of UTF-8 text
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

static EMPTY_CELL: Cell = Cell::Empty;

/// Ingestion failures that are reported to the user as-is
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("A planilha deve conter as colunas: Cliente, Vendas e Ano. (faltando: {})", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("unsupported input format '{0}' (expected xlsx, xlsm, xlsb, xls, ods or csv)")]
    UnsupportedFormat(String),
    #[error("the sheet has no header row")]
    EmptySheet,
}

/// A single input cell before coercion
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    /// Workbook date cell, reduced to its calendar year
    Date(i32),
}

impl Cell {
    fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// Cell rendered as a label (customer names, phones, headers)
    fn as_label(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Cell::Number(value) => Some(number_label(*value)),
            Cell::Date(year) => Some(year.to_string()),
        }
    }

    /// Numeric coercion; anything unparseable becomes `None`
    fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            Cell::Text(text) => text.trim().parse::<f64>().ok(),
            Cell::Empty | Cell::Date(_) => None,
        }
        .filter(|value| value.is_finite())
    }

    /// Year coercion; only integral values in range are accepted
    fn as_year(&self) -> Option<i32> {
        match self {
            Cell::Date(year) => Some(*year),
            _ => self
                .as_number()
                .filter(|value| value.fract() == 0.0)
                .filter(|value| *value >= i32::MIN as f64 && *value <= i32::MAX as f64)
                .map(|value| value as i32),
        }
    }
}

/// Counts of values that were coerced away during ingestion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataQuality {
    /// Rows without a customer identity
    pub skipped_rows: usize,
    /// Non-empty sale amounts that were not numeric
    pub coerced_sales: usize,
    /// Non-empty years that were not integral numbers
    pub coerced_years: usize,
    /// Delimited rows that were not valid UTF-8 and were decoded lossily
    pub lossy_rows: usize,
}

impl DataQuality {
    pub fn has_issues(&self) -> bool {
        self.skipped_rows + self.coerced_sales + self.coerced_years + self.lossy_rows > 0
    }
}

/// Header row plus data rows, as read from a sheet or text file
#[derive(Debug, Default)]
struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
    lossy_rows: usize,
}

/// Normalized transaction rows of one upload
#[derive(Debug, Clone)]
pub struct Transactions {
    frame: DataFrame,
    has_phone: bool,
    quality: DataQuality,
}

impl Transactions {
    /// Build transactions from a header row and its data rows.
    ///
    /// Header names are trimmed, blank and `Unnamed*` columns are dropped and
    /// the required columns are checked before any row is read.
    pub fn from_table(headers: &[String], rows: &[Vec<Cell>]) -> crate::Result<Self> {
        let columns: Vec<(usize, &str)> = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| (idx, header.trim()))
            .filter(|(_, header)| !is_unnamed(header))
            .collect();

        let find = |name: &str| {
            columns
                .iter()
                .find(|(_, header)| *header == name)
                .map(|(idx, _)| *idx)
        };

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|&&name| find(name).is_none())
            .map(|&name| name.to_string())
            .collect();
        let (Some(customer_idx), Some(sale_idx), Some(year_idx)) =
            (find(CUSTOMER_COLUMN), find(SALE_COLUMN), find(YEAR_COLUMN))
        else {
            return Err(IngestError::MissingColumns(missing).into());
        };
        let phone_idx = find(PHONE_COLUMN);

        let mut quality = DataQuality::default();
        let mut customers: Vec<String> = Vec::with_capacity(rows.len());
        let mut sales: Vec<Option<f64>> = Vec::with_capacity(rows.len());
        let mut years: Vec<Option<i32>> = Vec::with_capacity(rows.len());
        let mut phones: Vec<Option<String>> = Vec::with_capacity(rows.len());

        for row in rows {
            let Some(customer) = cell_at(row, customer_idx).as_label() else {
                quality.skipped_rows += 1;
                continue;
            };

            let sale_cell = cell_at(row, sale_idx);
            let sale = sale_cell.as_number();
            if sale.is_none() && !sale_cell.is_empty() {
                quality.coerced_sales += 1;
            }

            let year_cell = cell_at(row, year_idx);
            let year = year_cell.as_year();
            if year.is_none() && !year_cell.is_empty() {
                quality.coerced_years += 1;
            }

            customers.push(customer);
            sales.push(sale);
            years.push(year);
            if let Some(idx) = phone_idx {
                phones.push(cell_at(row, idx).as_label());
            }
        }

        let mut series = vec![
            Series::new(CUSTOMER_COLUMN, customers),
            Series::new(SALE_COLUMN, sales),
            Series::new(YEAR_COLUMN, years),
        ];
        if phone_idx.is_some() {
            series.push(Series::new(PHONE_COLUMN, phones));
        }
        let frame = DataFrame::new(series)?;

        debug!(
            "Normalized {} transaction rows ({} columns kept of {})",
            frame.height(),
            columns.len(),
            headers.len()
        );

        Ok(Self {
            frame,
            has_phone: phone_idx.is_some(),
            quality,
        })
    }

    /// Underlying frame
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Whether the optional phone column was present
    pub fn has_phone(&self) -> bool {
        self.has_phone
    }

    pub fn quality(&self) -> DataQuality {
        self.quality
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Distinct non-null years, ascending
    pub fn available_years(&self) -> crate::Result<Vec<i32>> {
        let years: BTreeSet<i32> = self
            .frame
            .column(YEAR_COLUMN)?
            .i32()?
            .into_iter()
            .flatten()
            .collect();
        Ok(years.into_iter().collect())
    }

    /// Sum of all non-null sale amounts
    pub fn total_sales(&self) -> crate::Result<f64> {
        Ok(self
            .frame
            .column(SALE_COLUMN)?
            .f64()?
            .into_iter()
            .flatten()
            .sum())
    }
}

/// Load a transaction file, picking the reader from the file extension
///
/// # Arguments
/// * `path` - Workbook (`xlsx`, `xlsm`, `xlsb`, `xls`, `ods`) or `csv` file
/// * `sheet` - Worksheet name; the first sheet when `None`
pub fn load_transactions<P: AsRef<Path>>(path: P, sheet: Option<&str>) -> crate::Result<Transactions> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let table = match extension.as_str() {
        "csv" | "txt" => read_delimited(path)?,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path, sheet)?,
        other => return Err(IngestError::UnsupportedFormat(other.to_string()).into()),
    };

    info!("Read {} rows from {}", table.rows.len(), path.display());
    let mut transactions = Transactions::from_table(&table.headers, &table.rows)?;
    transactions.quality.lossy_rows = table.lossy_rows;
    Ok(transactions)
}

fn read_workbook(path: &Path, sheet: Option<&str>) -> crate::Result<RawTable> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook: {}", path.display()))?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or(IngestError::EmptySheet)?,
    };
    debug!("Reading sheet '{}'", sheet_name);

    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("failed to read sheet: {}", sheet_name))?;

    table_from_range(&range)
}

/// First row of the range is the header row
fn table_from_range(range: &Range<Data>) -> crate::Result<RawTable> {
    let mut rows = range.rows();
    let headers = rows
        .next()
        .ok_or(IngestError::EmptySheet)?
        .iter()
        .map(|data| cell_from_data(data).as_label().unwrap_or_default())
        .collect();
    let rows = rows
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect();

    Ok(RawTable {
        headers,
        rows,
        lossy_rows: 0,
    })
}

/// Read a delimited text file.
///
/// Exports from spreadsheet tools are often Windows-1252 rather than UTF-8;
/// invalid sequences are replaced and the affected rows counted.
fn read_delimited(path: &Path) -> crate::Result<RawTable> {
    let content = std::fs::read(path)
        .with_context(|| format!("failed to read file: {}", path.display()))?;
    let content = content.strip_prefix(UTF8_BOM).unwrap_or(&content);

    let header_line = content.split(|&b| b == b'\n').next().unwrap_or_default();
    let delimiter = detect_delimiter(&String::from_utf8_lossy(header_line));
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(content);

    let headers = reader
        .byte_headers()?
        .iter()
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect();

    let mut table = RawTable {
        headers,
        ..RawTable::default()
    };
    for record in reader.byte_records() {
        let record = record?;
        if std::str::from_utf8(record.as_slice()).is_err() {
            table.lossy_rows += 1;
        }
        table.rows.push(
            record
                .iter()
                .map(|field| {
                    let field = String::from_utf8_lossy(field);
                    if field.trim().is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(field.into_owned())
                    }
                })
                .collect(),
        );
    }

    if table.lossy_rows > 0 {
        debug!("{} row(s) were not valid UTF-8", table.lossy_rows);
    }
    Ok(table)
}

/// `;` when the header line has more semicolons than commas, `,` otherwise
fn detect_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Int(value) => Cell::Number(*value as f64),
        Data::Float(value) => Cell::Number(*value),
        Data::String(value) | Data::DateTimeIso(value) | Data::DurationIso(value) => {
            Cell::Text(value.clone())
        }
        Data::Bool(value) => Cell::Text(value.to_string()),
        Data::DateTime(value) => value
            .as_datetime()
            .map(|datetime| Cell::Date(datetime.year()))
            .unwrap_or(Cell::Empty),
        Data::Error(_) | Data::Empty => Cell::Empty,
    }
}

fn cell_at(row: &[Cell], idx: usize) -> &Cell {
    row.get(idx).unwrap_or(&EMPTY_CELL)
}

fn is_unnamed(header: &str) -> bool {
    header.is_empty() || header.starts_with(UNNAMED_PREFIX)
}

/// Whole numbers print without a fractional part (`11987654321`, not `11987654321.0`)
fn number_label(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn text(value: &str) -> Cell {
        Cell::Text(value.to_string())
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_from_table_normalizes_headers() {
        let headers = headers(&[" Cliente ", "Unnamed: 1", "Vendas", "Ano ", ""]);
        let rows = vec![vec![
            text("A"),
            text("x"),
            Cell::Number(10.0),
            Cell::Number(2023.0),
            Cell::Empty,
        ]];

        let transactions = Transactions::from_table(&headers, &rows).unwrap();
        assert_eq!(transactions.len(), 1);
        assert!(!transactions.has_phone());
        assert_eq!(transactions.frame().width(), 3);
    }

    #[test]
    fn test_missing_columns_are_reported() {
        let headers = headers(&["Cliente", "Valor"]);
        let err = Transactions::from_table(&headers, &[]).unwrap_err();

        match err.downcast_ref::<IngestError>() {
            Some(IngestError::MissingColumns(missing)) => {
                assert_eq!(missing, &vec!["Vendas".to_string(), "Ano".to_string()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_numeric_coercion() {
        let headers = headers(&["Cliente", "Vendas", "Ano", "Celular"]);
        let rows = vec![
            vec![text("A"), text("100.5"), text("2023"), Cell::Number(11987654321.0)],
            vec![text("A"), text("n/a"), text("2023.5"), Cell::Empty],
            vec![Cell::Empty, text("10"), text("2022"), Cell::Empty],
            vec![text("B"), Cell::Empty, Cell::Date(2021), text(" 9999-0000 ")],
        ];

        let transactions = Transactions::from_table(&headers, &rows).unwrap();
        assert_eq!(transactions.len(), 3);
        assert_eq!(
            transactions.quality(),
            DataQuality {
                skipped_rows: 1,
                coerced_sales: 1,
                coerced_years: 1,
                lossy_rows: 0,
            }
        );
        assert_eq!(transactions.total_sales().unwrap(), 100.5);
        assert_eq!(transactions.available_years().unwrap(), vec![2021, 2023]);

        let phones: Vec<Option<&str>> = transactions
            .frame()
            .column(PHONE_COLUMN)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(phones, vec![Some("11987654321"), None, Some("9999-0000")]);
    }

    #[test]
    fn test_load_semicolon_csv() {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "\u{feff}Cliente;Vendas;Ano\n").unwrap();
        writeln!(file, "Loja Azul;1500.75;2023").unwrap();
        writeln!(file, "Loja Azul;200;2024").unwrap();

        let transactions = load_transactions(file.path(), None).unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions.total_sales().unwrap(), 1700.75);
    }

    #[test]
    fn test_load_windows_1252_csv() {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(b"Cliente;Vendas;Ano\nPadaria S\xE3o Jo\xE3o;100;2024\nLoja Azul;50;2024\n")
            .unwrap();

        let transactions = load_transactions(file.path(), None).unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions.quality().lossy_rows, 1);
        assert!(transactions.quality().has_issues());
        assert_eq!(transactions.total_sales().unwrap(), 150.0);

        let customers: Vec<Option<&str>> = transactions
            .frame()
            .column(CUSTOMER_COLUMN)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(
            customers,
            vec![Some("Padaria S\u{fffd}o Jo\u{fffd}o"), Some("Loja Azul")]
        );
    }

    #[test]
    fn test_table_from_range() {
        use calamine::{ExcelDateTime, ExcelDateTimeType};

        let mut range = Range::new((0, 0), (2, 3));
        for (col, header) in ["Cliente", "Vendas", "Ano", "Celular"].iter().enumerate() {
            range.set_value((0, col as u32), Data::String(header.to_string()));
        }
        range.set_value((1, 0), Data::String("Loja Azul".to_string()));
        range.set_value((1, 1), Data::Float(1500.75));
        // 45000 is 2023-03-15
        range.set_value(
            (1, 2),
            Data::DateTime(ExcelDateTime::new(45000.0, ExcelDateTimeType::DateTime, false)),
        );
        range.set_value((1, 3), Data::Float(11987654321.0));
        range.set_value((2, 0), Data::String("Loja Azul".to_string()));
        range.set_value((2, 1), Data::Int(200));
        range.set_value((2, 2), Data::Float(2024.0));

        let table = table_from_range(&range).unwrap();
        assert_eq!(table.headers, headers(&["Cliente", "Vendas", "Ano", "Celular"]));
        assert_eq!(table.rows[0][2], Cell::Date(2023));
        assert_eq!(table.rows[1][3], Cell::Empty);

        let transactions = Transactions::from_table(&table.headers, &table.rows).unwrap();
        assert_eq!(transactions.available_years().unwrap(), vec![2023, 2024]);
        assert_eq!(transactions.total_sales().unwrap(), 1700.75);
        let phone = transactions.frame().column(PHONE_COLUMN).unwrap().str().unwrap().get(0);
        assert_eq!(phone, Some("11987654321"));
    }

    #[test]
    fn test_empty_range_has_no_header_row() {
        let err = table_from_range(&Range::<Data>::empty()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::EmptySheet)
        ));
    }

    #[test]
    fn test_load_unsupported_extension() {
        let file = Builder::new().suffix(".json").tempfile().unwrap();
        let err = load_transactions(file.path(), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::UnsupportedFormat(ext)) if ext == "json"
        ));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("Cliente;Vendas;Ano\n"), b';');
        assert_eq!(detect_delimiter("Cliente,Vendas,Ano\n"), b',');
        assert_eq!(detect_delimiter(""), b',');
    }
}
