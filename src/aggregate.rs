//! Combining per-sweep result tables into one dataset for plotting.
//!
//! Aggregation works at the CSV level: every row of a source table receives
//! that table's constant provenance columns (scenario flags, decarbonization
//! year, biomass availability, and the like), the tables are concatenated in
//! source order without deduplication, and the combined table is split into
//! per-quantity subsets on the `quantity` discriminator column.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::results::QUANTITY_COLUMN;

/// A CSV table held as strings: aggregation never reinterprets values, so a
/// round trip through disk is byte-stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the named column, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }
}

/// One source table and the constant provenance column values to stamp onto
/// each of its rows. Provenance is per source file, never derived from row
/// content.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub path: PathBuf,
    /// Ordered (column, value) pairs, e.g. `("decarb", "2050")`.
    pub provenance: Vec<(String, String)>,
}

/// A source table could not be read or is structurally unusable.
#[derive(Debug)]
pub struct AggregateError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aggregation error for `{}`: {}", self.path, self.message)
    }
}

impl std::error::Error for AggregateError {}

/// Reads a CSV table from any reader.
///
/// # Errors
///
/// Returns an `AggregateError` naming `label` if the CSV cannot be parsed.
pub fn read_table<R: Read>(reader: R, label: &str) -> Result<Table, AggregateError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let header = rdr
        .headers()
        .map_err(|e| AggregateError {
            path: label.to_string(),
            message: e.to_string(),
        })?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| AggregateError {
            path: label.to_string(),
            message: e.to_string(),
        })?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        if row.len() > header.len() {
            return Err(AggregateError {
                path: label.to_string(),
                message: format!(
                    "row {} has {} fields but the header declares {}",
                    rows.len() + 1,
                    row.len(),
                    header.len()
                ),
            });
        }
        // Short rows pad out to the header width so later column lookups
        // stay in bounds.
        row.resize(header.len(), String::new());
        rows.push(row);
    }
    Ok(Table { header, rows })
}

/// Reads a CSV table from disk.
///
/// # Errors
///
/// Returns an `AggregateError` if the file cannot be opened or parsed.
pub fn read_table_from_path(path: &Path) -> Result<Table, AggregateError> {
    let file = File::open(path).map_err(|e| AggregateError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    read_table(file, &path.display().to_string())
}

/// Stamps the provenance columns onto every row of `table`.
///
/// New columns append to the right; a provenance column already present in
/// the table is overwritten in place, since provenance is a per-source
/// constant.
pub fn apply_provenance(table: &mut Table, provenance: &[(String, String)]) {
    for (column, value) in provenance {
        match table.column_index(column) {
            Some(idx) => {
                for row in &mut table.rows {
                    row[idx] = value.clone();
                }
            }
            None => {
                table.header.push(column.clone());
                for row in &mut table.rows {
                    row.push(value.clone());
                }
            }
        }
    }
}

/// Concatenates tables into one, unifying headers by name.
///
/// Columns missing from a source are blank-filled; no row is ever dropped
/// or deduplicated, so each row appears exactly once per occurrence in a
/// source.
pub fn concat(tables: Vec<Table>) -> Table {
    let mut header: Vec<String> = Vec::new();
    for table in &tables {
        for column in &table.header {
            if !header.contains(column) {
                header.push(column.clone());
            }
        }
    }

    let mut rows = Vec::new();
    for table in tables {
        let mapping: Vec<Option<usize>> = header
            .iter()
            .map(|column| table.column_index(column))
            .collect();
        for row in &table.rows {
            let combined: Vec<String> = mapping
                .iter()
                .map(|idx| idx.map(|i| row[i].clone()).unwrap_or_default())
                .collect();
            rows.push(combined);
        }
    }
    Table { header, rows }
}

/// Reads every source, stamps its provenance columns, and concatenates the
/// results in source order.
///
/// # Errors
///
/// Returns an `AggregateError` if any source cannot be read.
pub fn combine(sources: &[SourceSpec]) -> Result<Table, AggregateError> {
    let mut tables = Vec::with_capacity(sources.len());
    for source in sources {
        let mut table = read_table_from_path(&source.path)?;
        apply_provenance(&mut table, &source.provenance);
        tables.push(table);
    }
    Ok(concat(tables))
}

/// Partitions a combined table into disjoint subsets by the `quantity`
/// column, preserving row order within each subset. Rows with an empty
/// discriminator (failed-case sentinels) land in the `""` subset.
///
/// # Errors
///
/// Returns an `AggregateError` if the table has no `quantity` column.
pub fn split_by_quantity(table: &Table) -> Result<BTreeMap<String, Table>, AggregateError> {
    let idx = table.column_index(QUANTITY_COLUMN).ok_or_else(|| AggregateError {
        path: "<combined>".to_string(),
        message: format!("missing `{QUANTITY_COLUMN}` column"),
    })?;

    let mut subsets: BTreeMap<String, Table> = BTreeMap::new();
    for row in &table.rows {
        let key = row[idx].clone();
        subsets
            .entry(key)
            .or_insert_with(|| Table {
                header: table.header.clone(),
                rows: Vec::new(),
            })
            .rows
            .push(row.clone());
    }
    Ok(subsets)
}

/// Writes a table as CSV.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_table<W: Write>(table: &Table, writer: W) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(&table.header)?;
    for row in &table.rows {
        wtr.write_record(row)?;
    }
    wtr.flush()
}

/// Writes a table to the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn write_table_to_path(table: &Table, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_table(table, &mut writer)?;
    writer.flush()
}

/// Writes the combined table plus one `<quantity>.csv` per subset into
/// `dir`, and returns the paths written.
///
/// # Errors
///
/// Returns an `AggregateError` if splitting fails or any file cannot be
/// written.
pub fn write_split_outputs(table: &Table, dir: &Path) -> Result<Vec<PathBuf>, AggregateError> {
    let io_err = |path: &Path, e: io::Error| AggregateError {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let mut written = Vec::new();
    let combined_path = dir.join("combined_results.csv");
    write_table_to_path(table, &combined_path).map_err(|e| io_err(&combined_path, e))?;
    written.push(combined_path);

    for (quantity, subset) in split_by_quantity(table)? {
        if quantity.is_empty() {
            continue;
        }
        let path = dir.join(format!("{quantity}.csv"));
        write_table_to_path(&subset, &path).map_err(|e| io_err(&path, e))?;
        written.push(path);
    }
    Ok(written)
}
