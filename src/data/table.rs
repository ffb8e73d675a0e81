use std::io::Write;
use std::path::Path;

use ndarray::{Array2, ArrayView2};

use crate::error::{Result, TransformerError};

/// Tokens read as a missing value.
const MISSING_TOKENS: [&str; 6] = ["", "n/a", "N/A", "NA", "nan", "NaN"];
/// How missing values are written back.
pub const MISSING_REP: &str = "n/a";

// ---------------------------------------------------------------------------
// Table – named numeric columns
// ---------------------------------------------------------------------------

/// A numeric table: ordered column labels plus rows × columns values.
/// Missing cells are `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub values: Array2<f64>,
}

impl Table {
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Byte(u8),
    Whitespace,
}

/// `.tsv` and `.csv` name their delimiter; other files are sniffed.
fn delimiter_for(path: &Path, text: &str) -> Delimiter {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "tsv" => Delimiter::Byte(b'\t'),
        "csv" => Delimiter::Byte(b','),
        _ => sniff_delimiter(text),
    }
}

/// Pick the delimiter from the first non-empty line.
fn sniff_delimiter(text: &str) -> Delimiter {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    if first.contains('\t') {
        Delimiter::Byte(b'\t')
    } else if first.contains(',') {
        Delimiter::Byte(b',')
    } else if first.contains(';') {
        Delimiter::Byte(b';')
    } else {
        Delimiter::Whitespace
    }
}

fn split_records(text: &str, delimiter: Delimiter, path: &Path) -> Result<Vec<Vec<String>>> {
    match delimiter {
        Delimiter::Whitespace => Ok(text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.split_whitespace().map(str::to_string).collect())
            .collect()),
        Delimiter::Byte(b) => {
            let mut reader = csv::ReaderBuilder::new()
                .delimiter(b)
                .has_headers(false)
                .flexible(true)
                .from_reader(text.as_bytes());
            let mut records = Vec::new();
            for (row_no, result) in reader.records().enumerate() {
                let record = result.map_err(|e| {
                    TransformerError::invalid(path, format!("row {row_no}: {e}"))
                })?;
                if record.iter().all(|f| f.trim().is_empty()) {
                    continue;
                }
                records.push(record.iter().map(|f| f.trim().to_string()).collect());
            }
            Ok(records)
        }
    }
}

fn parse_cell(s: &str) -> Option<f64> {
    if MISSING_TOKENS.contains(&s) {
        return Some(f64::NAN);
    }
    s.parse::<f64>().ok()
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Read a delimited text table.
///
/// The first row is a header when any of its cells is neither a number nor
/// a missing-value token; otherwise columns are labelled `0..n`. Every
/// data cell must be numeric or missing.
pub fn read_table(path: &Path) -> Result<Table> {
    let text = std::fs::read_to_string(path).map_err(|e| TransformerError::io(path, e))?;
    let delimiter = delimiter_for(path, &text);
    let mut records = split_records(&text, delimiter, path)?;

    let has_header = records
        .first()
        .is_some_and(|row| row.iter().any(|cell| parse_cell(cell).is_none()));
    let columns: Vec<String> = if has_header {
        records.remove(0)
    } else {
        let width = records.first().map_or(0, Vec::len);
        (0..width).map(|i| i.to_string()).collect()
    };

    let n_cols = columns.len();
    let n_rows = records.len();
    let mut values = Array2::<f64>::zeros((n_rows, n_cols));
    let first_data_line = usize::from(has_header);

    for (i, record) in records.iter().enumerate() {
        if record.len() != n_cols {
            return Err(TransformerError::invalid(
                path,
                format!(
                    "row {} has {} fields, expected {n_cols}",
                    i + first_data_line,
                    record.len()
                ),
            ));
        }
        for (j, cell) in record.iter().enumerate() {
            values[[i, j]] = parse_cell(cell).ok_or_else(|| TransformerError::Coercion {
                path: path.to_path_buf(),
                row: i + first_data_line,
                column: j,
                value: cell.clone(),
            })?;
        }
    }

    log::debug!(
        "read table {} ({n_rows} rows × {n_cols} columns, header={has_header}, delimiter={delimiter:?})",
        path.display()
    );

    Ok(Table { columns, values })
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

fn format_value(v: f64) -> String {
    if v.is_nan() {
        MISSING_REP.to_string()
    } else {
        format!("{v:?}")
    }
}

/// Write tab-separated values with `n/a` for missing cells.
pub fn write_tsv<W: Write>(
    writer: W,
    columns: &[String],
    values: ArrayView2<'_, f64>,
    write_header: bool,
) -> csv::Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(writer);

    if write_header {
        wtr.write_record(columns)?;
    }
    for row in values.rows() {
        wtr.write_record(row.iter().map(|&v| format_value(v)))?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reads_tsv_with_header_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "c.tsv", "a\tb\n1\tn/a\n3.5\t4\n");
        let table = read_table(&path).unwrap();
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.values.nrows(), 2);
        assert_eq!(table.values[[0, 0]], 1.0);
        assert!(table.values[[0, 1]].is_nan());
        assert_eq!(table.values[[1, 0]], 3.5);
    }

    #[test]
    fn headerless_whitespace_file_gets_positional_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "m.txt", "1 2  3\n4 5 6\n\n");
        let table = read_table(&path).unwrap();
        assert_eq!(table.columns, vec!["0", "1", "2"]);
        assert_eq!(table.values, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    }

    #[test]
    fn comma_separated_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "m.csv", "x,y\n1,2\n");
        let table = read_table(&path).unwrap();
        assert_eq!(table.columns, vec!["x", "y"]);
        assert_eq!(table.values, array![[1.0, 2.0]]);
    }

    #[test]
    fn single_column_tsv_keeps_spaced_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "gs.tsv", "global signal\n1.5\n2.5\n");
        let table = read_table(&path).unwrap();
        assert_eq!(table.columns, vec!["global signal"]);
        assert_eq!(table.values, array![[1.5], [2.5]]);
    }

    #[test]
    fn unknown_extension_is_sniffed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "m.dat", "a;b\n1;2\n");
        let table = read_table(&path).unwrap();
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.values, array![[1.0, 2.0]]);
    }

    #[test]
    fn non_numeric_cell_is_a_coercion_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "bad.tsv", "a\tb\n1\t2\n3\tfoo\n");
        match read_table(&path) {
            Err(TransformerError::Coercion { row, column, value, .. }) => {
                assert_eq!((row, column), (2, 1));
                assert_eq!(value, "foo");
            }
            other => panic!("expected coercion error, got {other:?}"),
        }
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "r.tsv", "a\tb\n1\t2\t3\n");
        assert!(matches!(
            read_table(&path),
            Err(TransformerError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn writes_tsv_with_and_without_header() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let values = array![[1.0, f64::NAN], [3.0, 0.25]];

        let mut out = Vec::new();
        write_tsv(&mut out, &columns, values.view(), true).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a\tb\n1.0\tn/a\n3.0\t0.25\n");

        let mut out = Vec::new();
        write_tsv(&mut out, &columns, values.view(), false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1.0\tn/a\n3.0\t0.25\n");
    }
}
