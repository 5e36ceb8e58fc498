//! Reads the tabular health sources into [`Table`]s.
//!
//! Disease files are UTF-8 delimited text with a header row. The vaccination
//! export has a malformed preamble, so it is read header-less, a fixed number of
//! rows are skipped and the known header list is applied by position.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use super::types::Table;
use super::IngestError;
use crate::config::DataSources;

/// Rows of preamble before the first data row in the vaccination export.
pub const VACCINATION_SKIP_ROWS: usize = 3;

/// Column names applied positionally to the vaccination export.
pub const VACCINATION_HEADERS: [&str; 14] = [
    "States/UTs",
    "Area",
    "Children fully vaccinated (recall)",
    "Children fully vaccinated (card)",
    "Received BCG",
    "Received 3 doses polio",
    "Received 3 doses DPT",
    "Received 1 dose measles",
    "Received 2 doses measles",
    "Received 3 doses rotavirus",
    "Received 3 doses hepatitis B",
    "Received vitamin A",
    "Received vaccinations in public facility",
    "Received vaccinations in private facility",
];

/// Tokens treated as a missing value (same set pandas uses by default).
const NA_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextEncoding {
    Utf8,
    Latin1,
}

/// The three tables that together describe diseases.
#[derive(Debug, Clone)]
pub struct DiseaseTables {
    pub symptoms: Table,
    pub descriptions: Table,
    pub precautions: Table,
}

/// Trim a raw cell; empty cells and NA tokens become `None`.
pub fn normalize_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || NA_TOKENS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Load the symptom, description and precaution tables.
/// All three are required, so the first failure aborts the disease source.
pub fn load_disease_tables(sources: &DataSources) -> Result<DiseaseTables, IngestError> {
    Ok(DiseaseTables {
        symptoms: read_delimited(&sources.disease_symptoms)?,
        descriptions: read_delimited(&sources.disease_descriptions)?,
        precautions: read_delimited(&sources.disease_precautions)?,
    })
}

/// Read a UTF-8 delimited file whose first row is the header.
pub fn read_delimited(path: &Path) -> Result<Table, IngestError> {
    let mut rows = read_rows(path, TextEncoding::Utf8)?.into_iter();

    let headers: Vec<String> = rows
        .next()
        .unwrap_or_default()
        .into_iter()
        .map(|h| h.unwrap_or_default().trim_start_matches('\u{feff}').to_string())
        .collect();

    let width = headers.len();
    let rows = rows
        .map(|mut row| {
            row.resize(width, None);
            row
        })
        .collect();

    tracing::debug!(path = %path.display(), columns = width, "Delimited file loaded");
    Ok(Table::new(&table_name(path), headers, rows))
}

/// Read the vaccination statistics export.
///
/// The first [`VACCINATION_SKIP_ROWS`] rows are discarded. When the file is not
/// exactly as wide as [`VACCINATION_HEADERS`], a warning is logged and both the
/// rows and the header list are cut to the narrower of the two.
pub fn load_vaccination_stats(path: &Path) -> Result<Table, IngestError> {
    let raw = if is_spreadsheet(path) {
        read_spreadsheet(path)?
    } else {
        read_rows(path, TextEncoding::Latin1)?
    };

    let rows: Vec<Vec<Option<String>>> = raw.into_iter().skip(VACCINATION_SKIP_ROWS).collect();

    let expected = VACCINATION_HEADERS.len();
    let actual = rows.iter().map(Vec::len).max().unwrap_or(0);
    let width = if actual == expected {
        expected
    } else {
        tracing::warn!(
            path = %path.display(),
            expected,
            actual,
            "Vaccination column count mismatch, truncating column list"
        );
        expected.min(actual)
    };

    let headers = VACCINATION_HEADERS[..width]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let rows = rows
        .into_iter()
        .map(|mut row| {
            row.resize(width, None);
            row
        })
        .collect();

    Ok(Table::new(&table_name(path), headers, rows))
}

fn ensure_exists(path: &Path) -> Result<(), IngestError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(IngestError::MissingFile(path.to_path_buf()))
    }
}

fn table_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SPREADSHEET_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Every row of a delimited file, header included, without width checks.
fn read_rows(path: &Path, encoding: TextEncoding) -> Result<Vec<Vec<Option<String>>>, IngestError> {
    ensure_exists(path)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|source| csv_error(path, source))?;

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(|source| csv_error(path, source))?;
        rows.push(
            record
                .iter()
                .map(|field| normalize_cell(&decode(field, encoding)))
                .collect(),
        );
    }
    Ok(rows)
}

fn csv_error(path: &Path, source: csv::Error) -> IngestError {
    IngestError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

fn decode(field: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Utf8 => String::from_utf8_lossy(field).into_owned(),
        // Latin-1 maps each byte to the code point of the same value.
        TextEncoding::Latin1 => field.iter().map(|&b| char::from(b)).collect(),
    }
}

/// First worksheet as rows, re-anchored at A1 so row offsets match the sheet.
fn read_spreadsheet(path: &Path) -> Result<Vec<Vec<Option<String>>>, IngestError> {
    ensure_exists(path)?;

    let spreadsheet_error = |reason: String| IngestError::Spreadsheet {
        path: path.to_path_buf(),
        reason,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| spreadsheet_error(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| spreadsheet_error("workbook has no worksheets".into()))?
        .map_err(|e| spreadsheet_error(e.to_string()))?;

    // calamine ranges start at the first non-empty cell.
    let (start_row, start_col) = range.start().unwrap_or((0, 0));

    let mut rows: Vec<Vec<Option<String>>> = vec![Vec::new(); start_row as usize];
    for sheet_row in range.rows() {
        let mut row = vec![None; start_col as usize];
        row.extend(sheet_row.iter().map(spreadsheet_cell));
        rows.push(row);
    }
    Ok(rows)
}

fn spreadsheet_cell(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => normalize_cell(s),
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        other => normalize_cell(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    fn vaccination_line(region: &str, area: &str, values: &[&str]) -> String {
        let mut cells = vec![region.to_string(), area.to_string()];
        cells.extend(values.iter().map(|v| v.to_string()));
        cells.resize(14, String::new());
        cells.join(",")
    }

    #[test]
    fn normalize_cell_handles_na_tokens() {
        assert_eq!(normalize_cell("  fever "), Some("fever".into()));
        assert_eq!(normalize_cell(""), None);
        assert_eq!(normalize_cell("   "), None);
        assert_eq!(normalize_cell("NaN"), None);
        assert_eq!(normalize_cell("N/A"), None);
        assert_eq!(normalize_cell("0"), Some("0".into()));
    }

    #[test]
    fn delimited_file_reads_header_and_pads_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "dataset.csv",
            b"Disease,Symptom_1,Symptom_2\nFlu, fever, cough\nCold,sneezing\n",
        );

        let table = read_delimited(&path).unwrap();
        assert_eq!(table.name, "dataset.csv");
        assert_eq!(table.headers, vec!["Disease", "Symptom_1", "Symptom_2"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][1].as_deref(), Some("fever"));
        assert_eq!(table.rows[1], vec![Some("Cold".into()), Some("sneezing".into()), None]);
    }

    #[test]
    fn delimited_file_strips_bom_from_header() {
        let dir = tempfile::tempdir().unwrap();
        let content = "\u{feff}Disease,Description\nFlu,Virus\n";
        let path = write_file(dir.path(), "d.csv", content.as_bytes());

        let table = read_delimited(&path).unwrap();
        assert_eq!(table.column("Disease"), Some(0));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_delimited(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, IngestError::MissingFile(_)));
    }

    #[test]
    fn missing_disease_file_aborts_disease_source() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "dataset.csv", b"Disease,Symptom_1\nFlu,fever\n");
        write_file(dir.path(), "symptom_Description.csv", b"Disease,Description\nFlu,Virus\n");

        let err = load_disease_tables(&DataSources::in_dir(dir.path())).unwrap_err();
        match err {
            IngestError::MissingFile(path) => assert!(path.ends_with("symptom_precaution.csv")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn vaccination_skips_preamble_and_applies_headers() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = String::from("Title row\nSubtitle\n,,Percent\n");
        content.push_str(&vaccination_line("Odisha", "Rural", &["80", "75", "87.5"]));
        content.push('\n');
        let path = write_file(dir.path(), "vacc.csv", content.as_bytes());

        let table = load_vaccination_stats(&path).unwrap();
        assert_eq!(table.headers.len(), 14);
        assert_eq!(table.headers[4], "Received BCG");
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0][0].as_deref(), Some("Odisha"));
        assert_eq!(table.rows[0][4].as_deref(), Some("87.5"));
    }

    #[test]
    fn vaccination_narrow_file_truncates_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "vacc.csv", b"a\nb\nc\nOdisha,Urban,91.2\n");

        let table = load_vaccination_stats(&path).unwrap();
        assert_eq!(
            table.headers,
            vec!["States/UTs", "Area", "Children fully vaccinated (recall)"]
        );
        assert_eq!(table.rows[0].len(), 3);
    }

    #[test]
    fn vaccination_wide_file_truncates_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut line = vaccination_line("Odisha", "Total", &["1"]);
        line.push_str(",extra,extra2");
        let content = format!("a\nb\nc\n{line}\n");
        let path = write_file(dir.path(), "vacc.csv", content.as_bytes());

        let table = load_vaccination_stats(&path).unwrap();
        assert_eq!(table.headers.len(), 14);
        assert!(table.rows.iter().all(|r| r.len() == 14));
    }

    #[test]
    fn vaccination_decodes_latin1() {
        let dir = tempfile::tempdir().unwrap();
        // 0xE9 is 'é' in Latin-1 and invalid on its own in UTF-8.
        let mut bytes = b"a\nb\nc\nPondich\xE9rry,Urban".to_vec();
        bytes.extend_from_slice(",1".repeat(12).as_bytes());
        bytes.push(b'\n');
        let path = write_file(dir.path(), "vacc.csv", &bytes);

        let table = load_vaccination_stats(&path).unwrap();
        assert_eq!(table.rows[0][0].as_deref(), Some("Pondichérry"));
    }

    #[test]
    fn spreadsheet_detection_uses_extension() {
        assert!(is_spreadsheet(Path::new("Baby_Vaccination_India_2021.xlsx")));
        assert!(is_spreadsheet(Path::new("stats.XLS")));
        assert!(!is_spreadsheet(Path::new("stats.csv")));
        assert!(!is_spreadsheet(Path::new("stats")));
    }

    #[test]
    fn vaccination_spreadsheet_counts_rows_from_a1() {
        // Row 1 of the fixture is empty, so the used range starts at row 2.
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata/vaccination_offset.xlsx");

        let table = load_vaccination_stats(&path).unwrap();
        assert_eq!(table.name, "vaccination_offset.xlsx");
        assert_eq!(table.headers.len(), 14);
        assert_eq!(table.headers[4], "Received BCG");
        assert_eq!(table.len(), 2);

        let odisha = &table.rows[0];
        assert_eq!(odisha[0].as_deref(), Some("Odisha"));
        assert_eq!(odisha[1].as_deref(), Some("Rural"));
        assert_eq!(odisha[2].as_deref(), Some("90"));
        assert_eq!(odisha[4].as_deref(), Some("91.5"));
        assert_eq!(odisha[13].as_deref(), Some("4.8"));

        let kerala = &table.rows[1];
        assert_eq!(kerala[0].as_deref(), Some("Kerala"));
        assert_eq!(kerala[2].as_deref(), Some("77.1"));
        assert_eq!(kerala[3], None);
        assert_eq!(kerala[4].as_deref(), Some("99"));
    }

    #[test]
    fn spreadsheet_cells_convert() {
        assert_eq!(spreadsheet_cell(&Data::Float(87.5)), Some("87.5".into()));
        assert_eq!(spreadsheet_cell(&Data::Float(90.0)), Some("90".into()));
        assert_eq!(spreadsheet_cell(&Data::Int(12)), Some("12".into()));
        assert_eq!(spreadsheet_cell(&Data::String(" NA ".into())), None);
        assert_eq!(spreadsheet_cell(&Data::Empty), None);
    }
}
