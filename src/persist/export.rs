use crate::error::{HarvestError, Result};
use crate::extract::{Record, OUTPUT_COLUMNS};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const BOM: &str = "\u{feff}";
const DELIMITER: char = ';';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
    Both,
}

impl ExportFormat {
    pub fn includes_csv(self) -> bool {
        matches!(self, ExportFormat::Csv | ExportFormat::Both)
    }

    pub fn includes_json(self) -> bool {
        matches!(self, ExportFormat::Json | ExportFormat::Both)
    }
}

/// How CSV cells containing the delimiter are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsvQuoting {
    /// Quote cells holding `;`, `"`, `,` or line breaks, doubling inner quotes.
    #[default]
    Rfc4180,
    /// Rewrite `;` as `,` and never quote.
    Replace,
}

/// Known columns in catalog order, then extra columns in first-seen order.
pub fn header(records: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = OUTPUT_COLUMNS.iter().map(|c| c.to_string()).collect();
    for record in records {
        for name in record.column_names() {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        }
    }
    columns
}

fn cell(value: &str, quoting: CsvQuoting) -> String {
    match quoting {
        CsvQuoting::Replace => value.replace(DELIMITER, ","),
        CsvQuoting::Rfc4180 => {
            let needs_quotes = value
                .chars()
                .any(|c| matches!(c, ';' | '"' | ',' | '\r' | '\n'));
            if needs_quotes {
                format!("\"{}\"", value.replace('"', "\"\""))
            } else {
                value.to_string()
            }
        }
    }
}

pub fn to_csv(records: &[Record], quoting: CsvQuoting) -> String {
    let columns = header(records);
    let separator = DELIMITER.to_string();

    let mut out = String::from(BOM);
    let head: Vec<String> = columns.iter().map(|c| cell(c, quoting)).collect();
    out.push_str(&head.join(&separator));
    out.push('\n');

    for record in records {
        let row: Vec<String> = columns
            .iter()
            .map(|column| cell(record.value(column), quoting))
            .collect();
        out.push_str(&row.join(&separator));
        out.push('\n');
    }

    out
}

pub fn to_json(records: &[Record]) -> Result<String> {
    serde_json::to_string_pretty(records).map_err(|e| HarvestError::Export {
        message: format!("Failed to serialize records to JSON: {}", e),
    })
}

/// File stem for an export: the period label made filesystem-safe, or a dated fallback.
pub fn file_stem(period_label: &str, today: NaiveDate) -> String {
    sanitize_label(period_label)
        .unwrap_or_else(|| format!("dados_alunos_{}", today.format("%Y-%m-%d")))
}

fn sanitize_label(label: &str) -> Option<String> {
    let mut sanitized = String::new();

    for ch in label.chars() {
        match ch {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '/' | '\\' => sanitized.push('_'),
            c if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' => sanitized.push(c),
            _ => sanitized.push('_'),
        }
    }

    let sanitized: String = sanitized
        .trim_matches(|c| c == '.' || c == '_')
        .chars()
        .take(100)
        .collect();

    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Writes the export files for one run into an output directory.
pub struct Exporter {
    directory: PathBuf,
    format: ExportFormat,
    quoting: CsvQuoting,
}

impl Exporter {
    pub fn new(directory: PathBuf, format: ExportFormat) -> Self {
        Self {
            directory,
            format,
            quoting: CsvQuoting::default(),
        }
    }

    pub fn with_quoting(mut self, quoting: CsvQuoting) -> Self {
        self.quoting = quoting;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Writes every requested format and returns the paths written.
    pub fn export(&self, records: &[Record], period_label: &str, today: NaiveDate) -> Result<Vec<PathBuf>> {
        if records.is_empty() {
            return Err(HarvestError::Export {
                message: "There are no records to export".to_string(),
            });
        }

        fs::create_dir_all(&self.directory).map_err(|e| self.export_error(&self.directory, e))?;

        let stem = file_stem(period_label, today);
        let mut written = Vec::new();

        if self.format.includes_csv() {
            let path = self.directory.join(format!("{}.csv", stem));
            self.write(&path, &to_csv(records, self.quoting))?;
            written.push(path);
        }

        if self.format.includes_json() {
            let path = self.directory.join(format!("{}.json", stem));
            let mut content = to_json(records)?;
            content.push('\n');
            self.write(&path, &content)?;
            written.push(path);
        }

        Ok(written)
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        let mut file = fs::File::create(path).map_err(|e| self.export_error(path, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| self.export_error(path, e))
    }

    fn export_error(&self, path: &Path, error: std::io::Error) -> HarvestError {
        HarvestError::Export {
            message: format!("{}: {}", path.display(), error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str, extra: Option<(&str, &str)>) -> Record {
        let mut record = Record::new();
        record.set("série/ano", "7A");
        record.set("numero_linha", "1");
        record.set("nome", name);
        if let Some((column, value)) = extra {
            record.set(column, value);
        }
        record
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_csv_starts_with_bom_and_fixed_header() {
        let csv = to_csv(&[record("ANA", None)], CsvQuoting::Rfc4180);
        assert!(csv.starts_with('\u{feff}'));

        let first_line = csv.trim_start_matches('\u{feff}').lines().next().unwrap();
        let columns: Vec<&str> = first_line.split(';').collect();
        assert_eq!(columns.len(), OUTPUT_COLUMNS.len());
        assert_eq!(columns[0], "série/ano");
        assert_eq!(columns[1], "numero_linha");
        assert_eq!(columns[2], "nome");
        assert!(!csv.contains("\r\n"));
    }

    #[test]
    fn test_extra_columns_follow_catalog_in_first_seen_order() {
        let records = vec![
            record("ANA", Some(("zeta", "1"))),
            record("BIA", Some(("alfa", "2"))),
        ];
        let columns = header(&records);
        assert_eq!(columns[OUTPUT_COLUMNS.len()], "zeta");
        assert_eq!(columns[OUTPUT_COLUMNS.len() + 1], "alfa");
    }

    #[test]
    fn test_quoting_modes() {
        let records = vec![record("SILVA; ANA \"NINA\"", None)];

        let quoted = to_csv(&records, CsvQuoting::Rfc4180);
        assert!(quoted.contains("\"SILVA; ANA \"\"NINA\"\"\""));

        let replaced = to_csv(&records, CsvQuoting::Replace);
        assert!(replaced.contains("SILVA, ANA \"NINA\""));
        let row = replaced.lines().nth(1).unwrap();
        assert_eq!(row.split(';').count(), OUTPUT_COLUMNS.len());
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("7º ano A", today()), "7º_ano_A");
        assert_eq!(file_stem("9/B", today()), "9_B");
        assert_eq!(file_stem("  ", today()), "dados_alunos_2024-03-01");
        assert_eq!(file_stem("", today()), "dados_alunos_2024-03-01");
    }

    #[test]
    fn test_exporter_writes_requested_formats() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path().join("out"), ExportFormat::Both);
        let written = exporter
            .export(&[record("ANA", None)], "8B", today())
            .unwrap();

        assert_eq!(written.len(), 2);
        assert!(dir.path().join("out/8B.csv").exists());

        let json = std::fs::read_to_string(dir.path().join("out/8B.json")).unwrap();
        let parsed: Vec<Record> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0].value("nome"), "ANA");
    }

    #[test]
    fn test_export_without_records_fails() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path().to_path_buf(), ExportFormat::Csv);
        assert!(matches!(
            exporter.export(&[], "8B", today()),
            Err(HarvestError::Export { .. })
        ));
    }
}
