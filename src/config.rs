use crate::detect::Detector;
use crate::error::{HarvestError, Result};
use crate::extract::sections::SECTION_NAMES;
use crate::extract::ListReader;
use crate::page::dom;
use crate::persist::export::{CsvQuoting, ExportFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub timing: TimingConfig,
    pub detection: DetectionConfig,
    pub list: ListConfig,
    pub extraction: ExtractionConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub endpoint: String,
    pub tab_url_hint: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    pub inter_item_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub detail_timeout_ms: Option<u64>,
    pub section_settle_ms: Option<u64>,
    pub close_step_timeout_ms: Option<u64>,
    pub page_settle_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub detail_selectors: Vec<String>,
    pub detail_markers: Vec<String>,
    pub list_selectors: Vec<String>,
    pub list_markers: Vec<String>,
    pub min_overlay_area: i64,
    pub section_controls: String,
    pub close_selectors: Vec<String>,
    pub close_words: Vec<String>,
    pub backdrop_selectors: Vec<String>,
    pub next_words: Vec<String>,
    pub next_selectors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListColumn {
    pub index: usize,
    pub column: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListConfig {
    pub min_cells: usize,
    pub name_column: usize,
    pub view_column: Option<usize>,
    pub view_selectors: Vec<String>,
    pub columns: Vec<ListColumn>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub sections: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub snapshot_file: String,
    pub format: ExportFormat,
    pub csv_quoting: CsvQuoting,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9222".to_string(),
            tab_url_hint: Some("sed.educacao.sp.gov.br".to_string()),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            inter_item_delay_ms: 2000,
            poll_interval_ms: 300,
            detail_timeout_ms: None,
            section_settle_ms: None,
            close_step_timeout_ms: None,
            page_settle_ms: None,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            detail_selectors: strings(&[
                ".modal.in",
                ".modal.show",
                ".modal[style*=\"display: block\"]",
                "[role=\"dialog\"][aria-modal=\"true\"]",
                "dialog[open]",
            ]),
            detail_markers: strings(&["Dados do Aluno", "Ficha do Aluno"]),
            list_selectors: strings(&["table.dataTable", ".dataTables_wrapper table"]),
            list_markers: strings(&["Nome do Aluno"]),
            min_overlay_area: 40_000,
            section_controls: "[role=\"tab\"], .nav a, .nav-tabs a, li a, a, button, .tab".to_string(),
            close_selectors: strings(&[
                ".close",
                "[data-dismiss=\"modal\"]",
                "[data-bs-dismiss=\"modal\"]",
                ".btn-close",
                "[aria-label=\"Close\"]",
                "[aria-label=\"Fechar\"]",
            ]),
            close_words: strings(&["voltar", "fechar", "cancelar", "back", "close", "cancel"]),
            backdrop_selectors: strings(&[".modal-backdrop"]),
            next_words: strings(&["seguinte", "próximo", "next", "›", "»"]),
            next_selectors: strings(&[
                ".pagination .next:not(.disabled) a",
                ".dataTables_paginate .next:not(.disabled)",
                "a[rel=\"next\"]",
            ]),
        }
    }
}

impl Default for ListConfig {
    fn default() -> Self {
        let columns = [
            (1, "nome"),
            (2, "ra_lista"),
            (3, "serie"),
            (4, "uf_lista"),
            (5, "data_nasc_lista"),
            (6, "responsavel_lista"),
        ];

        Self {
            min_cells: 7,
            name_column: 1,
            view_column: Some(7),
            view_selectors: strings(&[
                "i.fa-search",
                "i.fa-eye",
                ".glyphicon-search",
                ".glyphicon-eye-open",
                "[title*=\"isualizar\"]",
            ]),
            columns: columns
                .iter()
                .map(|(index, column)| ListColumn {
                    index: *index,
                    column: column.to_string(),
                })
                .collect(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            sections: strings(SECTION_NAMES),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            snapshot_file: "sed-harvest-snapshot.json".to_string(),
            format: ExportFormat::Csv,
            csv_quoting: CsvQuoting::Rfc4180,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(HarvestError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| HarvestError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| HarvestError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["sed-harvest.toml", ".sed-harvest.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref endpoint) = cli_args.endpoint {
            self.browser.endpoint = endpoint.clone();
        }

        if let Some(ref hint) = cli_args.tab_url_hint {
            self.browser.tab_url_hint = Some(hint.clone());
        }

        if let Some(delay) = cli_args.inter_item_delay_ms {
            self.timing.inter_item_delay_ms = delay;
        }

        if let Some(timeout) = cli_args.detail_timeout_ms {
            self.timing.detail_timeout_ms = Some(timeout);
        }

        if let Some(ref output_dir) = cli_args.output_dir {
            self.output.directory = output_dir.clone();
        }

        if let Some(format) = cli_args.format {
            self.output.format = format;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| HarvestError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| HarvestError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.timing.poll_interval_ms == 0 {
            return Err(HarvestError::Config {
                message: "Poll interval must be greater than 0".to_string(),
            });
        }

        if self.timing.inter_item_delay_ms > 60_000 {
            return Err(HarvestError::Config {
                message: "Inter-item delay must not exceed 60000 ms".to_string(),
            });
        }

        if self.list.min_cells <= self.list.name_column {
            return Err(HarvestError::Config {
                message: "The name column must fall within the minimum cell count".to_string(),
            });
        }

        if self.extraction.sections.is_empty() {
            return Err(HarvestError::Config {
                message: "At least one detail section must be configured".to_string(),
            });
        }

        for section in &self.extraction.sections {
            if !SECTION_NAMES.contains(&section.as_str()) {
                return Err(HarvestError::Config {
                    message: format!(
                        "Unknown section '{}' (known: {})",
                        section,
                        SECTION_NAMES.join(", ")
                    ),
                });
            }
        }

        Detector::new(&self.detection, &self.list.view_selectors)?;
        ListReader::new(&self.list)?;
        dom::selector(&self.detection.section_controls)?;
        for list in [
            &self.detection.close_selectors,
            &self.detection.backdrop_selectors,
            &self.detection.next_selectors,
        ] {
            dom::selectors(list)?;
        }

        if self.output.snapshot_file.trim().is_empty() {
            return Err(HarvestError::Config {
                message: "Snapshot file name must not be empty".to_string(),
            });
        }

        if let Some(parent) = self.output.directory.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(HarvestError::Config {
                    message: format!("Parent directory does not exist: {}", parent.display()),
                });
            }
        }

        Ok(())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.output.directory.join(&self.output.snapshot_file)
    }

    pub fn create_sample_config() -> Result<String> {
        toml::to_string_pretty(&Self::default()).map_err(|e| HarvestError::Config {
            message: format!("Failed to serialize config: {}", e),
        })
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub endpoint: Option<String>,
    pub tab_url_hint: Option<String>,
    pub inter_item_delay_ms: Option<u64>,
    pub detail_timeout_ms: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub format: Option<ExportFormat>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_tab_url_hint(mut self, hint: Option<String>) -> Self {
        self.tab_url_hint = hint;
        self
    }

    pub fn with_inter_item_delay(mut self, delay_ms: Option<u64>) -> Self {
        self.inter_item_delay_ms = delay_ms;
        self
    }

    pub fn with_detail_timeout(mut self, timeout_ms: Option<u64>) -> Self {
        self.detail_timeout_ms = timeout_ms;
        self
    }

    pub fn with_output_dir(mut self, output_dir: Option<PathBuf>) -> Self {
        self.output_dir = output_dir;
        self
    }

    pub fn with_format(mut self, format: Option<ExportFormat>) -> Self {
        self.format = format;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.timing.inter_item_delay_ms, 2000);
        assert_eq!(config.list.view_column, Some(7));
        assert_eq!(config.extraction.sections.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.timing.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.extraction.sections = vec!["Histórico".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.list.min_cells = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detection.next_selectors = vec!["a[rel=".to_string()];
        assert!(matches!(config.validate(), Err(HarvestError::Config { .. })));
    }

    #[test]
    fn test_config_file_operations() {
        let mut config = Config::default();
        config.timing.inter_item_delay_ms = 1500;
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();

        let loaded_config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded_config.timing.inter_item_delay_ms, 1500);
        assert_eq!(loaded_config.detection.close_words, config.detection.close_words);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[timing]\ninter_item_delay_ms = 500\n\n[output]\nformat = \"both\"").unwrap();

        let config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.timing.inter_item_delay_ms, 500);
        assert_eq!(config.timing.poll_interval_ms, 300);
        assert_eq!(config.output.format, ExportFormat::Both);
        assert_eq!(config.list.min_cells, 7);
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();

        let overrides = CliOverrides::new()
            .with_endpoint(Some("http://localhost:9333".to_string()))
            .with_inter_item_delay(Some(800))
            .with_format(Some(ExportFormat::Json));

        config.merge_with_cli_args(&overrides);

        assert_eq!(config.browser.endpoint, "http://localhost:9333");
        assert_eq!(config.timing.inter_item_delay_ms, 800);
        assert_eq!(config.output.format, ExportFormat::Json);
    }

    #[test]
    fn test_sample_config_generation() {
        let sample = Config::create_sample_config().unwrap();
        assert!(sample.contains("[browser]"));
        assert!(sample.contains("[timing]"));
        assert!(sample.contains("[detection]"));
        assert!(sample.contains("[output]"));
    }
}
