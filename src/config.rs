use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

pub const API_KEY_VAR: &str = "GOOGLE_API_KEY";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// Settings shared by every stage. Built once in `main` and passed down.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub sites_file: PathBuf,
    pub config_file: PathBuf,
    pub output_dir: PathBuf,
    pub consolidated_file: PathBuf,
    pub report_file: PathBuf,
    pub analyst_errors_file: PathBuf,
    pub extractor_errors_file: PathBuf,
    pub max_pages: usize,
    pub http_timeout: Duration,
    pub page_load_timeout: Duration,
}

impl AppConfig {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key))
    }

    /// Builds the configuration from an arbitrary variable lookup, so tests
    /// never have to touch the real environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let or_default = |var: &str, default: &str| -> String {
            lookup(var).unwrap_or_else(|_| default.to_string())
        };

        let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
            let raw = or_default(var, default);
            raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
        };

        let api_key = lookup(API_KEY_VAR)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let max_pages = parse_u64("SCOUT_MAX_PAGES", "3")?;
        if max_pages == 0 {
            return Err(ConfigError::InvalidEnvVar {
                var: "SCOUT_MAX_PAGES".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            api_key,
            model: or_default("GEMINI_MODEL", "gemini-1.5-flash-latest"),
            api_base: or_default("GEMINI_API_BASE", "https://generativelanguage.googleapis.com"),
            sites_file: PathBuf::from(or_default("SCOUT_SITES_FILE", "sites_para_analisar.txt")),
            config_file: PathBuf::from(or_default("SCOUT_CONFIG_FILE", "configuracao_scrapers.json")),
            output_dir: PathBuf::from(or_default("SCOUT_OUTPUT_DIR", "dados_extraidos")),
            consolidated_file: PathBuf::from(or_default(
                "SCOUT_CONSOLIDATED_FILE",
                "OFERTAS_CONSOLIDADAS.csv",
            )),
            report_file: PathBuf::from(or_default(
                "SCOUT_REPORT_FILE",
                "Relatorio_Mercado_Imobiliario.pdf",
            )),
            analyst_errors_file: PathBuf::from("relatorio_erros_analista.txt"),
            extractor_errors_file: PathBuf::from("relatorio_erros_extrator.txt"),
            max_pages: max_pages as usize,
            http_timeout: Duration::from_secs(parse_u64("SCOUT_HTTP_TIMEOUT_SECS", "20")?),
            page_load_timeout: Duration::from_secs(parse_u64("SCOUT_PAGE_LOAD_TIMEOUT_SECS", "30")?),
        })
    }
}

/// Inserts `_<run_id>` before the extension: `report.pdf` -> `report_abc.pdf`.
pub fn namespaced(path: &Path, run_id: Option<&str>) -> PathBuf {
    let Some(run_id) = run_id.map(str::trim).filter(|id| !id.is_empty()) else {
        return path.to_path_buf();
    };

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{stem}_{run_id}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{run_id}"),
    };
    path.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Result<String, std::env::VarError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned().ok_or(std::env::VarError::NotPresent)
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.api_key, None);
        assert_eq!(config.max_pages, 3);
        assert_eq!(config.config_file, PathBuf::from("configuracao_scrapers.json"));
        assert_eq!(config.page_load_timeout, Duration::from_secs(30));
    }

    #[test]
    fn blank_api_key_is_treated_as_missing() {
        let config = AppConfig::from_lookup(lookup_from(&[(API_KEY_VAR, "   ")])).unwrap();
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn rejects_unparsable_numbers() {
        let err = AppConfig::from_lookup(lookup_from(&[("SCOUT_MAX_PAGES", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { ref var, .. } if var == "SCOUT_MAX_PAGES"));

        let err = AppConfig::from_lookup(lookup_from(&[("SCOUT_MAX_PAGES", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
    }

    #[test]
    fn namespacing_inserts_run_id_before_extension() {
        let path = Path::new("out/Relatorio.pdf");
        assert_eq!(namespaced(path, Some("sjdr-01")), PathBuf::from("out/Relatorio_sjdr-01.pdf"));
        assert_eq!(namespaced(path, None), PathBuf::from("out/Relatorio.pdf"));
        assert_eq!(namespaced(path, Some(" ")), PathBuf::from("out/Relatorio.pdf"));
        assert_eq!(namespaced(Path::new("sites"), Some("x")), PathBuf::from("sites_x"));
    }
}
