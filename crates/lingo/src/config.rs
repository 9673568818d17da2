use std::path::Path;

use serde::Deserialize;

use crate::LingoError;

/// On-disk catalog format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogFormat {
    /// Compiled binary catalogs (the default).
    #[default]
    Mo,
    /// JSON catalog documents.
    Json,
}

impl CatalogFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mo => "mo",
            Self::Json => "json",
        }
    }
}

/// Engine configuration, loadable from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Catalog base: a directory path or an `http(s)://` / `file://` URL.
    #[serde(default = "default_base")]
    pub base: String,
    #[serde(default)]
    pub format: CatalogFormat,
    /// The textdomain used by the engine's lookup wrappers.
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Preferred locales, negotiated against the requested locale list.
    #[serde(default)]
    pub locales: Vec<String>,
    /// Whether candidate expansion includes shorter tag prefixes.
    #[serde(default = "default_region_fallback")]
    pub region_fallback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            format: CatalogFormat::default(),
            domain: default_domain(),
            locales: Vec::new(),
            region_fallback: default_region_fallback(),
        }
    }
}

fn default_base() -> String {
    "locale".to_string()
}

fn default_domain() -> String {
    "messages".to_string()
}

fn default_region_fallback() -> bool {
    true
}

pub fn read_engine_toml(path: &Path) -> Result<EngineConfig, LingoError> {
    let text = std::fs::read_to_string(path)?;
    toml::from_str(&text)
        .map_err(|err| LingoError::Config(format!("failed to parse {}: {err}", path.display())))
}
