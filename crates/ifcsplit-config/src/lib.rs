//! ifcsplit Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.ifcsplit/config.toml`
//! - Local config: `.ifcsplit/config.toml` (in the working directory)
//! - An explicit config file given on the command line
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.

mod error;
mod loader;

pub use error::{ConfigError, FileAction};
pub use loader::ConfigLoader;

use ifcsplit_core::cleanup::CleanupOptions;
use ifcsplit_core::closure::ClosurePolicy;
use ifcsplit_core::diagnose::DEFAULT_SAMPLE_BYTES;
use ifcsplit_core::preprocess::PreprocessOptions;
use ifcsplit_core::splitter::SplitSettings;
use ifcsplit_core::strategy::{
    type_and_property_closure, ChunkStrategy, Discipline, DisciplineTable, MembershipTier,
    SplitMethod, StoreyLookup, DEFAULT_MAX_ELEMENTS,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Log levels accepted in `logging.level`
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Root configuration for ifcsplit.
///
/// Represents the fully merged configuration from all sources.
///
/// # Example TOML
///
/// ```toml
/// [split]
/// method = "chunks"
/// max_elements = 50000
/// storey_lookup = ["identity", "name"]
///
/// [closure.chunks]
/// max_depth = 2
/// edge_kinds = ["type", "property"]
///
/// [[disciplines]]
/// name = "Architecture"
/// types = ["IfcWall", "IfcDoor", "IfcWindow"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Split run defaults
    pub split: SplitSection,

    /// Dependency closure per strategy
    pub closure: ClosureConfig,

    /// Discipline table, in output order
    pub disciplines: Vec<Discipline>,

    /// Cleanup categories
    pub cleanup: CleanupOptions,

    /// Streaming preprocess filter
    pub preprocess: PreprocessOptions,

    /// Diagnose sampling
    pub diagnose: DiagnoseConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            split: SplitSection::default(),
            closure: ClosureConfig::default(),
            disciplines: DisciplineTable::default().iter().cloned().collect(),
            cleanup: CleanupOptions::default(),
            preprocess: PreprocessOptions::default(),
            diagnose: DiagnoseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Split run defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitSection {
    /// Partitioning method
    pub method: SplitMethod,

    /// Chunk size for the chunks method
    pub max_elements: i64,

    /// Run the cleanup pass before partitioning
    pub clean: bool,

    /// Storey membership tiers, tried in order
    pub storey_lookup: Vec<MembershipTier>,
}

impl Default for SplitSection {
    fn default() -> Self {
        Self {
            method: SplitMethod::default(),
            max_elements: DEFAULT_MAX_ELEMENTS as i64,
            clean: false,
            storey_lookup: StoreyLookup::default().tiers().to_vec(),
        }
    }
}

/// Closure policy per strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClosureConfig {
    pub storeys: ClosurePolicy,
    pub disciplines: ClosurePolicy,
    pub chunks: ClosurePolicy,
}

impl Default for ClosureConfig {
    fn default() -> Self {
        Self {
            storeys: type_and_property_closure(),
            disciplines: type_and_property_closure(),
            chunks: ChunkStrategy::default_closure(),
        }
    }
}

/// Diagnose sampling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnoseConfig {
    /// Bytes read from the start of the file
    pub sample_bytes: usize,
}

impl Default for DiagnoseConfig {
    fn default() -> Self {
        Self {
            sample_bytes: DEFAULT_SAMPLE_BYTES,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,

    /// Log file path (optional)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override split method
    pub method: Option<SplitMethod>,

    /// Override chunk size
    pub max_elements: Option<i64>,

    /// Force the cleanup pass on
    pub clean: Option<bool>,

    /// Override log level
    pub log_level: Option<String>,
}

impl SplitConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(method) = overrides.method {
            self.split.method = method;
        }

        if let Some(max_elements) = overrides.max_elements {
            self.split.max_elements = max_elements;
        }

        if let Some(clean) = overrides.clean {
            self.split.clean = clean;
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.split.max_elements <= 0 {
            return Err(ConfigError::invalid_value(
                "split.max_elements",
                format!("must be a positive integer, got {}", self.split.max_elements),
            ));
        }

        if self.split.storey_lookup.is_empty() {
            return Err(ConfigError::invalid_value(
                "split.storey_lookup",
                "at least one lookup tier is required",
            ));
        }

        if self.disciplines.is_empty() {
            return Err(ConfigError::Disciplines(
                "no disciplines defined".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for discipline in &self.disciplines {
            if discipline.name.trim().is_empty() {
                return Err(ConfigError::Disciplines(
                    "discipline with an empty name".to_string(),
                ));
            }
            if !names.insert(discipline.name.to_lowercase()) {
                return Err(ConfigError::Disciplines(format!(
                    "duplicate discipline '{}'",
                    discipline.name
                )));
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "logging.level",
                format!(
                    "unknown level '{}'; expected one of {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Engine settings derived from this configuration.
    pub fn split_settings(&self) -> SplitSettings {
        SplitSettings {
            storey_lookup: StoreyLookup::new(self.split.storey_lookup.clone()),
            disciplines: DisciplineTable::new(self.disciplines.clone()),
            storey_closure: self.closure.storeys.clone(),
            discipline_closure: self.closure.disciplines.clone(),
            chunk_closure: self.closure.chunks.clone(),
            cleanup: self.cleanup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifcsplit_core::graph::ReferenceKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = SplitConfig::default();
        assert_eq!(config.split.method, SplitMethod::Storeys);
        assert_eq!(config.split.max_elements, 100_000);
        assert!(!config.split.clean);
        assert_eq!(
            config.split.storey_lookup,
            vec![MembershipTier::Identity, MembershipTier::Name]
        );
        assert_eq!(config.disciplines.len(), 4);
        assert_eq!(config.disciplines[0].name, "Architecture");
        assert_eq!(config.closure.chunks.edge_kinds, vec![ReferenceKind::TypeAssignment]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = SplitConfig::default();
        let overrides = ConfigOverrides {
            method: Some(SplitMethod::Chunks),
            max_elements: Some(500),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        config.apply_overrides(&overrides);

        assert_eq!(config.split.method, SplitMethod::Chunks);
        assert_eq!(config.split.max_elements, 500);
        assert!(!config.split.clean);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_chunk_size() {
        let mut config = SplitConfig::default();
        config.split.max_elements = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("split.max_elements"));
    }

    #[test]
    fn test_validate_disciplines() {
        let mut config = SplitConfig::default();
        config.disciplines.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Disciplines(_))
        ));

        config.disciplines = vec![
            Discipline::new("MEP", &["IfcPipeSegment"]),
            Discipline::new("mep", &["IfcDuctSegment"]),
        ];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate discipline"));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = SplitConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "WARN".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: SplitConfig = toml::from_str(
            r#"
            [split]
            method = "disciplines"

            [closure.storeys]
            max_depth = 1
            edge_kinds = ["type", "material"]

            [[disciplines]]
            name = "Shell"
            types = ["IfcWall", "IfcRoof"]
            "#,
        )
        .unwrap();

        assert_eq!(config.split.method, SplitMethod::Disciplines);
        assert_eq!(config.split.max_elements, 100_000);
        assert_eq!(config.closure.storeys.max_depth, 1);
        assert_eq!(
            config.closure.storeys.edge_kinds,
            vec![ReferenceKind::TypeAssignment, ReferenceKind::MaterialAssociation]
        );
        assert_eq!(config.closure.chunks, ChunkStrategy::default_closure());
        assert_eq!(config.disciplines, vec![Discipline::new("Shell", &["IfcWall", "IfcRoof"])]);
    }

    #[test]
    fn test_split_settings() {
        let mut config = SplitConfig::default();
        config.split.storey_lookup = vec![MembershipTier::Name];
        config.cleanup.remove_grids = false;

        let settings = config.split_settings();
        assert_eq!(settings.storey_lookup.tiers(), &[MembershipTier::Name]);
        assert_eq!(settings.disciplines.len(), 4);
        assert!(!settings.cleanup.remove_grids);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = SplitConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: SplitConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
