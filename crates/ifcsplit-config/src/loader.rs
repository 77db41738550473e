//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.ifcsplit/config.toml`
//! 2. Local config: `.ifcsplit/config.toml` (in the working directory), or
//!    an explicit file set with [`ConfigLoader::with_config_file`]
//! 3. CLI overrides
//!
//! Later sources override earlier ones.

use crate::error::{ConfigError, FileAction};
use crate::{
    ClosureConfig, ConfigOverrides, DiagnoseConfig, LoggingConfig, SplitConfig, SplitSection,
};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".ifcsplit";

/// Local configuration directory name.
const LOCAL_CONFIG_DIR: &str = ".ifcsplit";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.ifcsplit`)
    global_config_dir: Option<PathBuf>,

    /// File used in place of the local config
    config_file: Option<PathBuf>,

    /// Cached global config
    global_config: Option<SplitConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.ifcsplit`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            config_file: None,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            config_file: None,
            global_config: None,
        }
    }

    /// Read `path` instead of the local config file.
    ///
    /// Unlike the local file, an explicit file must exist.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a working directory.
    pub fn local_config_path(&self, root: &Path) -> PathBuf {
        root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a working directory with optional CLI overrides.
    ///
    /// Merges config in order: global → local (or explicit file) → overrides.
    pub fn load(
        &mut self,
        root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<SplitConfig, ConfigError> {
        let mut config = SplitConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        let second = match &self.config_file {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::MissingFile(path.clone()));
                }
                debug!("Loading config from {:?}", path);
                Some(load_config_file(path)?)
            }
            None => self.load_local(root)?,
        };
        if let Some(local_config) = second {
            config = merge_configs(config, local_config);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<SplitConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;
        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration for a working directory.
    pub fn load_local(&self, root: &Path) -> Result<Option<SplitConfig>, ConfigError> {
        let local_path = self.local_config_path(root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    /// Save configuration to the local config file.
    pub fn save_local(&self, root: &Path, config: &SplitConfig) -> Result<(), ConfigError> {
        save_config_file(&self.local_config_path(root), config)
    }

    /// Initialize global configuration.
    ///
    /// Creates `~/.ifcsplit/config.toml` with default configuration.
    pub fn init_global(&self) -> Result<PathBuf, ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };
        init_config_file(global_dir)
    }

    /// Initialize local configuration.
    ///
    /// Creates `.ifcsplit/config.toml` with default configuration.
    pub fn init_local(&self, root: &Path) -> Result<PathBuf, ConfigError> {
        init_config_file(&root.join(LOCAL_CONFIG_DIR))
    }

    /// Clear cached global configuration.
    ///
    /// Forces reload on next `load_global()` call.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

/// Write a default config into `dir` unless one exists.
fn init_config_file(dir: &Path) -> Result<PathBuf, ConfigError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .map_err(|e| ConfigError::file(FileAction::CreateDir, dir, e))?;
    }

    let config_path = dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        save_config_file(&config_path, &SplitConfig::default())?;
    }

    Ok(config_path)
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path) -> Result<SplitConfig, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::file(FileAction::Read, path, e))?;

    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &SplitConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::file(FileAction::CreateDir, parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::file(FileAction::Write, path, e))
}

/// Pick `overlay` when it differs from the default, otherwise keep `base`.
fn prefer<T: PartialEq>(base: T, overlay: T, default: T) -> T {
    if overlay != default {
        overlay
    } else {
        base
    }
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// This performs a field-by-field merge, allowing partial configs.
fn merge_configs(base: SplitConfig, overlay: SplitConfig) -> SplitConfig {
    let defaults = SplitConfig::default();
    SplitConfig {
        split: merge_split(base.split, overlay.split),
        closure: merge_closure(base.closure, overlay.closure),
        // The table is replaced as a whole; entries are never mixed
        disciplines: prefer(base.disciplines, overlay.disciplines, defaults.disciplines),
        cleanup: prefer(base.cleanup, overlay.cleanup, defaults.cleanup),
        preprocess: prefer(base.preprocess, overlay.preprocess, defaults.preprocess),
        diagnose: DiagnoseConfig {
            sample_bytes: prefer(
                base.diagnose.sample_bytes,
                overlay.diagnose.sample_bytes,
                defaults.diagnose.sample_bytes,
            ),
        },
        logging: merge_logging(base.logging, overlay.logging),
    }
}

/// Merge split section, overlay values override base.
fn merge_split(base: SplitSection, overlay: SplitSection) -> SplitSection {
    let defaults = SplitSection::default();
    SplitSection {
        method: prefer(base.method, overlay.method, defaults.method),
        max_elements: prefer(base.max_elements, overlay.max_elements, defaults.max_elements),
        clean: base.clean || overlay.clean,
        storey_lookup: prefer(
            base.storey_lookup,
            overlay.storey_lookup,
            defaults.storey_lookup,
        ),
    }
}

/// Merge closure policies per strategy.
fn merge_closure(base: ClosureConfig, overlay: ClosureConfig) -> ClosureConfig {
    let defaults = ClosureConfig::default();
    ClosureConfig {
        storeys: prefer(base.storeys, overlay.storeys, defaults.storeys),
        disciplines: prefer(base.disciplines, overlay.disciplines, defaults.disciplines),
        chunks: prefer(base.chunks, overlay.chunks, defaults.chunks),
    }
}

/// Merge logging config.
fn merge_logging(base: LoggingConfig, overlay: LoggingConfig) -> LoggingConfig {
    LoggingConfig {
        level: if overlay.level != "info" {
            overlay.level
        } else {
            base.level
        },
        format: overlay.format,
        file: overlay.file.or(base.file),
    }
}
