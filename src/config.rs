use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ast::{CompileOptions, Dialect, DialectKind};

fn default_dialect() -> DialectKind {
    DialectKind::Postgres
}

fn default_cache_capacity() -> usize {
    1024
}

/// Compiler settings read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default = "default_dialect")]
    pub dialect: DialectKind,
    #[serde(default)]
    pub evaluate_constants: bool,
    #[serde(default)]
    pub schema_name: Option<String>,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Overrides whether the dialect drops partial-index conditions.
    #[serde(default)]
    pub strip_index_conditions: Option<bool>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            dialect: default_dialect(),
            evaluate_constants: false,
            schema_name: None,
            cache_capacity: default_cache_capacity(),
            strip_index_conditions: None,
        }
    }
}

impl CompilerConfig {
    pub fn get_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ormsql")
            .join("config.toml")
    }

    /// Loads `path`, or the default location when `path` is `None`. A missing
    /// default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::get_config_path();
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn dialect(&self) -> Dialect {
        let dialect = Dialect::for_kind(self.dialect);
        match self.strip_index_conditions {
            Some(strip) => dialect.with_index_condition_stripping(strip),
            None => dialect,
        }
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            evaluate_constants: self.evaluate_constants,
            for_update: false,
            schema_name: self.schema_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::dialect::AmenderKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(CompilerConfig::from_toml("").unwrap(), CompilerConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let config = CompilerConfig::from_toml(
            r#"
dialect = "mysql"
evaluate_constants = true
schema_name = "shop"
cache_capacity = 64
strip_index_conditions = false
"#,
        )
        .unwrap();
        assert_eq!(config.dialect, DialectKind::MySql);
        assert_eq!(config.cache_capacity, 64);
        assert_eq!(config.compile_options().schema_name.as_deref(), Some("shop"));
        assert!(config.compile_options().evaluate_constants);
        assert!(!config
            .dialect()
            .amenders()
            .contains(&AmenderKind::StripIndexConditions));
    }

    #[test]
    fn test_unknown_dialect_is_rejected() {
        assert!(CompilerConfig::from_toml(r#"dialect = "oracle""#).is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("ormsql-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let config = CompilerConfig {
            dialect: DialectKind::Sqlite,
            schema_name: Some("main".into()),
            ..CompilerConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(CompilerConfig::load(Some(&path)).unwrap(), config);
        std::fs::remove_dir_all(&dir).unwrap();

        assert!(CompilerConfig::load(Some(&path)).is_err());
    }
}
