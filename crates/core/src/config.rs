use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::engine::DEFAULT_TOP_N;
use crate::error::{RecommendError, Result};
use crate::recipe::{DatasetOptions, DEFAULT_INGREDIENTS_COLUMN, DEFAULT_NAME_COLUMN};
use crate::vectorizer::Weighting;

pub const DEFAULT_CONFIG: &str = "dishmatch.toml";
pub const DEFAULT_DATASET: &str = "indian_food.csv";
pub const DEFAULT_MODEL: &str = "dish_recommender.model";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dataset_path: PathBuf,
    pub model_path: PathBuf,
    pub top_n: usize,
    pub weighting: Weighting,
    pub name_column: String,
    pub ingredients_column: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from(DEFAULT_DATASET),
            model_path: PathBuf::from(DEFAULT_MODEL),
            top_n: DEFAULT_TOP_N,
            weighting: Weighting::Binary,
            name_column: DEFAULT_NAME_COLUMN.to_string(),
            ingredients_column: DEFAULT_INGREDIENTS_COLUMN.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    engine: EngineConfig,
}

impl EngineConfig {
    /// Reads `DISHMATCH_CONFIG` (or `dishmatch.toml` when present), then
    /// applies `DISHMATCH_*` environment overrides.
    pub fn load() -> Result<Self> {
        let explicit = env::var("DISHMATCH_CONFIG").ok().map(PathBuf::from);
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            RecommendError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        debug!(path = %path.display(), "read engine config");
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str::<ConfigFile>(contents)?.engine)
    }

    /// Applies overrides from `lookup`, which maps an environment variable
    /// name to its value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("DISHMATCH_DATASET") {
            self.dataset_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("DISHMATCH_MODEL") {
            self.model_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("DISHMATCH_TOP_N") {
            self.top_n = value
                .trim()
                .parse()
                .map_err(|_| RecommendError::Config(format!("invalid DISHMATCH_TOP_N {value}")))?;
        }
        if let Some(value) = lookup("DISHMATCH_WEIGHTING") {
            self.weighting = value.parse()?;
        }
        if self.top_n == 0 {
            return Err(RecommendError::InvalidTopN);
        }
        Ok(())
    }

    pub fn dataset_options(&self) -> DatasetOptions {
        DatasetOptions {
            name_column: self.name_column.clone(),
            ingredients_column: self.ingredients_column.clone(),
        }
    }
}
