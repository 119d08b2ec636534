use std::fs;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use flate2::read::MultiGzDecoder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{RecommendError, Result};

static INGREDIENT_DELIMITER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*").expect("ingredient delimiter regex"));

pub const DEFAULT_NAME_COLUMN: &str = "name";
pub const DEFAULT_INGREDIENTS_COLUMN: &str = "ingredients";

/// A single dish from the dataset. Immutable once loaded; identified by its
/// row position in the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub raw_ingredients: String,
    pub ingredient_tokens: Vec<String>,
}

impl Recipe {
    /// Builds a recipe from its raw fields. Returns `None` when the name is
    /// blank or the ingredient field yields no tokens.
    pub fn parse(name: &str, raw_ingredients: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let ingredient_tokens = tokenize_ingredients(raw_ingredients);
        if ingredient_tokens.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            raw_ingredients: raw_ingredients.to_string(),
            ingredient_tokens,
        })
    }

    pub fn total_ingredients(&self) -> usize {
        self.ingredient_tokens.len()
    }
}

/// Lowercases the field and splits it on commas (plus any following
/// whitespace). Pieces are trimmed and empty pieces dropped; order and
/// duplicates are kept.
pub fn tokenize_ingredients(raw: &str) -> Vec<String> {
    let lowered = raw.to_lowercase();
    INGREDIENT_DELIMITER
        .split(&lowered)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Case-folds and trims a user-supplied ingredient string.
pub fn normalize_query_ingredient(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct DatasetOptions {
    pub name_column: String,
    pub ingredients_column: String,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            name_column: DEFAULT_NAME_COLUMN.to_string(),
            ingredients_column: DEFAULT_INGREDIENTS_COLUMN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TabularFormat {
    Csv,
    Tsv,
    CsvGz,
    TsvGz,
}

impl TabularFormat {
    fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tsv.gz") {
            TabularFormat::TsvGz
        } else if name.ends_with(".csv.gz") || name.ends_with(".gz") {
            TabularFormat::CsvGz
        } else if name.ends_with(".tsv") {
            TabularFormat::Tsv
        } else {
            TabularFormat::Csv
        }
    }

    fn delimiter(self) -> u8 {
        match self {
            TabularFormat::Csv | TabularFormat::CsvGz => b',',
            TabularFormat::Tsv | TabularFormat::TsvGz => b'\t',
        }
    }
}

/// Reads the recipe table at `path`. Plain and gzip-compressed CSV/TSV are
/// recognised by extension.
pub fn load_dataset(path: &Path, opts: &DatasetOptions) -> Result<Vec<Recipe>> {
    if !path.exists() {
        return Err(RecommendError::DatasetMissing(path.to_path_buf()));
    }
    let format = TabularFormat::from_path(path);
    let file = fs::File::open(path)?;
    info!(path = %path.display(), ?format, "loading recipe dataset");
    match format {
        TabularFormat::Csv | TabularFormat::Tsv => {
            read_recipes(file, format.delimiter(), opts)
        }
        TabularFormat::CsvGz | TabularFormat::TsvGz => {
            read_recipes(MultiGzDecoder::new(file), format.delimiter(), opts)
        }
    }
}

/// Parses recipes from any tabular reader with a header row. Rows that are
/// malformed or missing a name/ingredients value are dropped; a table with
/// no usable rows is an error.
pub fn read_recipes<R: Read>(
    reader: R,
    delimiter: u8,
    opts: &DatasetOptions,
) -> Result<Vec<Recipe>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);
    let headers = reader.headers()?.clone();
    let name_idx = column_index(&headers, &opts.name_column)?;
    let ingredients_idx = column_index(&headers, &opts.ingredients_column)?;

    let mut recipes = Vec::new();
    let mut dropped = 0usize;
    for (row, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                debug!(row, error = %err, "dropping unparseable row");
                dropped += 1;
                continue;
            }
        };
        let parsed = match (record.get(name_idx), record.get(ingredients_idx)) {
            (Some(name), Some(ingredients)) => Recipe::parse(name, ingredients),
            _ => None,
        };
        match parsed {
            Some(recipe) => recipes.push(recipe),
            None => {
                debug!(row, "dropping row without name or ingredients");
                dropped += 1;
            }
        }
    }
    if dropped > 0 {
        warn!(dropped, kept = recipes.len(), "dropped incomplete dataset rows");
    }
    if recipes.is_empty() {
        return Err(RecommendError::Dataset(
            "dataset contains no usable recipes".to_string(),
        ));
    }
    Ok(recipes)
}

fn column_index(headers: &csv::StringRecord, column: &str) -> Result<usize> {
    headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(column))
        .ok_or_else(|| RecommendError::Dataset(format!("missing required column `{column}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn tokenize_lowercases_and_splits_on_commas() {
        let tokens = tokenize_ingredients("Rice,  Onion ,green CHILI,,");
        assert_eq!(tokens, vec!["rice", "onion", "green chili"]);
    }

    #[test]
    fn parse_rejects_blank_fields() {
        assert!(Recipe::parse("  ", "rice").is_none());
        assert!(Recipe::parse("Khichdi", " , ").is_none());
        let recipe = Recipe::parse(" Khichdi ", "Rice, Moong dal").unwrap();
        assert_eq!(recipe.name, "Khichdi");
        assert_eq!(recipe.total_ingredients(), 2);
    }

    #[test]
    fn read_recipes_drops_incomplete_rows() {
        let data = "name,ingredients,diet\n\
                    Aloo gobi,\"potato, cauliflower\",vegetarian\n\
                    ,\"rice, dal\",vegetarian\n\
                    Jeera rice,,vegetarian\n\
                    Short row\n\
                    Poha,\"flattened rice, onion\",vegetarian\n";
        let recipes = read_recipes(data.as_bytes(), b',', &DatasetOptions::default()).unwrap();
        let names: Vec<_> = recipes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Aloo gobi", "Poha"]);
    }

    #[test]
    fn read_recipes_requires_columns() {
        let data = "title,ingredients\nPoha,rice\n";
        let err = read_recipes(data.as_bytes(), b',', &DatasetOptions::default()).unwrap_err();
        assert!(matches!(err, RecommendError::Dataset(msg) if msg.contains("`name`")));
    }

    #[test]
    fn unreadable_header_is_a_dataset_error() {
        let data: &[u8] = b"na\xffme,ingredients\nPoha,rice\n";
        let err = read_recipes(data, b',', &DatasetOptions::default()).unwrap_err();
        assert!(matches!(err, RecommendError::Dataset(msg) if msg.starts_with("malformed table")));
    }

    #[test]
    fn read_recipes_rejects_empty_corpus() {
        let data = "name,ingredients\nPoha,\n";
        let err = read_recipes(data.as_bytes(), b',', &DatasetOptions::default()).unwrap_err();
        assert!(matches!(err, RecommendError::Dataset(_)));
    }

    #[test]
    fn custom_columns_are_honoured() {
        let opts = DatasetOptions {
            name_column: "TranslatedRecipeName".to_string(),
            ingredients_column: "TranslatedIngredients".to_string(),
        };
        let data = "TranslatedRecipeName\tTranslatedIngredients\nUpma\tsemolina, mustard seeds\n";
        let recipes = read_recipes(data.as_bytes(), b'\t', &opts).unwrap();
        assert_eq!(recipes[0].ingredient_tokens, vec!["semolina", "mustard seeds"]);
    }

    #[test]
    fn load_dataset_reads_gzip_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recipes.csv.gz");
        let mut encoder = GzEncoder::new(fs::File::create(&path).unwrap(), Compression::default());
        writeln!(encoder, "name,ingredients").unwrap();
        writeln!(encoder, "Dal tadka,\"toor dal, ghee, cumin\"").unwrap();
        encoder.finish().unwrap();
        let recipes = load_dataset(&path, &DatasetOptions::default()).unwrap();
        assert_eq!(recipes.len(), 1);
        assert_eq!(recipes[0].ingredient_tokens, vec!["toor dal", "ghee", "cumin"]);
    }

    #[test]
    fn load_dataset_reports_missing_file() {
        let err = load_dataset(Path::new("/nonexistent/recipes.csv"), &DatasetOptions::default())
            .unwrap_err();
        assert!(matches!(err, RecommendError::DatasetMissing(_)));
    }
}
