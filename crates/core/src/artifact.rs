use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::engine::Recommender;
use crate::error::{RecommendError, Result};
use crate::recipe::{tokenize_ingredients, Recipe};
use crate::vectorizer::{Vocabulary, Weighting};

pub const ARTIFACT_VERSION: u32 = 1;

/// Persisted form of a trained recommender. The matrix is not stored; it is
/// rebuilt from the recipes and vocabulary on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub weighting: Weighting,
    pub vocabulary: Vocabulary,
    pub fingerprint: String,
    pub recipes: Vec<Recipe>,
}

impl ModelArtifact {
    pub fn from_engine(engine: &Recommender) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            weighting: engine.weighting(),
            vocabulary: engine.vocabulary().clone(),
            fingerprint: engine.vocabulary().fingerprint(),
            recipes: engine.recipes().to_vec(),
        }
    }

    /// Validates the bundle and re-vectorizes the stored recipes.
    pub fn into_engine(self) -> Result<Recommender> {
        if self.version != ARTIFACT_VERSION {
            return Err(RecommendError::ModelMismatch(format!(
                "unsupported artifact version {} (expected {ARTIFACT_VERSION})",
                self.version
            )));
        }
        let actual = self.vocabulary.fingerprint();
        if actual != self.fingerprint {
            return Err(RecommendError::ModelMismatch(format!(
                "vocabulary fingerprint {actual} does not match stored {}",
                self.fingerprint
            )));
        }
        let stale = self.recipes.iter().find(|recipe| {
            tokenize_ingredients(&recipe.raw_ingredients) != recipe.ingredient_tokens
        });
        if let Some(recipe) = stale {
            return Err(RecommendError::ModelMismatch(format!(
                "stored ingredients of `{}` do not match its raw ingredient list",
                recipe.name
            )));
        }
        Recommender::from_parts(self.recipes, self.vocabulary, self.weighting)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let buf = bincode::serialize(self)?;
        let mut encoder = zstd::stream::Encoder::new(Vec::new(), 3)?;
        encoder.write_all(&buf)?;
        Ok(encoder.finish()?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut decoder = zstd::stream::Decoder::new(bytes)?;
        let mut buf = Vec::new();
        decoder.read_to_end(&mut buf)?;
        Ok(bincode::deserialize(&buf)?)
    }
}

/// Writes the model to `path` through a temporary file in the same
/// directory, so readers never see a partial artifact.
pub fn save_model<P: AsRef<Path>>(engine: &Recommender, path: P) -> Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let bytes = ModelArtifact::from_engine(engine).to_bytes()?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(&bytes)?;
    tmp.persist(path).map_err(|err| RecommendError::Io(err.error))?;
    info!(path = %path.display(), bytes = bytes.len(), "saved model artifact");
    Ok(())
}

pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Recommender> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    let engine = ModelArtifact::from_bytes(&buf)?.into_engine()?;
    info!(
        path = %path.display(),
        recipes = engine.recipes().len(),
        ingredients = engine.vocabulary().len(),
        "loaded model artifact"
    );
    Ok(engine)
}

#[derive(Serialize)]
struct RecipeExport<'a> {
    recipes: Vec<RecipeExportRow<'a>>,
}

#[derive(Serialize)]
struct RecipeExportRow<'a> {
    name: &'a str,
    ingredients: &'a str,
    ingredient_tokens: &'a [String],
}

/// Writes the recipe table as pretty JSON for frontend consumption.
pub fn export_recipes_json<P: AsRef<Path>>(recipes: &[Recipe], path: P) -> Result<()> {
    let export = RecipeExport {
        recipes: recipes
            .iter()
            .map(|recipe| RecipeExportRow {
                name: &recipe.name,
                ingredients: &recipe.raw_ingredients,
                ingredient_tokens: &recipe.ingredient_tokens,
            })
            .collect(),
    };
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &export)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn engine() -> Recommender {
        let recipes = vec![
            Recipe::parse("Chana masala", "chickpeas, onion, tomato").unwrap(),
            Recipe::parse("Rajma", "kidney beans, onion, tomato, ginger").unwrap(),
        ];
        Recommender::train(recipes, Weighting::Count).unwrap()
    }

    #[test]
    fn artifact_preserves_vocabulary_and_recipes() {
        let original = engine();
        let bytes = ModelArtifact::from_engine(&original).to_bytes().unwrap();
        let restored = ModelArtifact::from_bytes(&bytes).unwrap().into_engine().unwrap();
        assert_eq!(restored.weighting(), Weighting::Count);
        assert_eq!(restored.recipes(), original.recipes());
        assert_eq!(restored.vocabulary().fingerprint(), original.vocabulary().fingerprint());
        assert_eq!(restored.matrix(), original.matrix());
    }

    #[test]
    fn tampered_vocabulary_is_rejected() {
        let mut artifact = ModelArtifact::from_engine(&engine());
        artifact.fingerprint = "0".repeat(64);
        let err = artifact.into_engine().unwrap_err();
        assert!(matches!(err, RecommendError::ModelMismatch(_)));
    }

    #[test]
    fn foreign_recipes_are_rejected() {
        let mut artifact = ModelArtifact::from_engine(&engine());
        artifact
            .recipes
            .push(Recipe::parse("Dosa", "rice, urad dal").unwrap());
        let err = artifact.into_engine().unwrap_err();
        assert!(matches!(err, RecommendError::ModelMismatch(_)));
    }

    #[test]
    fn tokens_disagreeing_with_raw_ingredients_are_rejected() {
        let mut artifact = ModelArtifact::from_engine(&engine());
        artifact.recipes[0].raw_ingredients = "chickpeas, onion, tomato, ginger".to_string();
        let err = artifact.into_engine().unwrap_err();
        assert!(matches!(err, RecommendError::ModelMismatch(msg) if msg.contains("Chana masala")));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut artifact = ModelArtifact::from_engine(&engine());
        artifact.version = ARTIFACT_VERSION + 1;
        assert!(matches!(
            artifact.into_engine(),
            Err(RecommendError::ModelMismatch(_))
        ));
    }

    #[test]
    fn save_creates_parent_dirs_and_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("models/dish.model");
        save_model(&engine(), &path).unwrap();
        let loaded = load_model(&path).unwrap();
        assert_eq!(loaded.recipes().len(), 2);
    }

    #[test]
    fn garbage_bytes_fail_to_load() {
        assert!(ModelArtifact::from_bytes(b"not a model").is_err());
    }

    #[test]
    fn export_writes_recipe_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recipes.json");
        export_recipes_json(engine().recipes(), &path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["recipes"][1]["name"], "Rajma");
        assert_eq!(value["recipes"][0]["ingredient_tokens"][2], "tomato");
    }
}
