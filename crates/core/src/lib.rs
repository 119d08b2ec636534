mod artifact;
mod bootstrap;
mod config;
mod engine;
mod error;
mod recipe;
mod vectorizer;

pub use artifact::{export_recipes_json, load_model, save_model, ModelArtifact, ARTIFACT_VERSION};
pub use bootstrap::{load_or_train, train};
pub use config::{EngineConfig, DEFAULT_CONFIG, DEFAULT_DATASET, DEFAULT_MODEL};
pub use engine::{
    annotate, cosine_similarity, rank, Annotation, EngineHandle, EngineState, Recommendation,
    Recommender, DEFAULT_TOP_N,
};
pub use error::{RecommendError, Result};
pub use recipe::{
    load_dataset, normalize_query_ingredient, read_recipes, tokenize_ingredients, DatasetOptions,
    Recipe,
};
pub use vectorizer::{CorpusMatrix, CorpusVectorizer, SparseVector, Vocabulary, Weighting};
