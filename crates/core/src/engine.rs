use std::sync::atomic::{AtomicU8, Ordering};

use once_cell::sync::OnceCell;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{RecommendError, Result};
use crate::recipe::{normalize_query_ingredient, Recipe};
use crate::vectorizer::{CorpusMatrix, CorpusVectorizer, SparseVector, Vocabulary, Weighting};

pub const DEFAULT_TOP_N: usize = 5;

/// Cosine similarity of two non-negative sparse vectors. A zero-norm side
/// scores 0.0 so ranking stays total.
pub fn cosine_similarity(query: &SparseVector, row: &SparseVector) -> f32 {
    if query.norm_sq() == 0.0 || row.norm_sq() == 0.0 {
        return 0.0;
    }
    let score = query.dot(row) / (query.norm_sq() * row.norm_sq()).sqrt();
    score.clamp(0.0, 1.0)
}

/// Scores every matrix row against `query` and returns the best `top_n`
/// as `(row_index, score)`, highest score first, ties by ascending row.
pub fn rank(
    query: &SparseVector,
    matrix: &CorpusMatrix,
    top_n: usize,
) -> Result<Vec<(usize, f32)>> {
    if top_n == 0 {
        return Err(RecommendError::InvalidTopN);
    }
    let mut scored: Vec<(usize, f32)> = matrix
        .rows()
        .par_iter()
        .enumerate()
        .map(|(idx, row)| (idx, cosine_similarity(query, row)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(top_n);
    Ok(scored)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub matching_count: usize,
    pub total_ingredients: usize,
    pub missing_ingredients: Vec<String>,
}

/// Splits a recipe's tokens into matched and missing. A token matches when
/// any query ingredient is a case-insensitive substring of it.
///
/// Open question: this is looser than the exact-token lookup used for
/// ranking, so a recipe can show matches while scoring 0. Both rules are
/// kept as observed rather than unified.
pub fn annotate<S: AsRef<str>>(recipe: &Recipe, query_ingredients: &[S]) -> Annotation {
    let query: Vec<String> = query_ingredients
        .iter()
        .map(|ingredient| normalize_query_ingredient(ingredient.as_ref()))
        .filter(|ingredient| !ingredient.is_empty())
        .collect();
    let mut matching_count = 0;
    let mut missing_ingredients = Vec::new();
    for token in &recipe.ingredient_tokens {
        let token_lower = token.to_lowercase();
        if query.iter().any(|q| token_lower.contains(q.as_str())) {
            matching_count += 1;
        } else {
            missing_ingredients.push(token.clone());
        }
    }
    Annotation {
        matching_count,
        total_ingredients: recipe.total_ingredients(),
        missing_ingredients,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub row: usize,
    pub recipe: Recipe,
    pub score: f32,
    pub matching_count: usize,
    pub total_ingredients: usize,
    pub missing_ingredients: Vec<String>,
}

/// The fitted engine: recipes, their vocabulary and matrix. Read-only once
/// constructed, so a single instance can serve concurrent queries.
#[derive(Debug, Clone)]
pub struct Recommender {
    vectorizer: CorpusVectorizer,
    vocabulary: Vocabulary,
    matrix: CorpusMatrix,
    recipes: Vec<Recipe>,
}

impl Recommender {
    /// Fits a vocabulary on `recipes` and vectorizes them.
    pub fn train(recipes: Vec<Recipe>, weighting: Weighting) -> Result<Self> {
        let vectorizer = CorpusVectorizer::new(weighting);
        let (vocabulary, matrix) = vectorizer.build(&recipes)?;
        info!(
            recipes = recipes.len(),
            ingredients = vocabulary.len(),
            %weighting,
            "trained recommender"
        );
        Ok(Self {
            vectorizer,
            vocabulary,
            matrix,
            recipes,
        })
    }

    /// Rebuilds the matrix from stored recipes and a previously fitted
    /// vocabulary.
    pub fn from_parts(
        recipes: Vec<Recipe>,
        vocabulary: Vocabulary,
        weighting: Weighting,
    ) -> Result<Self> {
        if recipes.is_empty() {
            return Err(RecommendError::ModelMismatch(
                "model contains no recipes".to_string(),
            ));
        }
        let vectorizer = CorpusVectorizer::new(weighting);
        let matrix = vectorizer.transform(&vocabulary, &recipes)?;
        Ok(Self {
            vectorizer,
            vocabulary,
            matrix,
            recipes,
        })
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn matrix(&self) -> &CorpusMatrix {
        &self.matrix
    }

    pub fn weighting(&self) -> Weighting {
        self.vectorizer.weighting()
    }

    pub fn ingredient_names(&self) -> Vec<String> {
        self.vocabulary.tokens().map(str::to_string).collect()
    }

    pub fn encode_query<S: AsRef<str>>(&self, ingredients: &[S]) -> SparseVector {
        self.vectorizer.encode_query(&self.vocabulary, ingredients)
    }

    pub fn recommend<S: AsRef<str>>(
        &self,
        query_ingredients: &[S],
        top_n: usize,
    ) -> Result<Vec<Recommendation>> {
        let query: Vec<String> = query_ingredients
            .iter()
            .map(|ingredient| ingredient.as_ref().to_string())
            .filter(|ingredient| !ingredient.trim().is_empty())
            .collect();
        if query.is_empty() {
            return Err(RecommendError::EmptyQuery);
        }
        let vector = self.encode_query(&query);
        let ranked = rank(&vector, &self.matrix, top_n)?;
        debug!(
            query = query.len(),
            matched_columns = vector.entries().len(),
            results = ranked.len(),
            "ranked recipes"
        );
        let recommendations = ranked
            .into_iter()
            .filter_map(|(row, score)| {
                let recipe = self.recipes.get(row)?;
                let annotation = annotate(recipe, &query);
                Some(Recommendation {
                    row,
                    recipe: recipe.clone(),
                    score,
                    matching_count: annotation.matching_count,
                    total_ingredients: annotation.total_ingredients,
                    missing_ingredients: annotation.missing_ingredients,
                })
            })
            .collect();
        Ok(recommendations)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
}

const STATE_UNINITIALIZED: u8 = 0;
const STATE_LOADING: u8 = 1;

/// Shared handle that moves a recommender from `Uninitialized` through
/// `Loading` to `Ready` exactly once. Queries before `Ready` fail with
/// `ModelNotReady`.
#[derive(Debug, Default)]
pub struct EngineHandle {
    loading: AtomicU8,
    engine: OnceCell<Recommender>,
}

impl EngineHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready(engine: Recommender) -> Self {
        let handle = Self::new();
        let _ = handle.engine.set(engine);
        handle
    }

    pub fn state(&self) -> EngineState {
        if self.engine.get().is_some() {
            EngineState::Ready
        } else if self.loading.load(Ordering::Acquire) == STATE_LOADING {
            EngineState::Loading
        } else {
            EngineState::Uninitialized
        }
    }

    /// Runs `load` once. A failed load leaves the handle uninitialized; once
    /// ready, later calls return the existing engine without calling `load`.
    pub fn initialize<F>(&self, load: F) -> Result<&Recommender>
    where
        F: FnOnce() -> Result<Recommender>,
    {
        self.engine.get_or_try_init(|| {
            self.loading.store(STATE_LOADING, Ordering::Release);
            let result = load();
            self.loading.store(STATE_UNINITIALIZED, Ordering::Release);
            result
        })
    }

    pub fn get(&self) -> Result<&Recommender> {
        self.engine.get().ok_or(RecommendError::ModelNotReady)
    }

    pub fn recommend<S: AsRef<str>>(
        &self,
        query_ingredients: &[S],
        top_n: usize,
    ) -> Result<Vec<Recommendation>> {
        self.get()?.recommend(query_ingredients, top_n)
    }

    pub fn ingredient_names(&self) -> Result<Vec<String>> {
        Ok(self.get()?.ingredient_names())
    }
}
