use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RecommendError, Result};
use crate::recipe::{normalize_query_ingredient, Recipe};

/// How a recipe row weights each of its ingredient tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    /// 1.0 when the token is present, regardless of repeats.
    #[default]
    Binary,
    /// Number of times the token appears in the recipe.
    Count,
}

impl FromStr for Weighting {
    type Err = RecommendError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "binary" | "presence" => Ok(Weighting::Binary),
            "count" | "counts" => Ok(Weighting::Count),
            other => Err(RecommendError::Config(format!("unknown weighting {other}"))),
        }
    }
}

impl fmt::Display for Weighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Weighting::Binary => f.write_str("binary"),
            Weighting::Count => f.write_str("count"),
        }
    }
}

/// Ingredient token to column mapping. The column of a token is its
/// insertion position, so serialising the tokens in order is enough to
/// restore the mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Vocabulary {
    tokens: IndexSet<String>,
}

impl Vocabulary {
    /// Builds a vocabulary with columns assigned in ascending token order.
    pub fn from_corpus(recipes: &[Recipe]) -> Self {
        let distinct: BTreeSet<&str> = recipes
            .iter()
            .flat_map(|recipe| recipe.ingredient_tokens.iter().map(String::as_str))
            .collect();
        Self {
            tokens: distinct.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn column(&self, token: &str) -> Option<usize> {
        self.tokens.get_index_of(token)
    }

    pub fn token(&self, column: usize) -> Option<&str> {
        self.tokens.get_index(column).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    /// Content hash over the tokens in column order.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for token in &self.tokens {
            hasher.update(token.as_bytes());
            hasher.update(&[0]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Sparse row over the vocabulary: `(column, weight)` pairs sorted by
/// column, zero cells omitted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SparseVector {
    entries: Vec<(usize, f32)>,
    norm_sq: f32,
}

impl SparseVector {
    fn from_weights(weights: BTreeMap<usize, f32>) -> Self {
        let entries: Vec<(usize, f32)> = weights.into_iter().filter(|(_, w)| *w != 0.0).collect();
        let norm_sq = entries.iter().map(|(_, w)| w * w).sum();
        Self { entries, norm_sq }
    }

    pub fn entries(&self) -> &[(usize, f32)] {
        &self.entries
    }

    pub fn norm_sq(&self) -> f32 {
        self.norm_sq
    }

    pub fn is_zero(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, column: usize) -> f32 {
        self.entries
            .binary_search_by_key(&column, |(col, _)| *col)
            .map(|idx| self.entries[idx].1)
            .unwrap_or(0.0)
    }

    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0f32;
        while i < self.entries.len() && j < other.entries.len() {
            let (a_col, a_val) = self.entries[i];
            let (b_col, b_val) = other.entries[j];
            match a_col.cmp(&b_col) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += a_val * b_val;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    /// Expands into a dense vector of `columns` cells.
    pub fn to_dense(&self, columns: usize) -> Vec<f32> {
        let mut dense = vec![0.0; columns];
        for &(col, weight) in &self.entries {
            if col < columns {
                dense[col] = weight;
            }
        }
        dense
    }
}

/// One row per recipe, one column per vocabulary token.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CorpusMatrix {
    columns: usize,
    rows: Vec<SparseVector>,
}

impl CorpusMatrix {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns
    }

    pub fn row(&self, index: usize) -> Option<&SparseVector> {
        self.rows.get(index)
    }

    pub fn rows(&self) -> &[SparseVector] {
        &self.rows
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CorpusVectorizer {
    weighting: Weighting,
}

impl CorpusVectorizer {
    pub fn new(weighting: Weighting) -> Self {
        Self { weighting }
    }

    pub fn weighting(&self) -> Weighting {
        self.weighting
    }

    /// Fits the vocabulary on `recipes` and vectorizes them against it.
    pub fn build(&self, recipes: &[Recipe]) -> Result<(Vocabulary, CorpusMatrix)> {
        if recipes.is_empty() {
            return Err(RecommendError::Dataset(
                "cannot build a vocabulary from an empty corpus".to_string(),
            ));
        }
        let vocabulary = Vocabulary::from_corpus(recipes);
        let matrix = self.transform(&vocabulary, recipes)?;
        debug!(
            recipes = matrix.n_rows(),
            vocabulary = vocabulary.len(),
            weighting = %self.weighting,
            "built corpus matrix"
        );
        Ok((vocabulary, matrix))
    }

    /// Vectorizes `recipes` against an existing vocabulary. Every recipe
    /// token must already be in the vocabulary; a missing one means the
    /// pair was not built together.
    pub fn transform(&self, vocabulary: &Vocabulary, recipes: &[Recipe]) -> Result<CorpusMatrix> {
        let mut rows = Vec::with_capacity(recipes.len());
        for recipe in recipes {
            let mut weights = BTreeMap::new();
            for token in &recipe.ingredient_tokens {
                let column = vocabulary.column(token).ok_or_else(|| {
                    RecommendError::ModelMismatch(format!(
                        "ingredient `{token}` of `{}` is not in the vocabulary",
                        recipe.name
                    ))
                })?;
                let weight = weights.entry(column).or_insert(0.0f32);
                match self.weighting {
                    Weighting::Binary => *weight = 1.0,
                    Weighting::Count => *weight += 1.0,
                }
            }
            rows.push(SparseVector::from_weights(weights));
        }
        Ok(CorpusMatrix {
            columns: vocabulary.len(),
            rows,
        })
    }

    /// Builds a query vector by exact token lookup. Unknown ingredients are
    /// ignored, so an unmatched list gives the zero vector.
    pub fn encode_query<S: AsRef<str>>(
        &self,
        vocabulary: &Vocabulary,
        ingredients: &[S],
    ) -> SparseVector {
        let mut weights = BTreeMap::new();
        for ingredient in ingredients {
            let token = normalize_query_ingredient(ingredient.as_ref());
            if let Some(column) = vocabulary.column(&token) {
                weights.insert(column, 1.0f32);
            }
        }
        SparseVector::from_weights(weights)
    }
}
