use proptest::prelude::*;
use dishmatch_core::{cosine_similarity, Recipe, RecommendError, Recommender, Weighting};

const PANTRY: &[&str] = &[
    "rice",
    "onion",
    "tomato",
    "green chili",
    "ghee",
    "cumin",
    "toor dal",
    "paneer",
    "curd",
    "garam masala",
];

proptest! {
    #[test]
    fn recipe_matches_itself(corpus in corpus(), weighting in weighting()) {
        let engine = Recommender::train(corpus, weighting).unwrap();
        for (idx, recipe) in engine.recipes().iter().enumerate() {
            if weighting == Weighting::Count && has_repeats(recipe) {
                continue;
            }
            let query = engine.encode_query(&recipe.ingredient_tokens);
            let score = cosine_similarity(&query, engine.matrix().row(idx).unwrap());
            prop_assert!((score - 1.0).abs() < 1e-6, "score {} for {}", score, recipe.name);
        }
    }

    #[test]
    fn results_are_bounded_and_sorted(
        corpus in corpus(),
        query in query(),
        top_n in 1usize..12,
    ) {
        let engine = Recommender::train(corpus, Weighting::Binary).unwrap();
        let results = engine.recommend(&query, top_n).unwrap();
        prop_assert!(results.len() <= top_n);
        prop_assert_eq!(results.len(), top_n.min(engine.recipes().len()));
        for pair in results.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
            if pair[0].score == pair[1].score {
                prop_assert!(pair[0].row < pair[1].row);
            }
        }
        for result in &results {
            prop_assert!((0.0..=1.0).contains(&result.score));
        }
    }

    #[test]
    fn matched_and_missing_cover_every_ingredient(corpus in corpus(), query in query()) {
        let engine = Recommender::train(corpus, Weighting::Binary).unwrap();
        for result in engine.recommend(&query, 50).unwrap() {
            prop_assert_eq!(
                result.matching_count + result.missing_ingredients.len(),
                result.total_ingredients
            );
            prop_assert_eq!(result.total_ingredients, result.recipe.ingredient_tokens.len());
        }
    }

    #[test]
    fn empty_query_never_ranks(corpus in corpus()) {
        let engine = Recommender::train(corpus, Weighting::Binary).unwrap();
        let empty: Vec<String> = Vec::new();
        prop_assert!(matches!(engine.recommend(&empty, 5), Err(RecommendError::EmptyQuery)));
    }
}

fn has_repeats(recipe: &Recipe) -> bool {
    let mut tokens = recipe.ingredient_tokens.clone();
    tokens.sort();
    tokens.windows(2).any(|pair| pair[0] == pair[1])
}

fn weighting() -> impl Strategy<Value = Weighting> {
    prop_oneof![Just(Weighting::Binary), Just(Weighting::Count)]
}

fn corpus() -> impl Strategy<Value = Vec<Recipe>> {
    prop::collection::vec(prop::collection::vec(0..PANTRY.len(), 1..6), 1..15).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(idx, picks)| {
                let ingredients = picks
                    .iter()
                    .map(|&pick| PANTRY[pick])
                    .collect::<Vec<_>>()
                    .join(", ");
                Recipe::parse(&format!("Dish {idx}"), &ingredients).unwrap()
            })
            .collect()
    })
}

fn query() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop_oneof![
            prop::sample::select(PANTRY).prop_map(|s| s.to_uppercase()),
            prop::sample::select(PANTRY).prop_map(|s| s.to_string()),
            Just("saffron".to_string()),
            Just("chili".to_string()),
        ],
        1..5,
    )
}
