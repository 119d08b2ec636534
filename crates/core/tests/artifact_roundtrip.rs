use std::fs;

use dishmatch_core::{
    load_dataset, load_model, save_model, DatasetOptions, Recommender, Weighting,
};
use tempfile::tempdir;

const DATASET: &str = "name,ingredients,diet,course
Aloo gobi,\"potato, cauliflower, onion, turmeric\",vegetarian,main course
Chole,\"chickpeas, onion, tomato, garam masala\",vegetarian,main course
Jeera rice,\"basmati rice, cumin, ghee\",vegetarian,main course
Tomato rice,\"basmati rice, tomato, onion, mustard seeds\",vegetarian,main course
Gajar halwa,\"carrots, milk, sugar, ghee\",vegetarian,dessert
";

fn trained() -> Recommender {
    let dir = tempdir().unwrap();
    let path = dir.path().join("indian_food.csv");
    fs::write(&path, DATASET).unwrap();
    let recipes = load_dataset(&path, &DatasetOptions::default()).unwrap();
    Recommender::train(recipes, Weighting::Binary).unwrap()
}

#[test]
fn saved_model_recommends_identically() {
    let fresh = trained();
    let dir = tempdir().unwrap();
    let model_path = dir.path().join("dish_recommender.model");
    save_model(&fresh, &model_path).unwrap();
    let loaded = load_model(&model_path).unwrap();

    let query = ["rice", "tomato", "onion", "chili"];
    let expected = fresh.recommend(&query, 5).unwrap();
    let actual = loaded.recommend(&query, 5).unwrap();
    assert_eq!(expected, actual);
    assert_eq!(loaded.ingredient_names(), fresh.ingredient_names());
}

#[test]
fn tomato_onion_query_prefers_tomato_dishes() {
    let engine = trained();
    let results = engine.recommend(&["tomato", "onion"], 3).unwrap();
    let names: Vec<_> = results.iter().map(|r| r.recipe.name.as_str()).collect();
    assert_eq!(names, vec!["Chole", "Tomato rice", "Aloo gobi"]);
    assert_eq!(results[0].matching_count, 2);
    assert_eq!(results[0].missing_ingredients, vec!["chickpeas", "garam masala"]);
}

#[test]
fn saving_twice_overwrites_atomically() {
    let engine = trained();
    let dir = tempdir().unwrap();
    let model_path = dir.path().join("model.bin");
    save_model(&engine, &model_path).unwrap();
    save_model(&engine, &model_path).unwrap();
    let entries = fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(entries, 1);
    assert_eq!(load_model(&model_path).unwrap().recipes().len(), 5);
}
