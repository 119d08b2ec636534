use tracing::info;

use crate::artifact::{load_model, save_model};
use crate::config::EngineConfig;
use crate::engine::Recommender;
use crate::error::Result;
use crate::recipe::load_dataset;

/// Reads the dataset named by `config` and fits a fresh recommender.
pub fn train(config: &EngineConfig) -> Result<Recommender> {
    let recipes = load_dataset(&config.dataset_path, &config.dataset_options())?;
    Recommender::train(recipes, config.weighting)
}

/// Loads the saved model if one exists; otherwise trains from the dataset
/// and saves the result for the next start.
pub fn load_or_train(config: &EngineConfig) -> Result<Recommender> {
    if config.model_path.exists() {
        info!(path = %config.model_path.display(), "loading existing model");
        return load_model(&config.model_path);
    }
    info!(
        dataset = %config.dataset_path.display(),
        "no saved model, training from dataset"
    );
    let engine = train(config)?;
    save_model(&engine, &config.model_path)?;
    Ok(engine)
}
