use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dishmatch_core::{
    export_recipes_json, load_or_train, save_model, train, EngineConfig, Recommendation, Weighting,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(
    name = "dishmatch",
    version = VERSION,
    about = "Recommend dishes from the ingredients you have"
)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(flatten)]
    engine: EngineArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct EngineArgs {
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,
    #[arg(long, global = true)]
    model: Option<PathBuf>,
    #[arg(long, global = true)]
    weighting: Option<Weighting>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the model from the dataset and save it, replacing any existing model.
    Train,
    /// Rank dishes for a list of ingredients.
    Recommend {
        #[arg(required = true)]
        ingredients: Vec<String>,
        #[arg(long = "top-n")]
        top_n: Option<usize>,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// List every known ingredient.
    Ingredients,
    /// Write the recipe table as JSON.
    ExportJson {
        #[arg(short = 'o', long = "out", default_value = "recipes.json")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref(), &cli.engine)?;

    match cli.command {
        Commands::Train => {
            let engine = train(&config).context("training failed")?;
            save_model(&engine, &config.model_path)
                .with_context(|| format!("failed to save {}", config.model_path.display()))?;
            println!(
                "trained {} recipes over {} ingredients -> {}",
                engine.recipes().len(),
                engine.vocabulary().len(),
                config.model_path.display()
            );
        }
        Commands::Recommend {
            ingredients,
            top_n,
            json,
        } => {
            let engine = load_or_train(&config).context("failed to initialize recommender")?;
            let top_n = top_n.unwrap_or(config.top_n);
            let results = engine.recommend(&ingredients, top_n)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&recommendations_json(&results))?);
            } else {
                print!("{}", render_recommendations(&ingredients, &results));
            }
        }
        Commands::Ingredients => {
            let engine = load_or_train(&config).context("failed to initialize recommender")?;
            for name in engine.ingredient_names() {
                println!("{name}");
            }
        }
        Commands::ExportJson { out } => {
            let engine = load_or_train(&config).context("failed to initialize recommender")?;
            export_recipes_json(engine.recipes(), &out)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(path = %out.display(), recipes = engine.recipes().len(), "exported recipes");
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn resolve_config(path: Option<&std::path::Path>, args: &EngineArgs) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => {
            let mut config = EngineConfig::from_file(path)?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            config
        }
        None => EngineConfig::load()?,
    };
    if let Some(dataset) = &args.dataset {
        config.dataset_path = dataset.clone();
    }
    if let Some(model) = &args.model {
        config.model_path = model.clone();
    }
    if let Some(weighting) = args.weighting {
        config.weighting = weighting;
    }
    Ok(config)
}

fn recommendations_json(results: &[Recommendation]) -> serde_json::Value {
    let recommendations: Vec<_> = results
        .iter()
        .map(|rec| {
            json!({
                "name": rec.recipe.name,
                "similarity_score": rec.score,
                "ingredients": rec.recipe.ingredient_tokens,
                "matching_ingredients": rec.matching_count,
                "total_ingredients": rec.total_ingredients,
                "missing_ingredients": rec.missing_ingredients,
            })
        })
        .collect();
    json!({ "recommendations": recommendations })
}

fn render_recommendations(query: &[String], results: &[Recommendation]) -> String {
    let mut out = format!(
        "\nTop {} recommended dishes based on: {}\n",
        results.len(),
        query.join(", ")
    );
    for (idx, rec) in results.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} (Score: {:.2})\n",
            idx + 1,
            rec.recipe.name,
            rec.score
        ));
        out.push_str(&format!(
            "   Matching: {}/{} ingredients\n",
            rec.matching_count, rec.total_ingredients
        ));
        if !rec.missing_ingredients.is_empty() {
            out.push_str(&format!(
                "   Missing: {}\n",
                rec.missing_ingredients.join(", ")
            ));
        }
        out.push('\n');
    }
    out
}
