use choropleth_map::cache::FileCache;
use choropleth_map::config::AppConfig;
use choropleth_map::fetch::{Fetcher, JsonExportSource};
use choropleth_map::render::{self, RenderedRegion};
use choropleth_map::server::{self, AppState};
use choropleth_map::{data, ChoroplethEngine};
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the choropleth and write GeoJSON (and an optional PNG preview)
    Generate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the choropleth and hover lookups over HTTP
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// List the datasets available in the configured source
    Datasets {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Generate { config } => {
            info!("Generating choropleth with config: {:?}", config);
            let app_config = AppConfig::load_from_file(config)?;
            let regions = build_regions(&app_config)?;

            let collection = render::to_feature_collection(&regions, &app_config.choropleth.color_by);
            render::write_geojson(&app_config.output.geojson, &collection)?;

            if let Some(image_path) = &app_config.output.image {
                render::write_image(image_path, &regions, app_config.output.image_width)?;
            }

            println!("Generation complete!");
        }
        Commands::Serve { config } => {
            info!("Serving choropleth with config: {:?}", config);
            let app_config = AppConfig::load_from_file(config)?;
            let regions = build_regions(&app_config)?;
            let collection = render::to_feature_collection(&regions, &app_config.choropleth.color_by);

            let state = AppState::new(regions, collection);
            server::start_server(state, app_config.server.port, &app_config.server.static_dir).await?;
        }
        Commands::Datasets { config } => {
            let app_config = AppConfig::load_from_file(config)?;
            let source_path = app_config
                .input
                .source
                .as_ref()
                .ok_or_else(|| anyhow!("input.source must be set to list datasets"))?;

            let source = JsonExportSource::from_path(source_path)?;
            let cache = FileCache::new(&app_config.cache.dir);
            let mut fetcher = Fetcher::new(source, cache, app_config.cache.freshness()?);

            for dataset in fetcher.fetch_dataset_catalog()? {
                println!("{}\t{}\t{}", dataset.id, dataset.name, dataset.description);
            }
        }
    }

    Ok(())
}

fn build_regions(config: &AppConfig) -> Result<Vec<RenderedRegion>> {
    let (low, high) = config.choropleth.colors()?;

    // 1. Load Data
    let boundaries = data::load_boundaries(config)?;
    let points = data::load_points(config)?;

    // 2. Aggregate and color
    let engine = ChoroplethEngine::new();
    let field = &config.choropleth.color_by;
    let results = engine.compute(&boundaries, &points, field, low, high)?;

    // 3. Style for drawing
    Ok(render::style_regions(&results, field, low, engine.geometry()))
}
