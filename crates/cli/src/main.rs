//! CLI for vectiles - encode GeoJSON into Mapbox Vector Tiles
//!
//! This is a thin wrapper around the vectiles-core library. Input geometry is
//! expected in tile-local units already (0..extent, origin bottom-left).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use geojson::{FeatureCollection, GeoJson};
use serde::Serialize;
use vectiles_core::{
    decode, merge, Feature, FeatureErrorPolicy, LayerConfig, NamedFeatures, DEFAULT_EXTENT,
};

#[derive(Parser, Debug)]
#[command(
    name = "vectiles",
    about = "Encode GeoJSON feature collections into Mapbox Vector Tiles",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encode one or more GeoJSON files into a single tile
    Encode {
        /// Layer source as NAME=PATH (repeatable, layers keep this order)
        #[arg(short, long = "layer", value_name = "NAME=PATH", required = true)]
        layers: Vec<String>,

        /// Output tile file
        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,

        /// Tile extent
        #[arg(long, default_value_t = DEFAULT_EXTENT)]
        extent: u32,

        /// Simplification tolerance in tile units (0 disables simplification)
        #[arg(long, default_value = "0")]
        tolerance: u32,

        /// Skip features that cannot be encoded instead of failing
        #[arg(long)]
        skip_invalid: bool,
    },
    /// Print a JSON summary of a tile
    Inspect {
        /// Tile file to read
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
}

#[derive(Serialize)]
struct LayerSummary {
    name: String,
    version: u32,
    extent: u32,
    features: usize,
    keys: Vec<String>,
}

/// Split a `NAME=PATH` layer argument.
fn parse_layer_arg(arg: &str) -> Result<(String, PathBuf)> {
    let (name, path) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid layer '{}', expected NAME=PATH", arg))?;
    if name.is_empty() {
        anyhow::bail!("Invalid layer '{}': empty name", arg);
    }
    Ok((name.to_string(), PathBuf::from(path)))
}

/// Convert a GeoJSON feature collection into encoder features.
///
/// Features without geometry are dropped here; everything else is left for
/// the encoder to accept or reject.
fn collection_features(collection: FeatureCollection) -> Result<Vec<Feature>> {
    let mut features = Vec::with_capacity(collection.features.len());

    for (index, feature) in collection.features.into_iter().enumerate() {
        let Some(geometry) = feature.geometry else {
            log::debug!("feature {} has no geometry, dropping", index);
            continue;
        };
        let geometry: geo::Geometry = geometry
            .try_into()
            .with_context(|| format!("Failed to convert geometry of feature {}", index))?;

        let mut converted = Feature::new(geometry);
        if let Some(properties) = feature.properties {
            converted = converted.with_properties(properties);
        }
        if let Some(id) = &feature.id {
            let numeric = match id {
                geojson::feature::Id::Number(n) => n.as_u64(),
                geojson::feature::Id::String(_) => None,
            };
            match numeric {
                Some(n) => converted = converted.with_id(n),
                None => log::debug!(
                    "feature {} has non-integer id {:?}, using a generated id",
                    index,
                    id
                ),
            }
        }
        features.push(converted);
    }

    Ok(features)
}

fn read_layer(name: String, path: &Path) -> Result<NamedFeatures> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let geojson: GeoJson = content
        .parse()
        .with_context(|| format!("Failed to parse GeoJSON in {}", path.display()))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(collection) => collection,
        GeoJson::Feature(feature) => FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        },
        GeoJson::Geometry(_) => {
            anyhow::bail!("{}: expected a Feature or FeatureCollection", path.display())
        }
    };

    let features = collection_features(collection)?;
    log::info!(
        "Read {} features for layer {} from {}",
        features.len(),
        name,
        path.display()
    );
    Ok(NamedFeatures::new(name, features))
}

fn run_encode(
    layers: &[String],
    output: &Path,
    extent: u32,
    tolerance: u32,
    skip_invalid: bool,
) -> Result<()> {
    let config = LayerConfig::default()
        .with_extent(extent)
        .with_tolerance(tolerance)
        .with_on_error(if skip_invalid {
            FeatureErrorPolicy::Skip
        } else {
            FeatureErrorPolicy::Abort
        });

    let sources = layers
        .iter()
        .map(|arg| {
            let (name, path) = parse_layer_arg(arg)?;
            read_layer(name, &path)
        })
        .collect::<Result<Vec<_>>>()?;

    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    merge(&mut writer, &sources, &config).context("Failed to encode tile")?;
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "✓ Encoded {} layers into {}",
        sources.len(),
        output.display()
    );
    Ok(())
}

fn run_inspect(input: &Path) -> Result<()> {
    let data =
        std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let layers = decode(&data).context("Failed to decode tile")?;

    let summary: Vec<LayerSummary> = layers
        .into_iter()
        .map(|layer| {
            let mut keys: Vec<String> = Vec::new();
            for feature in &layer.features {
                for key in feature.properties.keys() {
                    if !keys.contains(key) {
                        keys.push(key.clone());
                    }
                }
            }
            LayerSummary {
                name: layer.name,
                version: layer.version,
                extent: layer.extent,
                features: layer.features.len(),
                keys,
            }
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match &args.command {
        Commands::Encode {
            layers,
            output,
            extent,
            tolerance,
            skip_invalid,
        } => run_encode(layers, output, *extent, *tolerance, *skip_invalid),
        Commands::Inspect { input } => run_inspect(input),
    }
}
