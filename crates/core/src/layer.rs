//! Layer construction: features in, one MVT `Layer` out.
//!
//! Each [`LayerBuilder`] owns its own [`PropertyTable`], so key and value
//! tables never leak between layers or between encode calls.

use geo::Geometry;
use serde_json::{Map, Value as JsonValue};

use crate::geometry::{classify, RingStreamBuilder};
use crate::mvt::encode_entries;
use crate::properties::{PropertyTable, PropertyValue};
use crate::vector_tile::tile::{Feature as MvtFeature, Layer};
use crate::Result;

/// Default tile extent (4096 as per MVT spec)
pub const DEFAULT_EXTENT: u32 = 4096;

/// Layer version written to every layer
pub const DEFAULT_VERSION: u32 = 2;

/// Property key that receives an explicitly supplied feature identifier
pub const UID_KEY: &str = "uid";

/// What to do when a single feature cannot be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureErrorPolicy {
    /// Fail the whole layer build with the feature's error.
    #[default]
    Abort,
    /// Log the error and leave the feature out of the layer.
    Skip,
}

/// Per-layer encoding settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerConfig {
    /// Tile extent in tile units (default: 4096)
    pub extent: u32,
    /// Simplification tolerance in tile units (default: 0, disabled)
    pub tolerance: u32,
    /// Layer version (default: 2)
    pub version: u32,
    /// Handling of features that fail to encode
    pub on_error: FeatureErrorPolicy,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            extent: DEFAULT_EXTENT,
            tolerance: 0,
            version: DEFAULT_VERSION,
            on_error: FeatureErrorPolicy::Abort,
        }
    }
}

impl LayerConfig {
    /// Set the tile extent.
    pub fn with_extent(mut self, extent: u32) -> Self {
        self.extent = extent;
        self
    }

    /// Set the simplification tolerance.
    pub fn with_tolerance(mut self, tolerance: u32) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the layer version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the failure policy for individual features.
    pub fn with_on_error(mut self, on_error: FeatureErrorPolicy) -> Self {
        self.on_error = on_error;
        self
    }
}

/// A feature to encode: tile-local geometry, properties and an optional id.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry,
    /// Properties in insertion order. `null` values are skipped.
    pub properties: Map<String, JsonValue>,
    pub id: Option<u64>,
}

impl Feature {
    pub fn new(geometry: impl Into<Geometry>) -> Self {
        Self {
            geometry: geometry.into(),
            properties: Map::new(),
            id: None,
        }
    }

    /// Add a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Replace all properties.
    pub fn with_properties(mut self, properties: Map<String, JsonValue>) -> Self {
        self.properties = properties;
        self
    }

    /// Set an explicit identifier.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}

/// A feature whose geometry and attributes have been fully validated.
struct PreparedFeature {
    id: u64,
    r#type: i32,
    geometry: Vec<u32>,
    properties: Vec<(String, PropertyValue)>,
}

/// Builder for encoding features into an MVT layer.
pub struct LayerBuilder {
    name: String,
    config: LayerConfig,
    rings: RingStreamBuilder,
    features: Vec<MvtFeature>,
    table: PropertyTable,
    feature_count: u64,
}

impl LayerBuilder {
    /// Create a new layer builder with the given name and default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, LayerConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: LayerConfig) -> Self {
        Self {
            name: name.into(),
            rings: RingStreamBuilder::new(config.extent),
            config,
            features: Vec::new(),
            table: PropertyTable::new(),
            feature_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Add a feature to the layer.
    ///
    /// The feature is checked in full before anything is interned, so a
    /// rejected feature leaves the layer exactly as it was. Returns the wire
    /// id assigned to the feature.
    pub fn add_feature(&mut self, feature: &Feature) -> Result<u64> {
        let prepared = self.prepare(feature)?;
        let id = prepared.id;

        let tags = self
            .table
            .tags(prepared.properties.iter().map(|(k, v)| (k.as_str(), v)));

        log::trace!(
            "layer {}: feature {} with {} geometry words and {} tags",
            self.name,
            id,
            prepared.geometry.len(),
            tags.len()
        );

        self.features.push(MvtFeature {
            id: Some(id),
            tags,
            r#type: Some(prepared.r#type),
            geometry: prepared.geometry,
        });
        self.feature_count += 1;

        Ok(id)
    }

    /// Add many features, applying the configured [`FeatureErrorPolicy`].
    ///
    /// Returns the number of features skipped.
    pub fn add_features<'a, I>(&mut self, features: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a Feature>,
    {
        let mut skipped = 0;
        for (index, feature) in features.into_iter().enumerate() {
            match self.add_feature(feature) {
                Ok(_) => {}
                Err(e) if self.config.on_error == FeatureErrorPolicy::Skip => {
                    log::warn!(
                        "layer {}: skipping feature at index {}: {}",
                        self.name,
                        index,
                        e
                    );
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(skipped)
    }

    fn prepare(&self, feature: &Feature) -> Result<PreparedFeature> {
        let kind = classify(&feature.geometry)?;
        let entries = self.rings.build(&feature.geometry)?;
        let geometry = encode_entries(&entries, self.config.tolerance)?;

        let id = feature.id.unwrap_or(self.feature_count + 1);

        let uid = feature.id.map(JsonValue::from);
        let mut uid_written = false;
        let mut properties = Vec::with_capacity(feature.properties.len() + 1);
        for (key, value) in &feature.properties {
            let value = match &uid {
                Some(uid) if key == UID_KEY => {
                    uid_written = true;
                    uid
                }
                _ => value,
            };
            if let Some(value) = PropertyValue::from_json(key, value)? {
                properties.push((key.clone(), value));
            }
        }
        if let (Some(uid), false) = (&uid, uid_written) {
            if let Some(value) = PropertyValue::from_json(UID_KEY, uid)? {
                properties.push((UID_KEY.to_string(), value));
            }
        }

        Ok(PreparedFeature {
            id,
            r#type: kind.geom_type() as i32,
            geometry,
            properties,
        })
    }

    /// Build the MVT Layer.
    pub fn build(self) -> Layer {
        log::debug!(
            "layer {}: {} features, {} keys, {} values",
            self.name,
            self.features.len(),
            self.table.keys().len(),
            self.table.values().len()
        );

        let (keys, values) = self.table.into_parts();
        Layer {
            version: self.config.version,
            name: self.name,
            features: self.features,
            keys,
            values,
            extent: Some(self.config.extent),
        }
    }
}

/// Encode one named list of features into a layer.
pub fn build_layer<'a, I>(name: &str, features: I, config: &LayerConfig) -> Result<Layer>
where
    I: IntoIterator<Item = &'a Feature>,
{
    let mut builder = LayerBuilder::with_config(name, config.clone());
    let skipped = builder.add_features(features)?;
    if skipped > 0 {
        log::info!("layer {}: skipped {} invalid features", name, skipped);
    }
    Ok(builder.build())
}
