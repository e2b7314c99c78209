//! Tile assembly: named layers in, serialized MVT bytes out.

use std::io::Write;

use prost::Message;

use crate::layer::{build_layer, Feature, LayerConfig};
use crate::vector_tile::tile::Layer;
use crate::vector_tile::Tile;
use crate::Result;

/// A named list of features that becomes one layer of a tile.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedFeatures {
    pub name: String,
    pub features: Vec<Feature>,
    /// Overrides the config passed to [`merge`] for this layer only.
    pub config: Option<LayerConfig>,
}

impl NamedFeatures {
    pub fn new(name: impl Into<String>, features: Vec<Feature>) -> Self {
        Self {
            name: name.into(),
            features,
            config: None,
        }
    }

    /// Encode this layer with its own extent, version and tolerance.
    pub fn with_config(mut self, config: LayerConfig) -> Self {
        self.config = Some(config);
        self
    }
}

/// Builder for encoding multiple layers into an MVT tile.
///
/// Layers are kept in the order they were added. A layer that fails to build
/// is never appended, so earlier layers stay intact.
#[derive(Debug, Default)]
pub struct TileBuilder {
    layers: Vec<Layer>,
}

impl TileBuilder {
    /// Create a new tile builder.
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Encode `features` as a new layer and append it to the tile.
    pub fn add_layer<'a, I>(&mut self, name: &str, features: I, config: &LayerConfig) -> Result<&Layer>
    where
        I: IntoIterator<Item = &'a Feature>,
    {
        let layer = build_layer(name, features, config)?;
        self.layers.push(layer);
        let index = self.layers.len() - 1;
        Ok(&self.layers[index])
    }

    /// Append an already built layer.
    pub fn push_layer(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    /// Encode each named feature list as a layer and append them in order.
    ///
    /// Lists without their own config use `config`. All layers are built
    /// before any is appended, so on error the tile is left unchanged.
    pub fn merge<'a, I>(&mut self, layers: I, config: &LayerConfig) -> Result<()>
    where
        I: IntoIterator<Item = &'a NamedFeatures>,
    {
        let built = layers
            .into_iter()
            .map(|layer| {
                let config = layer.config.as_ref().unwrap_or(config);
                build_layer(&layer.name, &layer.features, config)
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!("merging {} layers into the tile", built.len());
        for layer in built {
            self.push_layer(layer);
        }
        Ok(())
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Serialize all layers, in insertion order, to protobuf bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let tile = Tile {
            layers: self.layers.clone(),
        };
        tile.encode_to_vec()
    }

    /// Serialize the tile into a writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.serialize())?;
        Ok(())
    }

    /// Build the MVT Tile.
    pub fn build(self) -> Tile {
        Tile {
            layers: self.layers,
        }
    }
}

/// Encode one layer of features and write the tile.
pub fn encode<'a, W, I>(writer: &mut W, layer_name: &str, features: I, config: &LayerConfig) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a Feature>,
{
    let mut tile = TileBuilder::new();
    tile.add_layer(layer_name, features, config)?;
    tile.write_to(writer)
}

/// Encode several named feature lists, one layer each, into a single tile.
pub fn merge<'a, W, I>(writer: &mut W, layers: I, config: &LayerConfig) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a NamedFeatures>,
{
    let mut tile = TileBuilder::new();
    tile.merge(layers, config)?;
    tile.write_to(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_tile::tile::GeomType;
    use geo::{line_string, point, Geometry, GeometryCollection};

    fn point_feature(x: f64, y: f64) -> Feature {
        Feature::new(point!(x: x, y: y))
    }

    #[test]
    fn test_tile_builder_keeps_layer_order() {
        let config = LayerConfig::default();
        let mut tile = TileBuilder::new();
        tile.add_layer("points", [&point_feature(1.0, 1.0)], &config).unwrap();
        let line = Feature::new(line_string![(x: 0.0, y: 0.0), (x: 5.0, y: 0.0)]);
        tile.add_layer("lines", [&line], &config).unwrap();

        let tile = tile.build();
        assert_eq!(tile.layers.len(), 2);
        assert_eq!(tile.layers[0].name, "points");
        assert_eq!(tile.layers[1].name, "lines");
        assert_eq!(
            tile.layers[1].features[0].r#type,
            Some(GeomType::Linestring as i32)
        );
    }

    #[test]
    fn test_layers_have_separate_tables() {
        let config = LayerConfig::default();
        let a = point_feature(1.0, 1.0).with_property("kind", "road");
        let b = point_feature(1.0, 1.0)
            .with_property("name", "x")
            .with_property("kind", "road");

        let mut tile = TileBuilder::new();
        tile.add_layer("a", [&a], &config).unwrap();
        let second = tile.add_layer("b", [&b], &config).unwrap();
        assert_eq!(second.keys, vec!["name", "kind"]);
        assert_eq!(second.features[0].tags, vec![0, 0, 1, 1]);
        assert_eq!(second.features[0].id, Some(1));
    }

    #[test]
    fn test_failed_layer_not_appended() {
        let config = LayerConfig::default();
        let mut tile = TileBuilder::new();
        tile.add_layer("ok", [&point_feature(1.0, 1.0)], &config).unwrap();

        let bad = Feature::new(Geometry::GeometryCollection(GeometryCollection::new_from(
            vec![],
        )));
        assert!(tile.add_layer("bad", [&bad], &config).is_err());
        assert_eq!(tile.layers().len(), 1);
        assert_eq!(tile.layers()[0].name, "ok");
    }

    #[test]
    fn test_serialize_roundtrips_through_prost() {
        let config = LayerConfig::default();
        let mut tile = TileBuilder::new();
        tile.add_layer("points", [&point_feature(10.0, 20.0)], &config).unwrap();

        let bytes = tile.serialize();
        let decoded = Tile::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.layers, tile.layers());
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let config = LayerConfig::default();
        let features: Vec<Feature> = (0..10)
            .map(|i| {
                point_feature(i as f64, i as f64)
                    .with_property("i", i)
                    .with_property("even", i % 2 == 0)
            })
            .collect();

        let mut first = Vec::new();
        encode(&mut first, "pts", &features, &config).unwrap();
        let mut second = Vec::new();
        encode(&mut second, "pts", &features, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_merge_writes_all_layers() {
        let layers = vec![
            NamedFeatures::new("water", vec![point_feature(1.0, 1.0)]),
            NamedFeatures::new("roads", vec![point_feature(2.0, 2.0), point_feature(3.0, 3.0)]),
        ];
        let mut out = Vec::new();
        merge(&mut out, &layers, &LayerConfig::default()).unwrap();

        let tile = Tile::decode(out.as_slice()).unwrap();
        assert_eq!(tile.layers.len(), 2);
        assert_eq!(tile.layers[0].name, "water");
        assert_eq!(tile.layers[1].name, "roads");
        assert_eq!(tile.layers[1].features.len(), 2);
    }

    #[test]
    fn test_merge_into_existing_tile_with_layer_configs() {
        let default = LayerConfig::default();
        let mut tile = TileBuilder::new();
        tile.add_layer("base", [&point_feature(1.0, 1.0)], &default).unwrap();

        let layers = vec![
            NamedFeatures::new("small", vec![point_feature(10.0, 20.0)])
                .with_config(LayerConfig::default().with_extent(256).with_version(1)),
            NamedFeatures::new("plain", vec![point_feature(10.0, 20.0)]),
        ];
        tile.merge(&layers, &default).unwrap();

        let names: Vec<&str> = tile.layers().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["base", "small", "plain"]);

        let small = &tile.layers()[1];
        assert_eq!(small.extent, Some(256));
        assert_eq!(small.version, 1);
        assert_eq!(small.features[0].geometry, vec![9, 20, 472]);

        let plain = &tile.layers()[2];
        assert_eq!(plain.extent, Some(4096));
        assert_eq!(plain.version, 2);
        assert_eq!(plain.features[0].geometry, vec![9, 20, 8152]);
    }

    #[test]
    fn test_failed_merge_leaves_tile_unchanged() {
        let config = LayerConfig::default();
        let mut tile = TileBuilder::new();
        tile.add_layer("base", [&point_feature(1.0, 1.0)], &config).unwrap();

        let bad = Feature::new(Geometry::GeometryCollection(GeometryCollection::new_from(
            vec![],
        )));
        let layers = vec![
            NamedFeatures::new("ok", vec![point_feature(2.0, 2.0)]),
            NamedFeatures::new("bad", vec![bad]),
        ];
        assert!(tile.merge(&layers, &config).is_err());
        assert_eq!(tile.layers().len(), 1);
        assert_eq!(tile.layers()[0].name, "base");
    }

    #[test]
    fn test_push_layer_appends_prebuilt_layer() {
        let layer = build_layer("prebuilt", [&point_feature(1.0, 1.0)], &LayerConfig::default())
            .unwrap();
        let mut tile = TileBuilder::new();
        tile.push_layer(layer.clone());
        assert_eq!(tile.build().layers, vec![layer]);
    }

    #[test]
    fn test_empty_tile_serializes_to_nothing() {
        assert!(TileBuilder::new().serialize().is_empty());
    }
}
