//! Decoding of MVT bytes back into layers of features.
//!
//! This is the inverse of the encoder for inspection and testing: geometry
//! is reconstructed from the command stream and flipped back into source
//! orientation (`y = extent - wire_y`), and tags are resolved through the
//! layer's key and value tables.

use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use prost::Message;
use serde_json::{Map, Value as JsonValue};

use crate::geometry::{Command, GeometryKind};
use crate::layer::DEFAULT_EXTENT;
use crate::mvt::{command_decode, zigzag_decode};
use crate::properties::PropertyValue;
use crate::vector_tile::tile::{GeomType, Layer};
use crate::vector_tile::Tile;
use crate::{Error, Result};

/// A decoded feature.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFeature {
    pub id: Option<u64>,
    pub kind: GeometryKind,
    /// `None` for features of unknown type or with an empty command stream.
    pub geometry: Option<Geometry>,
    pub properties: Map<String, JsonValue>,
}

/// A decoded layer.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLayer {
    pub name: String,
    pub version: u32,
    pub extent: u32,
    pub features: Vec<DecodedFeature>,
}

/// Parse tile bytes without interpreting features.
pub fn decode_tile(data: &[u8]) -> Result<Tile> {
    Tile::decode(data).map_err(|e| Error::Decode(format!("Failed to decode tile: {}", e)))
}

/// Decode a tile into layers of features.
pub fn decode(data: &[u8]) -> Result<Vec<DecodedLayer>> {
    decode_tile(data)?.layers.iter().map(decode_layer).collect()
}

/// Decode a single layer.
pub fn decode_layer(layer: &Layer) -> Result<DecodedLayer> {
    let extent = layer.extent.unwrap_or(DEFAULT_EXTENT);

    let values = layer
        .values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            PropertyValue::from_mvt_value(value).ok_or_else(|| {
                Error::Decode(format!("layer {}: value {} has no field set", layer.name, i))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut features = Vec::with_capacity(layer.features.len());
    for feature in &layer.features {
        if feature.tags.len() % 2 != 0 {
            return Err(Error::Decode(format!(
                "layer {}: odd number of tags ({})",
                layer.name,
                feature.tags.len()
            )));
        }

        let mut properties = Map::new();
        for pair in feature.tags.chunks_exact(2) {
            let key = layer.keys.get(pair[0] as usize).ok_or_else(|| {
                Error::Decode(format!("layer {}: key index {} out of range", layer.name, pair[0]))
            })?;
            let value = values.get(pair[1] as usize).ok_or_else(|| {
                Error::Decode(format!(
                    "layer {}: value index {} out of range",
                    layer.name, pair[1]
                ))
            })?;
            properties.insert(key.clone(), value.to_json());
        }

        let geom_type = feature
            .r#type
            .and_then(|t| GeomType::try_from(t).ok())
            .unwrap_or(GeomType::Unknown);
        let kind = GeometryKind::from(geom_type);
        let geometry = decode_geometry(&feature.geometry, kind, extent)?;

        features.push(DecodedFeature {
            id: feature.id,
            kind,
            geometry,
            properties,
        });
    }

    Ok(DecodedLayer {
        name: layer.name.clone(),
        version: layer.version,
        extent,
        features,
    })
}

/// One MoveTo-started path, in wire coordinates.
struct Path {
    points: Vec<(i32, i32)>,
}

/// Split a command stream into paths, accumulating deltas into absolute positions.
fn decode_paths(geometry: &[u32]) -> Result<Vec<Path>> {
    let mut paths: Vec<Path> = Vec::new();
    let (mut x, mut y) = (0i32, 0i32);
    let mut words = geometry.iter().copied();

    while let Some(word) = words.next() {
        let (id, count) = command_decode(word);
        let command = Command::try_from(id)
            .map_err(|id| Error::Decode(format!("unknown command id {}", id)))?;

        match command {
            // rings are closed implicitly when converted to polygons
            Command::ClosePath => {
                if paths.is_empty() {
                    return Err(Error::Decode("ClosePath before MoveTo".into()));
                }
            }
            Command::MoveTo | Command::LineTo => {
                for _ in 0..count {
                    let (Some(dx), Some(dy)) = (words.next(), words.next()) else {
                        return Err(Error::Decode("truncated geometry".into()));
                    };
                    x = x.wrapping_add(zigzag_decode(dx));
                    y = y.wrapping_add(zigzag_decode(dy));

                    if command == Command::MoveTo {
                        paths.push(Path {
                            points: vec![(x, y)],
                        });
                    } else {
                        match paths.last_mut() {
                            Some(path) => path.points.push((x, y)),
                            None => return Err(Error::Decode("LineTo before MoveTo".into())),
                        }
                    }
                }
            }
        }
    }

    Ok(paths)
}

/// Twice the signed area of a ring in wire coordinates.
///
/// Accumulated in `i128`: each term fits in 64 bits but their sum may not.
fn ring_area(points: &[(i32, i32)]) -> i128 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let (x0, y0) = points[i];
            let (x1, y1) = points[(i + 1) % n];
            i128::from(x0) * i128::from(y1) - i128::from(x1) * i128::from(y0)
        })
        .sum()
}

fn decode_geometry(geometry: &[u32], kind: GeometryKind, extent: u32) -> Result<Option<Geometry>> {
    let paths = decode_paths(geometry)?;
    if paths.is_empty() {
        return Ok(None);
    }

    let to_coord = |(x, y): (i32, i32)| Coord {
        x: f64::from(x),
        y: f64::from(extent) - f64::from(y),
    };
    let to_line = |points: &[(i32, i32)]| -> LineString {
        points.iter().copied().map(to_coord).collect()
    };

    let geometry = match kind {
        GeometryKind::Unknown => return Ok(None),
        GeometryKind::Point => {
            let mut points: Vec<Point> = paths
                .iter()
                .flat_map(|path| path.points.iter().copied())
                .map(|p| Point::from(to_coord(p)))
                .collect();
            if points.len() == 1 {
                Geometry::Point(points.remove(0))
            } else {
                Geometry::MultiPoint(MultiPoint::new(points))
            }
        }
        GeometryKind::LineString => {
            let mut lines: Vec<LineString> = paths.iter().map(|p| to_line(&p.points)).collect();
            if lines.len() == 1 {
                Geometry::LineString(lines.remove(0))
            } else {
                Geometry::MultiLineString(MultiLineString::new(lines))
            }
        }
        GeometryKind::Polygon => {
            let mut polygons: Vec<(LineString, Vec<LineString>)> = Vec::new();
            // winding of the first ring with non-zero area
            let mut outer_sign = 0i128;

            for path in &paths {
                let sign = ring_area(&path.points).signum();
                let ring = to_line(&path.points);
                let is_hole = sign != 0 && outer_sign != 0 && sign != outer_sign;
                if let (true, Some((_, interiors))) = (is_hole, polygons.last_mut()) {
                    interiors.push(ring);
                    continue;
                }
                if outer_sign == 0 {
                    outer_sign = sign;
                }
                polygons.push((ring, Vec::new()));
            }

            let mut polygons: Vec<Polygon> = polygons
                .into_iter()
                .map(|(exterior, interiors)| Polygon::new(exterior, interiors))
                .collect();
            if polygons.len() == 1 {
                Geometry::Polygon(polygons.remove(0))
            } else {
                Geometry::MultiPolygon(MultiPolygon::new(polygons))
            }
        }
    };

    Ok(Some(geometry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{CMD_CLOSE_PATH, CMD_LINE_TO, CMD_MOVE_TO};
    use crate::layer::{Feature, LayerConfig};
    use crate::mvt::{command_encode, zigzag_encode};
    use crate::tile::TileBuilder;
    use crate::vector_tile::tile::{Feature as MvtFeature, Value};
    use geo::{line_string, point, polygon};
    use serde_json::json;

    fn roundtrip(feature: Feature) -> DecodedFeature {
        let mut tile = TileBuilder::new();
        tile.add_layer("t", [&feature], &LayerConfig::default()).unwrap();
        let mut layers = decode(&tile.serialize()).unwrap();
        layers.remove(0).features.remove(0)
    }

    fn raw_layer(feature: MvtFeature) -> Layer {
        Layer {
            version: 2,
            name: "raw".to_string(),
            features: vec![feature],
            keys: vec!["k".to_string()],
            values: vec![Value {
                int_value: Some(1),
                ..Default::default()
            }],
            extent: Some(4096),
        }
    }

    #[test]
    fn test_decode_point_with_properties() {
        let decoded = roundtrip(
            Feature::new(point!(x: 10.0, y: 20.0))
                .with_property("kind", "road")
                .with_property("lanes", 2)
                .with_property("oneway", true),
        );
        assert_eq!(decoded.id, Some(1));
        assert_eq!(decoded.kind, GeometryKind::Point);
        assert_eq!(decoded.geometry, Some(Geometry::Point(point!(x: 10.0, y: 20.0))));
        assert_eq!(
            JsonValue::Object(decoded.properties),
            json!({"kind": "road", "lanes": 2, "oneway": true})
        );
    }

    #[test]
    fn test_decode_linestring() {
        let line = line_string![(x: 0.0, y: 0.0), (x: 5.0, y: 0.0), (x: 5.0, y: 9.0)];
        let decoded = roundtrip(Feature::new(line.clone()));
        assert_eq!(decoded.geometry, Some(Geometry::LineString(line)));
    }

    #[test]
    fn test_decode_polygon_with_hole() {
        let poly = polygon![
            exterior: [
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 10.0),
                (x: 0.0, y: 10.0),
                (x: 0.0, y: 0.0),
            ],
            interiors: [
                [
                    (x: 2.0, y: 2.0),
                    (x: 2.0, y: 8.0),
                    (x: 8.0, y: 8.0),
                    (x: 8.0, y: 2.0),
                    (x: 2.0, y: 2.0),
                ],
            ],
        ];
        let decoded = roundtrip(Feature::new(poly.clone()));
        assert_eq!(decoded.geometry, Some(Geometry::Polygon(poly)));
    }

    #[test]
    fn test_decode_rejects_odd_tags() {
        let layer = raw_layer(MvtFeature {
            id: Some(1),
            tags: vec![0],
            r#type: Some(GeomType::Point as i32),
            geometry: vec![9, 0, 0],
        });
        assert!(matches!(decode_layer(&layer), Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_tag_out_of_range() {
        let layer = raw_layer(MvtFeature {
            id: Some(1),
            tags: vec![0, 3],
            r#type: Some(GeomType::Point as i32),
            geometry: vec![9, 0, 0],
        });
        assert!(matches!(decode_layer(&layer), Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_truncated_geometry() {
        let layer = raw_layer(MvtFeature {
            id: Some(1),
            tags: vec![],
            r#type: Some(GeomType::Linestring as i32),
            geometry: vec![9, 0, 0, 18, 2, 2],
        });
        assert!(matches!(decode_layer(&layer), Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_garbage_bytes() {
        assert!(matches!(decode(&[0xff, 0xff, 0xff]), Err(Error::Decode(_))));
    }

    #[test]
    fn test_ring_area_at_coordinate_limits() {
        let ring = [
            (i32::MIN, i32::MIN),
            (i32::MIN, i32::MAX),
            (i32::MAX, i32::MAX),
        ];
        let step = |from: (i32, i32), to: (i32, i32)| {
            [
                zigzag_encode(to.0.wrapping_sub(from.0)),
                zigzag_encode(to.1.wrapping_sub(from.1)),
            ]
        };

        let mut geometry = vec![command_encode(CMD_MOVE_TO, 1)];
        geometry.extend(step((0, 0), ring[0]));
        geometry.push(command_encode(CMD_LINE_TO, 2));
        geometry.extend(step(ring[0], ring[1]));
        geometry.extend(step(ring[1], ring[2]));
        geometry.push(command_encode(CMD_CLOSE_PATH, 1));

        let layer = raw_layer(MvtFeature {
            id: Some(1),
            tags: vec![],
            r#type: Some(GeomType::Polygon as i32),
            geometry,
        });
        let decoded = decode_layer(&layer).unwrap();
        assert!(matches!(
            decoded.features[0].geometry,
            Some(Geometry::Polygon(_))
        ));
    }

    #[test]
    fn test_degenerate_first_ring_does_not_swallow_next_polygon() {
        // collinear ring (area 0), then a 10x10 square
        let geometry = vec![
            9, 0, 0, 18, 20, 0, 20, 0, 15, //
            9, 39, 20, 26, 20, 0, 0, 20, 19, 0, 15,
        ];
        let layer = raw_layer(MvtFeature {
            id: Some(1),
            tags: vec![],
            r#type: Some(GeomType::Polygon as i32),
            geometry,
        });

        let decoded = decode_layer(&layer).unwrap();
        let Some(Geometry::MultiPolygon(multi)) = &decoded.features[0].geometry else {
            panic!("Expected a MultiPolygon, got {:?}", decoded.features[0].geometry);
        };
        assert_eq!(multi.0.len(), 2);
        assert!(multi.0[0].interiors().is_empty());
        assert!(multi.0[1].interiors().is_empty());
        assert_eq!(multi.0[1].exterior().0.len(), 5);
    }

    #[test]
    fn test_sint_values_decode_as_int() {
        let mut layer = raw_layer(MvtFeature {
            id: Some(1),
            tags: vec![0, 0],
            r#type: Some(GeomType::Point as i32),
            geometry: vec![9, 0, 0],
        });
        layer.values = vec![Value {
            sint_value: Some(-4),
            ..Default::default()
        }];
        let decoded = decode_layer(&layer).unwrap();
        assert_eq!(decoded.features[0].properties["k"], json!(-4));
    }
}
