//! Core library for encoding geometries and attributes as Mapbox Vector Tiles.
//!
//! The encoder takes features whose geometry is already expressed in
//! tile-local units (origin at the bottom-left, `0..extent` on both axes) and
//! produces MVT 2.1 protobuf bytes:
//!
//! - [`geometry`] classifies geometries and flattens them into command streams
//! - [`mvt`] delta/zigzag encodes those streams, with optional simplification
//! - [`properties`] interns keys and typed values per layer
//! - [`layer`] and [`tile`] assemble layers and serialize the tile
//! - [`decode`] reads tiles back for inspection
//!
//! # Examples
//!
//! ```
//! use geo::point;
//! use vectiles_core::{encode, Feature, LayerConfig};
//!
//! let features = vec![Feature::new(point!(x: 10.0, y: 20.0)).with_property("kind", "poi")];
//!
//! let mut bytes = Vec::new();
//! encode(&mut bytes, "pois", &features, &LayerConfig::default()).unwrap();
//! assert!(!bytes.is_empty());
//! ```

use thiserror::Error;

pub mod vector_tile;

pub mod decode;
pub mod geometry;
pub mod layer;
pub mod mvt;
pub mod properties;
pub mod tile;

pub use crate::decode::{decode, DecodedFeature, DecodedLayer};
pub use crate::geometry::{classify, Command, CommandEntry, GeometryKind, RingStreamBuilder};
pub use crate::layer::{
    build_layer, Feature, FeatureErrorPolicy, LayerBuilder, LayerConfig, DEFAULT_EXTENT,
    DEFAULT_VERSION, UID_KEY,
};
pub use crate::mvt::{encode_entries, GeometryEncoder};
pub use crate::properties::{PropertyTable, PropertyValue};
pub use crate::tile::{encode, merge, NamedFeatures, TileBuilder};

/// Errors that can occur while encoding or decoding vector tiles
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported geometry type: {kind}")]
    UnsupportedGeometry { kind: &'static str },

    #[error("Unsupported value type for property '{key}': {kind}")]
    UnsupportedValueType { key: String, kind: &'static str },

    #[error("Internal encoding error: {0}")]
    InternalEncoding(String),

    #[error("MVT decoding failed: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
