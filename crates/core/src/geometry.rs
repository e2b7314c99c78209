//! Geometry classification and command stream construction.
//!
//! A source geometry is flattened into an ordered list of [`CommandEntry`]
//! values, one per vertex, each tagged with the drawing command that the
//! encoder will emit for it. Coordinates are converted to tile-local integers
//! here, including the Y flip: source geometry has its origin at the
//! bottom-left of the tile, the wire format at the top-left.

use geo::{Coord, Geometry, LineString, Polygon};

use crate::vector_tile::tile::GeomType;
use crate::{Error, Result};

/// MVT command IDs
pub const CMD_MOVE_TO: u32 = 1;
pub const CMD_LINE_TO: u32 = 2;
pub const CMD_CLOSE_PATH: u32 = 7;

/// The wire geometry kind of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Unknown,
    Point,
    LineString,
    Polygon,
}

impl GeometryKind {
    pub fn geom_type(self) -> GeomType {
        match self {
            GeometryKind::Unknown => GeomType::Unknown,
            GeometryKind::Point => GeomType::Point,
            GeometryKind::LineString => GeomType::Linestring,
            GeometryKind::Polygon => GeomType::Polygon,
        }
    }
}

impl From<GeomType> for GeometryKind {
    fn from(geom_type: GeomType) -> Self {
        match geom_type {
            GeomType::Unknown => GeometryKind::Unknown,
            GeomType::Point => GeometryKind::Point,
            GeomType::Linestring => GeometryKind::LineString,
            GeomType::Polygon => GeometryKind::Polygon,
        }
    }
}

/// A drawing command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    MoveTo,
    LineTo,
    ClosePath,
}

impl Command {
    /// The command ID written into the low three bits of a command word.
    pub fn id(self) -> u32 {
        match self {
            Command::MoveTo => CMD_MOVE_TO,
            Command::LineTo => CMD_LINE_TO,
            Command::ClosePath => CMD_CLOSE_PATH,
        }
    }
}

impl TryFrom<u32> for Command {
    type Error = u32;

    fn try_from(id: u32) -> std::result::Result<Self, Self::Error> {
        match id {
            CMD_MOVE_TO => Ok(Command::MoveTo),
            CMD_LINE_TO => Ok(Command::LineTo),
            CMD_CLOSE_PATH => Ok(Command::ClosePath),
            other => Err(other),
        }
    }
}

/// One vertex of the command stream in tile-local integer coordinates.
///
/// For [`Command::ClosePath`] the coordinates are carried along but never
/// written to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub x: i32,
    pub y: i32,
    pub command: Command,
}

impl CommandEntry {
    pub fn new(x: i32, y: i32, command: Command) -> Self {
        Self { x, y, command }
    }
}

/// Human readable name of a geometry variant, used in error messages.
pub fn geometry_name(geom: &Geometry) -> &'static str {
    match geom {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Map a geometry onto its wire geometry kind.
///
/// Only the six simple-feature kinds are accepted; collections and the
/// geo-specific `Line`, `Rect` and `Triangle` shapes are rejected.
pub fn classify(geom: &Geometry) -> Result<GeometryKind> {
    match geom {
        Geometry::Point(_) | Geometry::MultiPoint(_) => Ok(GeometryKind::Point),
        Geometry::LineString(_) | Geometry::MultiLineString(_) => Ok(GeometryKind::LineString),
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => Ok(GeometryKind::Polygon),
        other => Err(Error::UnsupportedGeometry {
            kind: geometry_name(other),
        }),
    }
}

/// Builds the command stream for geometries in one tile extent.
#[derive(Debug, Clone, Copy)]
pub struct RingStreamBuilder {
    extent: u32,
}

impl RingStreamBuilder {
    pub fn new(extent: u32) -> Self {
        Self { extent }
    }

    /// Convert a source coordinate to tile-local integers, flipping Y.
    ///
    /// The flip happens before truncation so fractional source values land on
    /// the same integer the wire decoder reconstructs.
    #[inline]
    pub fn to_tile(&self, coord: Coord) -> (i32, i32) {
        let y = self.extent as f64 - coord.y;
        (coord.x as i32, y as i32)
    }

    /// Flatten a geometry into its ordered command entries.
    pub fn build(&self, geom: &Geometry) -> Result<Vec<CommandEntry>> {
        let mut entries = Vec::new();

        match geom {
            Geometry::Point(point) => self.push_point(&mut entries, point.0),
            Geometry::MultiPoint(points) => {
                for point in &points.0 {
                    self.push_point(&mut entries, point.0);
                }
            }
            Geometry::LineString(line) => self.push_path(&mut entries, line, false),
            Geometry::MultiLineString(lines) => {
                for line in &lines.0 {
                    self.push_path(&mut entries, line, false);
                }
            }
            Geometry::Polygon(polygon) => self.push_polygon(&mut entries, polygon),
            Geometry::MultiPolygon(polygons) => {
                for polygon in &polygons.0 {
                    self.push_polygon(&mut entries, polygon);
                }
            }
            other => {
                return Err(Error::UnsupportedGeometry {
                    kind: geometry_name(other),
                })
            }
        }

        Ok(entries)
    }

    fn push_point(&self, entries: &mut Vec<CommandEntry>, coord: Coord) {
        let (x, y) = self.to_tile(coord);
        entries.push(CommandEntry::new(x, y, Command::MoveTo));
    }

    /// Exterior ring first, then each interior ring.
    fn push_polygon(&self, entries: &mut Vec<CommandEntry>, polygon: &Polygon) {
        self.push_path(entries, polygon.exterior(), true);
        for interior in polygon.interiors() {
            self.push_path(entries, interior, true);
        }
    }

    /// A line or ring: MoveTo for the first vertex, LineTo for the rest.
    /// For rings the last (closing) vertex becomes ClosePath instead.
    fn push_path(&self, entries: &mut Vec<CommandEntry>, line: &LineString, ring: bool) {
        let last = line.0.len().saturating_sub(1);
        for (i, coord) in line.0.iter().enumerate() {
            let command = if i == 0 {
                Command::MoveTo
            } else if ring && i == last {
                Command::ClosePath
            } else {
                Command::LineTo
            };
            let (x, y) = self.to_tile(*coord);
            entries.push(CommandEntry::new(x, y, command));
        }
    }
}
